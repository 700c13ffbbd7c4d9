//! Room-1 intake: turn a parsed PDF-carrying chat event into a case row and
//! the first `process_pdf_case` job, idempotent per origin event id.

use std::sync::Arc;
use tracing::info;

use crate::chat::templates::PROCESSING_ACK_BODY;
use crate::chat::{ChatGateway, ParsedRoom1PdfIntakeEvent};
use crate::domain::case_status::CaseStatus;
use crate::domain::models::ActorType;
use crate::error::StoreError;
use crate::store::{CaseCreateInput, CaseStore, JobEnqueueInput, JobQueue, JournalStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room1IntakeOutcome {
    pub processed: bool,
    pub case_id: Option<uuid::Uuid>,
    pub reason: Option<&'static str>,
}

pub struct Room1IntakeService {
    cases: Arc<dyn CaseStore>,
    journal: Arc<dyn JournalStore>,
    jobs: Arc<dyn JobQueue>,
    chat: Arc<dyn ChatGateway>,
}

impl Room1IntakeService {
    pub fn new(
        cases: Arc<dyn CaseStore>,
        journal: Arc<dyn JournalStore>,
        jobs: Arc<dyn JobQueue>,
        chat: Arc<dyn ChatGateway>,
    ) -> Self {
        Self { cases, journal, jobs, chat }
    }

    pub async fn ingest_pdf_event(
        &self,
        parsed: &ParsedRoom1PdfIntakeEvent,
    ) -> Result<Room1IntakeOutcome, StoreError> {
        info!(room_id = %parsed.room_id, event_id = %parsed.event_id, "room1_intake_received");

        let case_id = uuid::Uuid::new_v4();
        let created = match self
            .cases
            .create_case(CaseCreateInput {
                case_id,
                status: CaseStatus::R1AckProcessing,
                room1_origin_room_id: parsed.room_id.clone(),
                room1_origin_event_id: parsed.event_id.clone(),
                room1_sender_user_id: parsed.sender_user_id.clone(),
            })
            .await
        {
            Ok(case) => case,
            Err(StoreError::DuplicateOriginEvent) => {
                info!(event_id = %parsed.event_id, "room1_intake_duplicate_origin_event");
                return Ok(Room1IntakeOutcome {
                    processed: false,
                    case_id: None,
                    reason: Some("duplicate_origin_event"),
                });
            }
            Err(other) => return Err(other),
        };

        self.journal
            .append_case_event(crate::domain::models::CaseEventInput {
                case_id: created.case_id,
                actor_type: ActorType::System,
                actor_user_id: None,
                room_id: Some(parsed.room_id.clone()),
                external_event_id: Some(parsed.event_id.clone()),
                event_type: "ROOM1_PDF_ACCEPTED".to_string(),
                payload: serde_json::json!({
                    "mxc_url": parsed.mxc_url,
                    "filename": parsed.filename,
                    "mimetype": parsed.mimetype,
                }),
            })
            .await?;

        self.journal
            .add_case_message(
                created.case_id,
                &parsed.room_id,
                &parsed.event_id,
                Some(&parsed.sender_user_id),
                "room1_origin",
            )
            .await?;

        let processing_event_id = self
            .chat
            .reply_text(&parsed.room_id, &parsed.event_id, PROCESSING_ACK_BODY)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        self.journal
            .add_case_message(created.case_id, &parsed.room_id, &processing_event_id, None, "bot_processing")
            .await?;

        self.journal
            .append_case_event(crate::domain::models::CaseEventInput {
                case_id: created.case_id,
                actor_type: ActorType::Bot,
                actor_user_id: None,
                room_id: Some(parsed.room_id.clone()),
                external_event_id: Some(processing_event_id.clone()),
                event_type: "ROOM1_PROCESSING_ACK_POSTED".to_string(),
                payload: serde_json::json!({}),
            })
            .await?;

        self.jobs
            .enqueue(JobEnqueueInput {
                case_id: Some(created.case_id),
                job_type: "process_pdf_case".to_string(),
                payload: serde_json::json!({
                    "room1_origin_event_id": parsed.event_id,
                    "pdf_mxc_url": parsed.mxc_url,
                    "filename": parsed.filename,
                    "mimetype": parsed.mimetype,
                }),
                run_after: None,
            })
            .await?;
        info!(case_id = %created.case_id, job_type = "process_pdf_case", "room1_intake_enqueued_next_job");

        self.journal
            .append_case_event(crate::domain::models::CaseEventInput {
                case_id: created.case_id,
                actor_type: ActorType::System,
                actor_user_id: None,
                room_id: None,
                external_event_id: None,
                event_type: "JOB_ENQUEUED_PROCESS_PDF_CASE".to_string(),
                payload: serde_json::json!({"job_type": "process_pdf_case"}),
            })
            .await?;

        info!(case_id = %created.case_id, "room1_intake_processed");
        Ok(Room1IntakeOutcome { processed: true, case_id: Some(created.case_id), reason: None })
    }
}
