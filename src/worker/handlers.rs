//! Step handlers (C7): one method per `job_type`, plus the two chat-reply
//! paths and the reaction-driven cleanup trigger, which are not queued jobs
//! but are dispatched directly by the listener process.
//!
//! Case lookup by external event id (the reply's target, or the reacted-to
//! message) is the listener's job — it resolves `case_id` via
//! `JournalStore::get_case_id_by_message_ref` before calling into these
//! handlers, so every method here takes `case_id` explicitly rather than
//! re-deriving it.

use std::sync::Arc;

use chrono_tz::America::Bahia as Brt;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::chat::templates::{
    build_room1_final_appt_confirmed_message, build_room1_final_appt_denied_message,
    build_room1_final_denial_triage_message, build_room1_final_failure_message,
    build_room2_case_decision_instructions_message, build_room2_case_pdf_message,
    build_room2_case_summary_message, build_room2_decision_ack_message,
    build_room3_request_message, build_room3_scheduler_template_message,
    patient_age_from_structured_data, patient_name_from_structured_data,
};
use crate::chat::{ChatGateway, ReactionEvent};
use crate::domain::case_status::CaseStatus;
use crate::domain::doctor_decision_parser::{parse_doctor_decision_reply, Decision as ParsedDecision};
use crate::domain::models::{ActorType, AppointmentStatus, CaseEventInput, CheckpointStage, DoctorDecision, Job};
use crate::domain::scheduler_parser::{parse_scheduler_reply, AppointmentStatus as ParsedApptStatus};
use crate::error::{HandlerCause, HandlerError};
use crate::llm::{Llm1Service, Llm2Service};
use crate::pdf::{extract_agency_record_number, PdfTextExtractor};
use crate::store::{
    CaseStore, CheckpointCreateInput, CheckpointReactionInput, JobEnqueueInput, JobQueue, JournalStore,
    PriorCaseQuery, PromptTemplateStore, ReactionCheckpointStore, ReportTranscriptInput, TranscriptStore,
};

pub const JOB_PROCESS_PDF_CASE: &str = "process_pdf_case";
pub const JOB_RUN_LLM1: &str = "run_llm1";
pub const JOB_RUN_LLM2: &str = "run_llm2";
pub const JOB_POST_ROOM2_WIDGET: &str = "post_room2_widget";
pub const JOB_POST_ROOM3_REQUEST: &str = "post_room3_request";
pub const JOB_POST_ROOM1_FINAL_APPT: &str = "post_room1_final_appt";
pub const JOB_POST_ROOM1_FINAL_APPT_DENIED: &str = "post_room1_final_appt_denied";
pub const JOB_POST_ROOM1_FINAL_DENIAL_TRIAGE: &str = "post_room1_final_denial_triage";
pub const JOB_POST_ROOM1_FINAL_FAILURE: &str = "post_room1_final_failure";
pub const JOB_CLEANUP_CASE: &str = "cleanup_case";

fn fatal(details: impl Into<String>) -> HandlerError {
    HandlerError::fatal(details)
}

fn chat_post_err(err: crate::chat::gateway::ChatGatewayError) -> HandlerError {
    HandlerError::retriable(HandlerCause::ChatPost, err.to_string())
}

pub struct WorkerHandlers {
    cases: Arc<dyn CaseStore>,
    journal: Arc<dyn JournalStore>,
    jobs: Arc<dyn JobQueue>,
    checkpoints: Arc<dyn ReactionCheckpointStore>,
    transcripts: Arc<dyn TranscriptStore>,
    prior_cases: Arc<dyn PriorCaseQuery>,
    prompt_templates: Arc<dyn PromptTemplateStore>,
    chat: Arc<dyn ChatGateway>,
    pdf_extractor: Arc<dyn PdfTextExtractor>,
    llm1: Arc<Llm1Service>,
    llm2: Arc<Llm2Service>,
    room2_id: String,
    room3_id: String,
}

impl WorkerHandlers {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cases: Arc<dyn CaseStore>,
        journal: Arc<dyn JournalStore>,
        jobs: Arc<dyn JobQueue>,
        checkpoints: Arc<dyn ReactionCheckpointStore>,
        transcripts: Arc<dyn TranscriptStore>,
        prior_cases: Arc<dyn PriorCaseQuery>,
        prompt_templates: Arc<dyn PromptTemplateStore>,
        chat: Arc<dyn ChatGateway>,
        pdf_extractor: Arc<dyn PdfTextExtractor>,
        llm1: Arc<Llm1Service>,
        llm2: Arc<Llm2Service>,
        room2_id: String,
        room3_id: String,
    ) -> Self {
        Self {
            cases,
            journal,
            jobs,
            checkpoints,
            transcripts,
            prior_cases,
            prompt_templates,
            chat,
            pdf_extractor,
            llm1,
            llm2,
            room2_id,
            room3_id,
        }
    }

    pub async fn dispatch(&self, job: &Job) -> Result<(), HandlerError> {
        match job.job_type.as_str() {
            JOB_PROCESS_PDF_CASE => self.handle_process_pdf_case(job).await,
            JOB_RUN_LLM1 => self.handle_run_llm1(job).await,
            JOB_RUN_LLM2 => self.handle_run_llm2(job).await,
            JOB_POST_ROOM2_WIDGET => self.handle_post_room2_widget(job).await,
            JOB_POST_ROOM3_REQUEST => self.handle_post_room3_request(job).await,
            JOB_POST_ROOM1_FINAL_APPT => self.handle_post_room1_final_appt(job).await,
            JOB_POST_ROOM1_FINAL_APPT_DENIED => self.handle_post_room1_final_appt_denied(job).await,
            JOB_POST_ROOM1_FINAL_DENIAL_TRIAGE => self.handle_post_room1_final_denial_triage(job).await,
            JOB_POST_ROOM1_FINAL_FAILURE => self.handle_post_room1_final_failure(job).await,
            JOB_CLEANUP_CASE => self.handle_cleanup_case(job).await,
            other => Err(fatal(format!("unrecognized job_type: {other}"))),
        }
    }

    fn require_case_id(job: &Job) -> Result<Uuid, HandlerError> {
        job.case_id.ok_or_else(|| fatal(format!("{} job is missing case_id", job.job_type)))
    }

    async fn get_case_or_fatal(&self, case_id: Uuid) -> Result<crate::domain::models::Case, HandlerError> {
        self.cases
            .get_case(case_id)
            .await?
            .ok_or_else(|| fatal(format!("case not found: {case_id}")))
    }

    async fn handle_process_pdf_case(&self, job: &Job) -> Result<(), HandlerError> {
        let case_id = Self::require_case_id(job)?;
        let pdf_mxc_url = job
            .payload
            .get("pdf_mxc_url")
            .and_then(Value::as_str)
            .ok_or_else(|| fatal("process_pdf_case payload missing pdf_mxc_url"))?;

        let bytes = self.chat.download_media(pdf_mxc_url).await.map_err(|e| {
            HandlerError::retriable(HandlerCause::Download, e.to_string())
        })?;
        if bytes.is_empty() {
            return Err(HandlerError::retriable(HandlerCause::Download, "downloaded zero bytes"));
        }

        let text = self
            .pdf_extractor
            .extract_text(&bytes)
            .await
            .map_err(|e| HandlerError::retriable(HandlerCause::Extract, e.to_string()))?;

        let extraction = extract_agency_record_number(&text, chrono::Utc::now());

        self.transcripts
            .capture_transcript(ReportTranscriptInput {
                case_id,
                kind: "pdf_extraction".to_string(),
                content: extraction.cleaned_text.clone(),
            })
            .await?;

        self.cases
            .store_pdf_extraction(
                case_id,
                &extraction.cleaned_text,
                &extraction.agency_record_number,
                CaseStatus::Extracting,
            )
            .await?;

        self.journal
            .append_case_event(CaseEventInput {
                case_id,
                actor_type: ActorType::System,
                actor_user_id: None,
                room_id: None,
                external_event_id: None,
                event_type: "PDF_EXTRACTED".to_string(),
                payload: json!({"agency_record_number": extraction.agency_record_number}),
            })
            .await?;

        self.jobs
            .enqueue(JobEnqueueInput {
                case_id: Some(case_id),
                job_type: JOB_RUN_LLM1.to_string(),
                payload: json!({}),
                run_after: None,
            })
            .await?;

        info!(case_id = %case_id, "process_pdf_case_completed");
        Ok(())
    }

    async fn handle_run_llm1(&self, job: &Job) -> Result<(), HandlerError> {
        let case_id = Self::require_case_id(job)?;
        let case = self.get_case_or_fatal(case_id).await?;
        let agency_record_number =
            case.agency_record_number.ok_or_else(|| fatal("case missing agency_record_number"))?;
        let extracted_text = case.extracted_text.ok_or_else(|| fatal("case missing extracted_text"))?;

        let result = self.llm1.run(case_id, &agency_record_number, &extracted_text).await?;

        self.cases
            .store_llm1_artifacts(case_id, result.structured_data, CaseStatus::LlmStruct)
            .await?;

        let llm1_system_version = self.prompt_templates.get_active("llm1_system").await?.map(|p| p.version);
        let llm1_user_version = self.prompt_templates.get_active("llm1_user").await?.map(|p| p.version);
        self.journal
            .append_case_event(CaseEventInput {
                case_id,
                actor_type: ActorType::Bot,
                actor_user_id: None,
                room_id: None,
                external_event_id: None,
                event_type: "LLM1_COMPLETED".to_string(),
                payload: json!({
                    "llm1_system_version": llm1_system_version,
                    "llm1_user_version": llm1_user_version,
                }),
            })
            .await?;

        self.jobs
            .enqueue(JobEnqueueInput {
                case_id: Some(case_id),
                job_type: JOB_RUN_LLM2.to_string(),
                payload: json!({}),
                run_after: None,
            })
            .await?;

        info!(case_id = %case_id, "run_llm1_completed");
        Ok(())
    }

    async fn handle_run_llm2(&self, job: &Job) -> Result<(), HandlerError> {
        let case_id = Self::require_case_id(job)?;
        let case = self.get_case_or_fatal(case_id).await?;
        let structured_data = case.structured_data.ok_or_else(|| fatal("case missing structured_data"))?;

        let result = self.llm2.run(case_id, &structured_data).await?;

        self.cases
            .store_suggested_action(case_id, result.structured_data, CaseStatus::LlmSuggest)
            .await?;

        self.jobs
            .enqueue(JobEnqueueInput {
                case_id: Some(case_id),
                job_type: JOB_POST_ROOM2_WIDGET.to_string(),
                payload: json!({}),
                run_after: None,
            })
            .await?;

        info!(case_id = %case_id, "run_llm2_completed");
        Ok(())
    }

    async fn handle_post_room2_widget(&self, job: &Job) -> Result<(), HandlerError> {
        let case_id = Self::require_case_id(job)?;
        let case = self.get_case_or_fatal(case_id).await?;
        let structured_data = case.structured_data.ok_or_else(|| fatal("case missing structured_data"))?;
        let suggested_action = case.suggested_action.ok_or_else(|| fatal("case missing suggested_action"))?;
        let agency_record_number =
            case.agency_record_number.clone().ok_or_else(|| fatal("case missing agency_record_number"))?;
        let pdf_source_uri = case.pdf_source_uri.clone().unwrap_or_default();
        let summary_text = structured_data
            .pointer("/summary/one_liner")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        let pdf_body = build_room2_case_pdf_message(case_id, &agency_record_number, &pdf_source_uri);
        let pdf_event_id = self.chat.post_text(&self.room2_id, &pdf_body).await.map_err(chat_post_err)?;
        self.journal.add_case_message(case_id, &self.room2_id, &pdf_event_id, None, "room2_pdf").await?;

        let mut summary_body =
            build_room2_case_summary_message(case_id, &structured_data, &summary_text, &suggested_action);
        let prior_context = self
            .prior_cases
            .lookup_recent_context(case_id, &agency_record_number, chrono::Utc::now())
            .await?;
        if let Some(prior) = &prior_context.prior_case {
            summary_body.push_str(&format!(
                "\n\nCaso anterior (registro {agency_record_number}): {decision} em {decided_at}",
                decision = prior.decision,
                decided_at = prior.decided_at.format("%d-%m-%Y %H:%M"),
            ));
        }
        if let Some(count) = prior_context.prior_denial_count_7d {
            if count > 0 {
                summary_body.push_str(&format!("\nRecusas nos ultimos 7 dias: {count}"));
            }
        }
        let summary_event_id =
            self.chat.post_text(&self.room2_id, &summary_body).await.map_err(chat_post_err)?;
        self.journal.add_case_message(case_id, &self.room2_id, &summary_event_id, None, "room2_summary").await?;

        let instructions_body = build_room2_case_decision_instructions_message(case_id);
        let instructions_event_id =
            self.chat.post_text(&self.room2_id, &instructions_body).await.map_err(chat_post_err)?;
        self.journal.add_case_message(case_id, &self.room2_id, &instructions_event_id, None, "room2_root").await?;

        self.checkpoints
            .ensure_expected_checkpoint(CheckpointCreateInput {
                case_id,
                stage: CheckpointStage::Room2Ack,
                room_id: self.room2_id.clone(),
                target_external_event_id: instructions_event_id,
            })
            .await?;

        self.cases.set_status_with_transition(case_id, CaseStatus::R2PostWidget).await?;
        self.cases.set_status_with_transition(case_id, CaseStatus::WaitDoctor).await?;

        self.journal
            .append_case_event(CaseEventInput {
                case_id,
                actor_type: ActorType::Bot,
                actor_user_id: None,
                room_id: Some(self.room2_id.clone()),
                external_event_id: None,
                event_type: "ROOM2_WIDGET_POSTED".to_string(),
                payload: json!({}),
            })
            .await?;

        info!(case_id = %case_id, "post_room2_widget_completed");
        Ok(())
    }

    /// Triggered by the listener on a text reply in room 2 targeting the
    /// case's decision-instructions event, not by the job queue.
    pub async fn handle_doctor_reply(&self, case_id: Uuid, reply_body: &str) -> Result<(), HandlerError> {
        let parsed = match parse_doctor_decision_reply(reply_body, Some(case_id)) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.chat
                    .post_text(&self.room2_id, &format!("parse_error: {}", err.0))
                    .await
                    .map_err(chat_post_err)?;
                return Ok(());
            }
        };

        let (domain_decision, to_status) = match parsed.decision {
            ParsedDecision::Accept => (DoctorDecision::Accept, CaseStatus::DoctorAccepted),
            ParsedDecision::Deny => (DoctorDecision::Deny, CaseStatus::DoctorDenied),
        };

        self.cases
            .record_doctor_decision(
                case_id,
                domain_decision,
                parsed.support_flag.as_str(),
                parsed.reason.as_deref(),
                to_status,
            )
            .await?;

        let ack_body = build_room2_decision_ack_message(
            case_id,
            parsed.decision.as_str(),
            parsed.support_flag.as_str(),
            parsed.reason.as_deref(),
        );
        self.chat.post_text(&self.room2_id, &ack_body).await.map_err(chat_post_err)?;

        self.journal
            .append_case_event(CaseEventInput {
                case_id,
                actor_type: ActorType::Human,
                actor_user_id: None,
                room_id: Some(self.room2_id.clone()),
                external_event_id: None,
                event_type: "DOCTOR_DECISION_RECORDED".to_string(),
                payload: json!({"decision": parsed.decision.as_str(), "support_flag": parsed.support_flag.as_str()}),
            })
            .await?;

        let next_job_type = match parsed.decision {
            ParsedDecision::Accept => JOB_POST_ROOM3_REQUEST,
            ParsedDecision::Deny => JOB_POST_ROOM1_FINAL_DENIAL_TRIAGE,
        };
        self.jobs
            .enqueue(JobEnqueueInput {
                case_id: Some(case_id),
                job_type: next_job_type.to_string(),
                payload: json!({}),
                run_after: None,
            })
            .await?;

        info!(case_id = %case_id, decision = parsed.decision.as_str(), "doctor_reply_processed");
        Ok(())
    }

    async fn handle_post_room3_request(&self, job: &Job) -> Result<(), HandlerError> {
        let case_id = Self::require_case_id(job)?;
        let case = self.get_case_or_fatal(case_id).await?;

        // Idempotency: only act from DOCTOR_ACCEPTED; a repeated job for a
        // case already past that point is a no-op, not an error.
        if case.status != CaseStatus::DoctorAccepted {
            info!(case_id = %case_id, status = %case.status, "post_room3_request_skipped_not_pending");
            return Ok(());
        }

        let structured_data = case.structured_data.ok_or_else(|| fatal("case missing structured_data"))?;
        let agency_record_number =
            case.agency_record_number.ok_or_else(|| fatal("case missing agency_record_number"))?;
        let patient_name = patient_name_from_structured_data(&structured_data);
        let patient_age = patient_age_from_structured_data(&structured_data);

        let request_body =
            build_room3_request_message(case_id, &agency_record_number, &patient_name, &patient_age);
        let request_event_id =
            self.chat.post_text(&self.room3_id, &request_body).await.map_err(chat_post_err)?;
        self.journal.add_case_message(case_id, &self.room3_id, &request_event_id, None, "room3_request").await?;

        let template_body = build_room3_scheduler_template_message(case_id);
        let template_event_id =
            self.chat.post_text(&self.room3_id, &template_body).await.map_err(chat_post_err)?;
        self.journal.add_case_message(case_id, &self.room3_id, &template_event_id, None, "room3_template").await?;

        self.checkpoints
            .ensure_expected_checkpoint(CheckpointCreateInput {
                case_id,
                stage: CheckpointStage::Room3Ack,
                room_id: self.room3_id.clone(),
                target_external_event_id: template_event_id,
            })
            .await?;

        self.cases.set_status_with_transition(case_id, CaseStatus::R3PostRequest).await?;
        self.cases.set_status_with_transition(case_id, CaseStatus::WaitAppt).await?;

        self.journal
            .append_case_event(CaseEventInput {
                case_id,
                actor_type: ActorType::Bot,
                actor_user_id: None,
                room_id: Some(self.room3_id.clone()),
                external_event_id: None,
                event_type: "ROOM3_REQUEST_POSTED".to_string(),
                payload: json!({}),
            })
            .await?;

        info!(case_id = %case_id, "post_room3_request_completed");
        Ok(())
    }

    /// Triggered by the listener on a text reply in room 3 targeting the
    /// case's scheduler-template event, not by the job queue.
    pub async fn handle_scheduler_reply(&self, case_id: Uuid, reply_body: &str) -> Result<(), HandlerError> {
        let parsed = match parse_scheduler_reply(reply_body, case_id) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.chat
                    .post_text(&self.room3_id, &format!("parse_error: {}", err.0))
                    .await
                    .map_err(chat_post_err)?;
                return Ok(());
            }
        };

        match parsed.appointment_status {
            ParsedApptStatus::Confirmed => {
                let appointment_at_utc = parsed.appointment_at.map(|at| at.with_timezone(&chrono::Utc));
                self.cases
                    .record_scheduler_outcome(
                        case_id,
                        AppointmentStatus::Confirmed,
                        appointment_at_utc,
                        parsed.location.as_deref(),
                        parsed.instructions.as_deref(),
                        None,
                        CaseStatus::ApptConfirmed,
                    )
                    .await?;
                self.jobs
                    .enqueue(JobEnqueueInput {
                        case_id: Some(case_id),
                        job_type: JOB_POST_ROOM1_FINAL_APPT.to_string(),
                        payload: json!({}),
                        run_after: None,
                    })
                    .await?;
            }
            ParsedApptStatus::Denied => {
                self.cases
                    .record_scheduler_outcome(
                        case_id,
                        AppointmentStatus::Denied,
                        None,
                        None,
                        None,
                        parsed.reason.as_deref(),
                        CaseStatus::ApptDenied,
                    )
                    .await?;
                self.jobs
                    .enqueue(JobEnqueueInput {
                        case_id: Some(case_id),
                        job_type: JOB_POST_ROOM1_FINAL_APPT_DENIED.to_string(),
                        payload: json!({}),
                        run_after: None,
                    })
                    .await?;
            }
        }

        info!(case_id = %case_id, "scheduler_reply_processed");
        Ok(())
    }

    async fn post_room1_final(&self, case_id: Uuid, body: &str) -> Result<(), HandlerError> {
        let case = self.get_case_or_fatal(case_id).await?;
        let event_id = self
            .chat
            .reply_text(&case.room1_origin_room_id, &case.room1_origin_event_id, body)
            .await
            .map_err(chat_post_err)?;

        self.journal
            .add_case_message(case_id, &case.room1_origin_room_id, &event_id, None, "room1_final")
            .await?;

        self.cases.set_room1_final_reply(case_id, &event_id, CaseStatus::WaitR1CleanupThumbs).await?;

        self.checkpoints
            .ensure_expected_checkpoint(CheckpointCreateInput {
                case_id,
                stage: CheckpointStage::Room1Final,
                room_id: case.room1_origin_room_id.clone(),
                target_external_event_id: event_id,
            })
            .await?;

        self.journal
            .append_case_event(CaseEventInput {
                case_id,
                actor_type: ActorType::Bot,
                actor_user_id: None,
                room_id: Some(case.room1_origin_room_id),
                external_event_id: None,
                event_type: "ROOM1_FINAL_POSTED".to_string(),
                payload: json!({}),
            })
            .await?;

        Ok(())
    }

    async fn handle_post_room1_final_appt(&self, job: &Job) -> Result<(), HandlerError> {
        let case_id = Self::require_case_id(job)?;
        let case = self.get_case_or_fatal(case_id).await?;
        let appointment_at = case.appointment_at.ok_or_else(|| fatal("case missing appointment_at"))?;
        let location = case.appointment_location.clone().unwrap_or_default();
        let instructions = case.appointment_instructions.clone().unwrap_or_default();
        let appointment_at_brt = appointment_at.with_timezone(&Brt).format("%d-%m-%Y %H:%M").to_string();

        let body = build_room1_final_appt_confirmed_message(case_id, &appointment_at_brt, &location, &instructions);
        self.post_room1_final(case_id, &body).await?;
        info!(case_id = %case_id, "post_room1_final_appt_completed");
        Ok(())
    }

    async fn handle_post_room1_final_appt_denied(&self, job: &Job) -> Result<(), HandlerError> {
        let case_id = Self::require_case_id(job)?;
        let case = self.get_case_or_fatal(case_id).await?;
        let reason = case.appointment_reason.clone().unwrap_or_default();
        let body = build_room1_final_appt_denied_message(case_id, &reason);
        self.post_room1_final(case_id, &body).await?;
        info!(case_id = %case_id, "post_room1_final_appt_denied_completed");
        Ok(())
    }

    async fn handle_post_room1_final_denial_triage(&self, job: &Job) -> Result<(), HandlerError> {
        let case_id = Self::require_case_id(job)?;
        let case = self.get_case_or_fatal(case_id).await?;
        let reason = case.doctor_reason.clone().unwrap_or_default();
        let body = build_room1_final_denial_triage_message(case_id, &reason);
        self.post_room1_final(case_id, &body).await?;
        info!(case_id = %case_id, "post_room1_final_denial_triage_completed");
        Ok(())
    }

    async fn handle_post_room1_final_failure(&self, job: &Job) -> Result<(), HandlerError> {
        let case_id = Self::require_case_id(job)?;
        let cause = job.payload.get("cause").and_then(Value::as_str).unwrap_or("fatal");
        let details = job.payload.get("details").and_then(Value::as_str).unwrap_or("");
        // Only Extracting/LlmStruct/LlmSuggest have a legal ->Failed edge; from any
        // other state this is a deliberate no-op rather than a forced status change.
        self.cases.set_status_with_transition(case_id, CaseStatus::Failed).await.ok();
        let body = build_room1_final_failure_message(case_id, cause, details);
        self.post_room1_final(case_id, &body).await?;
        info!(case_id = %case_id, "post_room1_final_failure_completed");
        Ok(())
    }

    async fn handle_cleanup_case(&self, job: &Job) -> Result<(), HandlerError> {
        let case_id = Self::require_case_id(job)?;
        let refs = self.journal.list_message_refs_for_case(case_id).await?;

        let mut success = 0u64;
        let mut failed = 0u64;
        for message_ref in refs {
            match self.chat.redact_event(&message_ref.room_id, &message_ref.external_event_id).await {
                Ok(()) => {
                    success += 1;
                    self.journal
                        .append_case_event(CaseEventInput {
                            case_id,
                            actor_type: ActorType::System,
                            actor_user_id: None,
                            room_id: Some(message_ref.room_id),
                            external_event_id: Some(message_ref.external_event_id),
                            event_type: "MATRIX_EVENT_REDACTED".to_string(),
                            payload: json!({}),
                        })
                        .await?;
                }
                Err(err) => {
                    failed += 1;
                    self.journal
                        .append_case_event(CaseEventInput {
                            case_id,
                            actor_type: ActorType::System,
                            actor_user_id: None,
                            room_id: Some(message_ref.room_id),
                            external_event_id: Some(message_ref.external_event_id),
                            event_type: "MATRIX_EVENT_REDACTION_FAILED".to_string(),
                            payload: json!({"error": err.to_string()}),
                        })
                        .await?;
                }
            }
        }

        self.cases.mark_cleanup_completed(case_id).await?;
        self.journal
            .append_case_event(CaseEventInput {
                case_id,
                actor_type: ActorType::System,
                actor_user_id: None,
                room_id: None,
                external_event_id: None,
                event_type: "CLEANUP_COMPLETED".to_string(),
                payload: json!({"count_redacted_success": success, "count_redacted_failed": failed}),
            })
            .await?;

        info!(case_id = %case_id, success, failed, "cleanup_case_completed");
        Ok(())
    }

    /// Triggered by the listener on an inbound reaction. Tries each stage in
    /// turn since the caller only resolved `(room_id, related_event_id)`, not
    /// which checkpoint stage it belongs to — harmless, `mark_positive_reaction`
    /// is a conditional no-op for a stage/target pair it doesn't recognize.
    pub async fn handle_positive_reaction(&self, case_id: Uuid, reaction: &ReactionEvent) -> Result<(), HandlerError> {
        for stage in [CheckpointStage::Room2Ack, CheckpointStage::Room3Ack, CheckpointStage::Room1Final] {
            let matched = self
                .checkpoints
                .mark_positive_reaction(CheckpointReactionInput {
                    stage,
                    room_id: reaction.room_id.clone(),
                    target_external_event_id: reaction.related_event_id.clone(),
                    reaction_event_id: reaction.reaction_event_id.clone(),
                    reactor_user_id: reaction.reactor_user_id.clone(),
                    reaction_key: reaction.reaction_key.clone(),
                })
                .await?;

            if matched && stage == CheckpointStage::Room1Final {
                self.cases.set_status_with_transition(case_id, CaseStatus::CleanupRunning).await?;
                self.jobs
                    .enqueue(JobEnqueueInput {
                        case_id: Some(case_id),
                        job_type: JOB_CLEANUP_CASE.to_string(),
                        payload: json!({}),
                        run_after: None,
                    })
                    .await?;
                info!(case_id = %case_id, "room1_final_ack_triggered_cleanup");
                return Ok(());
            }
            if matched {
                return Ok(());
            }
        }
        Ok(())
    }
}
