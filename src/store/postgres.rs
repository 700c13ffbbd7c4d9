//! Single Postgres-backed adapter implementing every store port.
//!
//! Follows the pool-holding `Store` pattern: one `deadpool_postgres::Pool`,
//! one connection checked out per call, raw SQL with positional parameters.
//! No long transactions spanning external I/O — every verb here is a single
//! round trip (or two sequential round trips for read-then-write checkpoints
//! that Postgres itself makes atomic via `WHERE` guards).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, Pool, Runtime};
use tokio_postgres::NoTls;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::domain::case_status::CaseStatus;
use crate::domain::models::*;
use crate::error::StoreError;
use crate::store::ports::*;

pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let mut cfg = Config::new();
        cfg.url = Some(config.url().to_string());
        cfg.pool = Some(deadpool_postgres::PoolConfig {
            max_size: config.pool_size,
            ..Default::default()
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        let _ = pool.get().await?;
        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<deadpool_postgres::Object, StoreError> {
        Ok(self.pool.get().await?)
    }

    pub fn pool(&self) -> Pool {
        self.pool.clone()
    }
}

fn actor_type_str(v: ActorType) -> &'static str {
    match v {
        ActorType::System => "system",
        ActorType::Bot => "bot",
        ActorType::Human => "human",
    }
}

fn parse_actor_type(s: &str) -> ActorType {
    match s {
        "bot" => ActorType::Bot,
        "human" => ActorType::Human,
        _ => ActorType::System,
    }
}

fn job_status_str(v: JobStatus) -> &'static str {
    v.as_str()
}

fn parse_job_status(s: &str) -> JobStatus {
    match s {
        "running" => JobStatus::Running,
        "done" => JobStatus::Done,
        "failed" => JobStatus::Failed,
        _ => JobStatus::Queued,
    }
}

fn checkpoint_stage_str(v: CheckpointStage) -> &'static str {
    v.as_str()
}

fn parse_checkpoint_outcome(s: &str) -> CheckpointOutcome {
    match s {
        "POSITIVE_RECEIVED" => CheckpointOutcome::PositiveReceived,
        _ => CheckpointOutcome::Pending,
    }
}

fn role_str(v: Role) -> &'static str {
    match v {
        Role::Admin => "admin",
        Role::Reader => "reader",
    }
}

fn parse_role(s: &str) -> Role {
    match s {
        "admin" => Role::Admin,
        _ => Role::Reader,
    }
}

fn account_status_str(v: AccountStatus) -> &'static str {
    match v {
        AccountStatus::Active => "active",
        AccountStatus::Blocked => "blocked",
        AccountStatus::Removed => "removed",
    }
}

fn parse_account_status(s: &str) -> AccountStatus {
    match s {
        "blocked" => AccountStatus::Blocked,
        "removed" => AccountStatus::Removed,
        _ => AccountStatus::Active,
    }
}

fn doctor_decision_str(v: DoctorDecision) -> &'static str {
    match v {
        DoctorDecision::Accept => "accept",
        DoctorDecision::Deny => "deny",
    }
}

fn parse_doctor_decision(s: &str) -> DoctorDecision {
    match s {
        "deny" => DoctorDecision::Deny,
        _ => DoctorDecision::Accept,
    }
}

fn appointment_status_str(v: AppointmentStatus) -> &'static str {
    match v {
        AppointmentStatus::Confirmed => "confirmed",
        AppointmentStatus::Denied => "denied",
    }
}

fn parse_appointment_status(s: &str) -> AppointmentStatus {
    match s {
        "denied" => AppointmentStatus::Denied,
        _ => AppointmentStatus::Confirmed,
    }
}

fn row_to_case(row: &tokio_postgres::Row) -> Case {
    Case {
        case_id: row.get("case_id"),
        status: row.get("status"),
        room1_origin_room_id: row.get("room1_origin_room_id"),
        room1_origin_event_id: row.get("room1_origin_event_id"),
        room1_sender_user_id: row.get("room1_sender_user_id"),
        pdf_source_uri: row.get("pdf_source_uri"),
        extracted_text: row.get("extracted_text"),
        agency_record_number: row.get("agency_record_number"),
        structured_data: row.get("structured_data"),
        suggested_action: row.get("suggested_action"),
        doctor_decision: row.get::<_, Option<String>>("doctor_decision").map(|s| parse_doctor_decision(&s)),
        doctor_support_flag: row.get("doctor_support_flag"),
        doctor_reason: row.get("doctor_reason"),
        doctor_decided_at: row.get("doctor_decided_at"),
        appointment_status: row
            .get::<_, Option<String>>("appointment_status")
            .map(|s| parse_appointment_status(&s)),
        appointment_at: row.get("appointment_at"),
        appointment_location: row.get("appointment_location"),
        appointment_instructions: row.get("appointment_instructions"),
        appointment_reason: row.get("appointment_reason"),
        appointment_decided_at: row.get("appointment_decided_at"),
        room1_final_reply_event_id: row.get("room1_final_reply_event_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const CASE_COLUMNS: &str = "case_id, status, room1_origin_room_id, room1_origin_event_id, \
    room1_sender_user_id, pdf_source_uri, extracted_text, agency_record_number, \
    structured_data, suggested_action, doctor_decision, doctor_support_flag, doctor_reason, \
    doctor_decided_at, appointment_status, appointment_at, appointment_location, \
    appointment_instructions, appointment_reason, appointment_decided_at, \
    room1_final_reply_event_id, created_at, updated_at";

/// Per-case latest activity, `GREATEST` of the case row's own `updated_at` and
/// the newest journal/transcript/reaction timestamp attached to it. Backs the
/// monitoring list's window filter and sort order, which track actual case
/// activity rather than only status transitions.
const ACTIVITY_CTE: &str = "WITH activity AS ( \
    SELECT c.case_id, \
        GREATEST( \
            c.updated_at, \
            COALESCE((SELECT MAX(e.captured_at) FROM case_events e WHERE e.case_id = c.case_id), c.updated_at), \
            COALESCE((SELECT MAX(m.captured_at) FROM case_messages m WHERE m.case_id = c.case_id), c.updated_at), \
            COALESCE((SELECT MAX(t.captured_at) FROM case_report_transcripts t WHERE t.case_id = c.case_id), c.updated_at), \
            COALESCE((SELECT MAX(r.reacted_at) FROM case_reaction_checkpoints r WHERE r.case_id = c.case_id), c.updated_at) \
        ) AS latest_activity_at \
    FROM cases c \
)";

async fn load_case(
    conn: &deadpool_postgres::Object,
    case_id: Uuid,
) -> Result<Case, StoreError> {
    let row = conn
        .query_one(&format!("SELECT {CASE_COLUMNS} FROM cases WHERE case_id = $1"), &[&case_id])
        .await?;
    Ok(row_to_case(&row))
}

#[async_trait]
impl CaseStore for PgStore {
    async fn create_case(&self, input: CaseCreateInput) -> Result<Case, StoreError> {
        let conn = self.conn().await?;
        let row = conn
            .query_one(
                &format!(
                    "INSERT INTO cases (case_id, status, room1_origin_room_id, \
                     room1_origin_event_id, room1_sender_user_id) \
                     VALUES ($1, $2, $3, $4, $5) RETURNING {CASE_COLUMNS}"
                ),
                &[
                    &input.case_id,
                    &input.status,
                    &input.room1_origin_room_id,
                    &input.room1_origin_event_id,
                    &input.room1_sender_user_id,
                ],
            )
            .await
            .map_err(|e| StoreError::from_db_error(e, StoreError::DuplicateOriginEvent))?;
        Ok(row_to_case(&row))
    }

    async fn get_case(&self, case_id: Uuid) -> Result<Option<Case>, StoreError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(&format!("SELECT {CASE_COLUMNS} FROM cases WHERE case_id = $1"), &[&case_id])
            .await?;
        Ok(row.as_ref().map(row_to_case))
    }

    async fn get_case_by_origin_event_id(
        &self,
        origin_event_id: &str,
    ) -> Result<Option<Case>, StoreError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                &format!("SELECT {CASE_COLUMNS} FROM cases WHERE room1_origin_event_id = $1"),
                &[&origin_event_id],
            )
            .await?;
        Ok(row.as_ref().map(row_to_case))
    }

    async fn set_status_with_transition(
        &self,
        case_id: Uuid,
        to: CaseStatus,
    ) -> Result<Case, StoreError> {
        let conn = self.conn().await?;
        let current = load_case(&conn, case_id).await?;
        crate::domain::transitions::assert_transition(current.status, to)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        let row = conn
            .query_one(
                &format!(
                    "UPDATE cases SET status = $2, updated_at = now() WHERE case_id = $1 \
                     RETURNING {CASE_COLUMNS}"
                ),
                &[&case_id, &to],
            )
            .await?;
        Ok(row_to_case(&row))
    }

    async fn store_pdf_extraction(
        &self,
        case_id: Uuid,
        extracted_text: &str,
        agency_record_number: &str,
        to_status: CaseStatus,
    ) -> Result<Case, StoreError> {
        let conn = self.conn().await?;
        let current = load_case(&conn, case_id).await?;
        crate::domain::transitions::assert_transition(current.status, to_status)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        let row = conn
            .query_one(
                &format!(
                    "UPDATE cases SET extracted_text = $2, agency_record_number = $3, \
                     status = $4, updated_at = now() WHERE case_id = $1 RETURNING {CASE_COLUMNS}"
                ),
                &[&case_id, &extracted_text, &agency_record_number, &to_status],
            )
            .await?;
        Ok(row_to_case(&row))
    }

    async fn store_llm1_artifacts(
        &self,
        case_id: Uuid,
        structured_data: serde_json::Value,
        to_status: CaseStatus,
    ) -> Result<Case, StoreError> {
        let conn = self.conn().await?;
        let current = load_case(&conn, case_id).await?;
        crate::domain::transitions::assert_transition(current.status, to_status)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        let row = conn
            .query_one(
                &format!(
                    "UPDATE cases SET structured_data = $2, status = $3, updated_at = now() \
                     WHERE case_id = $1 RETURNING {CASE_COLUMNS}"
                ),
                &[&case_id, &structured_data, &to_status],
            )
            .await?;
        Ok(row_to_case(&row))
    }

    async fn store_suggested_action(
        &self,
        case_id: Uuid,
        suggested_action: serde_json::Value,
        to_status: CaseStatus,
    ) -> Result<Case, StoreError> {
        let conn = self.conn().await?;
        let current = load_case(&conn, case_id).await?;
        crate::domain::transitions::assert_transition(current.status, to_status)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        let row = conn
            .query_one(
                &format!(
                    "UPDATE cases SET suggested_action = $2, status = $3, updated_at = now() \
                     WHERE case_id = $1 RETURNING {CASE_COLUMNS}"
                ),
                &[&case_id, &suggested_action, &to_status],
            )
            .await?;
        Ok(row_to_case(&row))
    }

    async fn record_doctor_decision(
        &self,
        case_id: Uuid,
        decision: DoctorDecision,
        support_flag: &str,
        reason: Option<&str>,
        to_status: CaseStatus,
    ) -> Result<Case, StoreError> {
        let conn = self.conn().await?;
        let current = load_case(&conn, case_id).await?;
        crate::domain::transitions::assert_transition(current.status, to_status)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        let decision_str = doctor_decision_str(decision);
        let row = conn
            .query_one(
                &format!(
                    "UPDATE cases SET doctor_decision = $2, doctor_support_flag = $3, \
                     doctor_reason = $4, doctor_decided_at = now(), status = $5, \
                     updated_at = now() WHERE case_id = $1 RETURNING {CASE_COLUMNS}"
                ),
                &[&case_id, &decision_str, &support_flag, &reason, &to_status],
            )
            .await?;
        Ok(row_to_case(&row))
    }

    async fn record_scheduler_outcome(
        &self,
        case_id: Uuid,
        appointment_status: AppointmentStatus,
        appointment_at: Option<DateTime<Utc>>,
        location: Option<&str>,
        instructions: Option<&str>,
        reason: Option<&str>,
        to_status: CaseStatus,
    ) -> Result<Case, StoreError> {
        let conn = self.conn().await?;
        let current = load_case(&conn, case_id).await?;
        crate::domain::transitions::assert_transition(current.status, to_status)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        let status_str = appointment_status_str(appointment_status);
        let row = conn
            .query_one(
                &format!(
                    "UPDATE cases SET appointment_status = $2, appointment_at = $3, \
                     appointment_location = $4, appointment_instructions = $5, \
                     appointment_reason = $6, appointment_decided_at = now(), status = $7, \
                     updated_at = now() WHERE case_id = $1 RETURNING {CASE_COLUMNS}"
                ),
                &[
                    &case_id,
                    &status_str,
                    &appointment_at,
                    &location,
                    &instructions,
                    &reason,
                    &to_status,
                ],
            )
            .await?;
        Ok(row_to_case(&row))
    }

    async fn set_room1_final_reply(
        &self,
        case_id: Uuid,
        event_id: &str,
        to_status: CaseStatus,
    ) -> Result<Case, StoreError> {
        let conn = self.conn().await?;
        let current = load_case(&conn, case_id).await?;
        crate::domain::transitions::assert_transition(current.status, to_status)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        let row = conn
            .query_one(
                &format!(
                    "UPDATE cases SET room1_final_reply_event_id = $2, status = $3, \
                     updated_at = now() WHERE case_id = $1 RETURNING {CASE_COLUMNS}"
                ),
                &[&case_id, &event_id, &to_status],
            )
            .await?;
        Ok(row_to_case(&row))
    }

    async fn mark_cleanup_completed(&self, case_id: Uuid) -> Result<Case, StoreError> {
        let conn = self.conn().await?;
        let current = load_case(&conn, case_id).await?;
        crate::domain::transitions::assert_transition(current.status, CaseStatus::Cleaned)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        let row = conn
            .query_one(
                &format!(
                    "UPDATE cases SET status = $2, updated_at = now() WHERE case_id = $1 \
                     RETURNING {CASE_COLUMNS}"
                ),
                &[&case_id, &CaseStatus::Cleaned],
            )
            .await?;
        Ok(row_to_case(&row))
    }

    async fn list_cases_page(
        &self,
        status: Option<CaseStatus>,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<CaseListEntry>, u64), StoreError> {
        let conn = self.conn().await?;
        let offset = ((page - 1) as i64) * (page_size as i64);

        let (rows, total) = if let Some(status) = status {
            let rows = conn
                .query(
                    &format!(
                        "{ACTIVITY_CTE} \
                         SELECT {CASE_COLUMNS}, activity.latest_activity_at FROM cases \
                         JOIN activity ON activity.case_id = cases.case_id \
                         WHERE cases.status = $1 \
                         AND activity.latest_activity_at >= $2 AND activity.latest_activity_at < $3 \
                         ORDER BY activity.latest_activity_at DESC, cases.case_id LIMIT $4 OFFSET $5"
                    ),
                    &[&status, &window_start, &window_end, &(page_size as i64), &offset],
                )
                .await?;
            let total: i64 = conn
                .query_one(
                    &format!(
                        "{ACTIVITY_CTE} \
                         SELECT COUNT(*) FROM cases JOIN activity ON activity.case_id = cases.case_id \
                         WHERE cases.status = $1 \
                         AND activity.latest_activity_at >= $2 AND activity.latest_activity_at < $3"
                    ),
                    &[&status, &window_start, &window_end],
                )
                .await?
                .get(0);
            (rows, total)
        } else {
            let rows = conn
                .query(
                    &format!(
                        "{ACTIVITY_CTE} \
                         SELECT {CASE_COLUMNS}, activity.latest_activity_at FROM cases \
                         JOIN activity ON activity.case_id = cases.case_id \
                         WHERE activity.latest_activity_at >= $1 AND activity.latest_activity_at < $2 \
                         ORDER BY activity.latest_activity_at DESC, cases.case_id LIMIT $3 OFFSET $4"
                    ),
                    &[&window_start, &window_end, &(page_size as i64), &offset],
                )
                .await?;
            let total: i64 = conn
                .query_one(
                    &format!(
                        "{ACTIVITY_CTE} \
                         SELECT COUNT(*) FROM cases JOIN activity ON activity.case_id = cases.case_id \
                         WHERE activity.latest_activity_at >= $1 AND activity.latest_activity_at < $2"
                    ),
                    &[&window_start, &window_end],
                )
                .await?
                .get(0);
            (rows, total)
        };

        let entries = rows
            .iter()
            .map(|row| CaseListEntry {
                case: row_to_case(row),
                latest_activity_at: row.get("latest_activity_at"),
            })
            .collect();
        Ok((entries, total as u64))
    }
}

#[async_trait]
impl JournalStore for PgStore {
    async fn append_case_event(&self, input: CaseEventInput) -> Result<CaseEvent, StoreError> {
        let conn = self.conn().await?;
        let actor_type_str = actor_type_str(input.actor_type);
        let row = conn
            .query_one(
                "INSERT INTO case_events (case_id, actor_type, actor_user_id, room_id, \
                 external_event_id, event_type, payload) VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 RETURNING id, case_id, actor_type, actor_user_id, room_id, external_event_id, \
                 event_type, payload, captured_at",
                &[
                    &input.case_id,
                    &actor_type_str,
                    &input.actor_user_id,
                    &input.room_id,
                    &input.external_event_id,
                    &input.event_type,
                    &input.payload,
                ],
            )
            .await?;
        Ok(CaseEvent {
            id: row.get("id"),
            case_id: row.get("case_id"),
            actor_type: parse_actor_type(row.get::<_, &str>("actor_type")),
            actor_user_id: row.get("actor_user_id"),
            room_id: row.get("room_id"),
            external_event_id: row.get("external_event_id"),
            event_type: row.get("event_type"),
            payload: row.get("payload"),
            captured_at: row.get("captured_at"),
        })
    }

    async fn append_auth_event(
        &self,
        user_id: Option<Uuid>,
        event_type: &str,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        payload: serde_json::Value,
    ) -> Result<AuthEvent, StoreError> {
        let conn = self.conn().await?;
        let row = conn
            .query_one(
                "INSERT INTO auth_events (user_id, event_type, ip_address, user_agent, payload) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING id, user_id, event_type, ip_address, \
                 user_agent, payload, created_at",
                &[&user_id, &event_type, &ip_address, &user_agent, &payload],
            )
            .await?;
        Ok(AuthEvent {
            id: row.get("id"),
            user_id: row.get("user_id"),
            event_type: row.get("event_type"),
            ip_address: row.get("ip_address"),
            user_agent: row.get("user_agent"),
            payload: row.get("payload"),
            created_at: row.get("created_at"),
        })
    }

    async fn add_case_message(
        &self,
        case_id: Uuid,
        room_id: &str,
        external_event_id: &str,
        sender_user_id: Option<&str>,
        kind: &str,
    ) -> Result<CaseMessage, StoreError> {
        let conn = self.conn().await?;
        let row = conn
            .query_one(
                "INSERT INTO case_messages (case_id, room_id, external_event_id, \
                 sender_user_id, kind) VALUES ($1, $2, $3, $4, $5) \
                 RETURNING id, case_id, room_id, external_event_id, sender_user_id, kind, captured_at",
                &[&case_id, &room_id, &external_event_id, &sender_user_id, &kind],
            )
            .await
            .map_err(|e| StoreError::from_db_error(e, StoreError::DuplicateCaseMessage))?;
        Ok(CaseMessage {
            id: row.get("id"),
            case_id: row.get("case_id"),
            room_id: row.get("room_id"),
            external_event_id: row.get("external_event_id"),
            sender_user_id: row.get("sender_user_id"),
            kind: row.get("kind"),
            captured_at: row.get("captured_at"),
        })
    }

    async fn list_message_refs_for_case(&self, case_id: Uuid) -> Result<Vec<MessageRef>, StoreError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT room_id, external_event_id FROM case_messages WHERE case_id = $1 ORDER BY id",
                &[&case_id],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|r| MessageRef { room_id: r.get("room_id"), external_event_id: r.get("external_event_id") })
            .collect())
    }

    async fn get_case_id_by_message_ref(
        &self,
        room_id: &str,
        external_event_id: &str,
    ) -> Result<Option<Uuid>, StoreError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT case_id FROM case_messages WHERE room_id = $1 AND external_event_id = $2",
                &[&room_id, &external_event_id],
            )
            .await?;
        Ok(row.map(|r| r.get("case_id")))
    }

    async fn list_timeline_for_case(&self, case_id: Uuid) -> Result<Vec<TimelineEntry>, StoreError> {
        let conn = self.conn().await?;
        let mut entries = Vec::new();

        let event_rows = conn
            .query(
                "SELECT event_type, payload, captured_at FROM case_events WHERE case_id = $1",
                &[&case_id],
            )
            .await?;
        for row in &event_rows {
            entries.push(TimelineEntry {
                timestamp: row.get("captured_at"),
                kind: row.get("event_type"),
                detail: row.get("payload"),
            });
        }

        let message_rows = conn
            .query(
                "SELECT kind, room_id, external_event_id, captured_at FROM case_messages WHERE case_id = $1",
                &[&case_id],
            )
            .await?;
        for row in &message_rows {
            let kind: String = row.get("kind");
            entries.push(TimelineEntry {
                timestamp: row.get("captured_at"),
                kind: format!("message:{kind}"),
                detail: serde_json::json!({
                    "room_id": row.get::<_, String>("room_id"),
                    "external_event_id": row.get::<_, String>("external_event_id"),
                }),
            });
        }

        let transcript_rows = conn
            .query(
                "SELECT kind, content, captured_at FROM case_report_transcripts WHERE case_id = $1",
                &[&case_id],
            )
            .await?;
        for row in &transcript_rows {
            let kind: String = row.get("kind");
            entries.push(TimelineEntry {
                timestamp: row.get("captured_at"),
                kind: format!("transcript:{kind}"),
                detail: serde_json::json!({ "content": row.get::<_, String>("content") }),
            });
        }

        let checkpoint_rows = conn
            .query(
                "SELECT stage, outcome, reacted_at, expected_at FROM case_reaction_checkpoints \
                 WHERE case_id = $1",
                &[&case_id],
            )
            .await?;
        for row in &checkpoint_rows {
            let outcome: String = row.get("outcome");
            let timestamp: DateTime<Utc> = row.get::<_, Option<DateTime<Utc>>>("reacted_at")
                .unwrap_or_else(|| row.get("expected_at"));
            entries.push(TimelineEntry {
                timestamp,
                kind: format!("checkpoint:{}", row.get::<_, String>("stage")),
                detail: serde_json::json!({ "outcome": outcome }),
            });
        }

        entries.sort_by_key(|e| e.timestamp);
        Ok(entries)
    }
}

#[async_trait]
impl JobQueue for PgStore {
    async fn enqueue(&self, input: JobEnqueueInput) -> Result<Job, StoreError> {
        let conn = self.conn().await?;
        let id = Uuid::new_v4();
        let run_after = input.run_after.unwrap_or_else(Utc::now);
        let row = conn
            .query_one(
                "INSERT INTO jobs (id, case_id, job_type, payload, status, attempts, run_after) \
                 VALUES ($1, $2, $3, $4, 'queued', 0, $5) \
                 RETURNING id, case_id, job_type, payload, status, attempts, run_after, \
                 last_error, created_at, updated_at",
                &[&id, &input.case_id, &input.job_type, &input.payload, &run_after],
            )
            .await?;
        Ok(row_to_job(&row))
    }

    async fn lease_next(&self) -> Result<Option<Job>, StoreError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "UPDATE jobs SET status = 'running', updated_at = now() WHERE id = ( \
                   SELECT id FROM jobs WHERE status = 'queued' AND run_after <= now() \
                   ORDER BY created_at FOR UPDATE SKIP LOCKED LIMIT 1 \
                 ) RETURNING id, case_id, job_type, payload, status, attempts, run_after, \
                 last_error, created_at, updated_at",
                &[],
            )
            .await?;
        Ok(row.as_ref().map(row_to_job))
    }

    async fn ack_done(&self, job_id: Uuid) -> Result<(), StoreError> {
        let conn = self.conn().await?;
        conn.execute(
            "UPDATE jobs SET status = 'done', updated_at = now() WHERE id = $1",
            &[&job_id],
        )
        .await?;
        Ok(())
    }

    async fn ack_retry(
        &self,
        job_id: Uuid,
        run_after: DateTime<Utc>,
        last_error: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn().await?;
        conn.execute(
            "UPDATE jobs SET status = 'queued', attempts = attempts + 1, run_after = $2, \
             last_error = $3, updated_at = now() WHERE id = $1",
            &[&job_id, &run_after, &last_error],
        )
        .await?;
        Ok(())
    }

    async fn ack_failed(&self, job_id: Uuid, last_error: &str) -> Result<(), StoreError> {
        let conn = self.conn().await?;
        conn.execute(
            "UPDATE jobs SET status = 'failed', last_error = $2, updated_at = now() WHERE id = $1",
            &[&job_id, &last_error],
        )
        .await?;
        Ok(())
    }

    async fn reconcile_running_jobs(&self) -> Result<u64, StoreError> {
        let conn = self.conn().await?;
        let count = conn
            .execute(
                "UPDATE jobs SET status = 'queued', updated_at = now() WHERE status = 'running'",
                &[],
            )
            .await?;
        Ok(count)
    }
}

fn row_to_job(row: &tokio_postgres::Row) -> Job {
    Job {
        id: row.get("id"),
        case_id: row.get("case_id"),
        job_type: row.get("job_type"),
        payload: row.get("payload"),
        status: parse_job_status(row.get::<_, &str>("status")),
        attempts: row.get("attempts"),
        run_after: row.get("run_after"),
        last_error: row.get("last_error"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl ReactionCheckpointStore for PgStore {
    async fn ensure_expected_checkpoint(&self, input: CheckpointCreateInput) -> Result<(), StoreError> {
        let conn = self.conn().await?;
        let stage = checkpoint_stage_str(input.stage);
        let result = conn
            .execute(
                "INSERT INTO case_reaction_checkpoints (case_id, stage, room_id, target_event_id) \
                 VALUES ($1, $2, $3, $4) ON CONFLICT (room_id, target_event_id) DO NOTHING",
                &[&input.case_id, &stage, &input.room_id, &input.target_external_event_id],
            )
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) => Err(StoreError::from_db_error(e, StoreError::DuplicateCheckpointTarget)),
        }
    }

    async fn mark_positive_reaction(&self, input: CheckpointReactionInput) -> Result<bool, StoreError> {
        let conn = self.conn().await?;
        let stage = checkpoint_stage_str(input.stage);
        let rows = conn
            .execute(
                "UPDATE case_reaction_checkpoints SET outcome = 'POSITIVE_RECEIVED', \
                 reaction_event_id = $4, reactor_user_id = $5, reaction_key = $6, reacted_at = now() \
                 WHERE stage = $1 AND room_id = $2 AND target_event_id = $3 AND outcome = 'PENDING'",
                &[
                    &stage,
                    &input.room_id,
                    &input.target_external_event_id,
                    &input.reaction_event_id,
                    &input.reactor_user_id,
                    &input.reaction_key,
                ],
            )
            .await?;
        Ok(rows == 1)
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn count_users(&self) -> Result<u64, StoreError> {
        let conn = self.conn().await?;
        let row = conn.query_one("SELECT COUNT(*) FROM users", &[]).await?;
        let count: i64 = row.get(0);
        Ok(count as u64)
    }

    async fn create_user(&self, input: UserCreateInput) -> Result<User, StoreError> {
        let conn = self.conn().await?;
        let user_id = Uuid::new_v4();
        let role = role_str(input.role);
        let row = conn
            .query_one(
                "INSERT INTO users (user_id, email, password_hash, role, account_status) \
                 VALUES ($1, $2, $3, $4, 'active') \
                 RETURNING user_id, email, password_hash, role, account_status, created_at",
                &[&user_id, &input.email, &input.password_hash, &role],
            )
            .await?;
        Ok(row_to_user(&row))
    }

    async fn insert_initial_admin_if_empty(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<bool, StoreError> {
        let conn = self.conn().await?;
        let count: i64 = conn.query_one("SELECT COUNT(*) FROM users", &[]).await?.get(0);
        if count > 0 {
            return Ok(false);
        }
        let user_id = Uuid::new_v4();
        let result = conn
            .execute(
                "INSERT INTO users (user_id, email, password_hash, role, account_status) \
                 VALUES ($1, $2, $3, 'admin', 'active')",
                &[&user_id, &email, &password_hash],
            )
            .await;
        match result {
            Ok(_) => Ok(true),
            Err(e) if e.as_db_error().map(|d| *d.code() == tokio_postgres::error::SqlState::UNIQUE_VIOLATION).unwrap_or(false) => {
                Ok(false)
            }
            Err(e) => Err(StoreError::Db(e)),
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT user_id, email, password_hash, role, account_status, created_at \
                 FROM users WHERE email = $1",
                &[&email],
            )
            .await?;
        Ok(row.as_ref().map(row_to_user))
    }

    async fn get_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT user_id, email, password_hash, role, account_status, created_at \
                 FROM users WHERE user_id = $1",
                &[&user_id],
            )
            .await?;
        Ok(row.as_ref().map(row_to_user))
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT user_id, email, password_hash, role, account_status, created_at \
                 FROM users ORDER BY created_at",
                &[],
            )
            .await?;
        Ok(rows.iter().map(row_to_user).collect())
    }

    async fn set_account_status(
        &self,
        user_id: Uuid,
        account_status: AccountStatus,
    ) -> Result<Option<User>, StoreError> {
        let conn = self.conn().await?;
        let status = account_status_str(account_status);
        let row = conn
            .query_opt(
                "UPDATE users SET account_status = $2 WHERE user_id = $1 \
                 RETURNING user_id, email, password_hash, role, account_status, created_at",
                &[&user_id, &status],
            )
            .await?;
        Ok(row.as_ref().map(row_to_user))
    }
}

fn row_to_user(row: &tokio_postgres::Row) -> User {
    User {
        user_id: row.get("user_id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: parse_role(row.get::<_, &str>("role")),
        account_status: parse_account_status(row.get::<_, &str>("account_status")),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl AuthTokenStore for PgStore {
    async fn create_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<AuthToken, StoreError> {
        let conn = self.conn().await?;
        let row = conn
            .query_one(
                "INSERT INTO auth_tokens (user_id, token_hash, expires_at) VALUES ($1, $2, $3) \
                 RETURNING id, user_id, token_hash, issued_at, expires_at, revoked_at, last_used_at",
                &[&user_id, &token_hash, &expires_at],
            )
            .await?;
        Ok(row_to_token(&row))
    }

    async fn get_active_by_hash(&self, token_hash: &str) -> Result<Option<AuthToken>, StoreError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT id, user_id, token_hash, issued_at, expires_at, revoked_at, last_used_at \
                 FROM auth_tokens WHERE token_hash = $1 AND revoked_at IS NULL AND expires_at > now()",
                &[&token_hash],
            )
            .await?;
        Ok(row.as_ref().map(row_to_token))
    }

    async fn revoke_active_tokens_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let conn = self.conn().await?;
        let count = conn
            .execute(
                "UPDATE auth_tokens SET revoked_at = now() WHERE user_id = $1 AND revoked_at IS NULL",
                &[&user_id],
            )
            .await?;
        Ok(count)
    }
}

fn row_to_token(row: &tokio_postgres::Row) -> AuthToken {
    AuthToken {
        id: row.get("id"),
        user_id: row.get("user_id"),
        token_hash: row.get("token_hash"),
        issued_at: row.get("issued_at"),
        expires_at: row.get("expires_at"),
        revoked_at: row.get("revoked_at"),
        last_used_at: row.get("last_used_at"),
    }
}

#[async_trait]
impl PromptTemplateStore for PgStore {
    async fn get_active(&self, name: &str) -> Result<Option<PromptTemplate>, StoreError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT name, version, content, is_active FROM prompt_templates \
                 WHERE name = $1 AND is_active LIMIT 1",
                &[&name],
            )
            .await?;
        Ok(row.map(|r| PromptTemplate {
            name: r.get("name"),
            version: r.get("version"),
            content: r.get("content"),
            is_active: r.get("is_active"),
        }))
    }
}

#[async_trait]
impl TranscriptStore for PgStore {
    async fn capture_transcript(&self, input: ReportTranscriptInput) -> Result<(), StoreError> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO case_report_transcripts (case_id, kind, content) VALUES ($1, $2, $3)",
            &[&input.case_id, &input.kind, &input.content],
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PriorCaseQuery for PgStore {
    async fn lookup_recent_context(
        &self,
        case_id: Uuid,
        agency_record_number: &str,
        now: DateTime<Utc>,
    ) -> Result<PriorCaseContext, StoreError> {
        let conn = self.conn().await?;
        let window_start = now - chrono::Duration::days(7);
        let rows = conn
            .query(
                "SELECT case_id, created_at, status, doctor_decision, doctor_decided_at, \
                 doctor_reason, appointment_status, appointment_decided_at, appointment_reason \
                 FROM cases WHERE agency_record_number = $1 AND created_at >= $2 \
                 AND created_at <= $3 AND case_id != $4",
                &[&agency_record_number, &window_start, &now, &case_id],
            )
            .await?;

        let mut candidates: Vec<(Uuid, DateTime<Utc>, CaseStatus, Option<String>, Option<DateTime<Utc>>, Option<String>, Option<String>, Option<DateTime<Utc>>, Option<String>)> =
            rows.iter()
                .map(|r| {
                    (
                        r.get("case_id"),
                        r.get("created_at"),
                        r.get("status"),
                        r.get("doctor_decision"),
                        r.get("doctor_decided_at"),
                        r.get("doctor_reason"),
                        r.get("appointment_status"),
                        r.get("appointment_decided_at"),
                        r.get("appointment_reason"),
                    )
                })
                .collect();

        candidates.sort_by_key(|c| std::cmp::Reverse(c.1));

        if candidates.is_empty() {
            return Ok(PriorCaseContext::default());
        }

        let denial_count = candidates
            .iter()
            .filter(|c| c.3.as_deref() == Some("deny") || c.6.as_deref() == Some("denied"))
            .count() as u32;

        let top = &candidates[0];
        let decision: &'static str = if top.3.as_deref() == Some("deny") {
            "deny_triage"
        } else if top.6.as_deref() == Some("denied") {
            "deny_appointment"
        } else if top.2 == CaseStatus::Failed {
            "failed"
        } else {
            "accepted"
        };
        let decided_at = top.4.or(top.7).unwrap_or(top.1);
        let reason = top.5.clone().or_else(|| top.8.clone());

        Ok(PriorCaseContext {
            prior_case: Some(PriorCaseSummary { prior_case_id: top.0, decided_at, decision, reason }),
            prior_denial_count_7d: Some(denial_count),
        })
    }
}

#[async_trait]
impl SummaryMetricsQuery for PgStore {
    async fn aggregate_metrics(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<SupervisorSummaryMetrics, StoreError> {
        let conn = self.conn().await?;

        let patients_received: i64 = conn
            .query_one(
                "SELECT COUNT(*) FROM cases WHERE created_at >= $1 AND created_at < $2",
                &[&window_start, &window_end],
            )
            .await?
            .get(0);
        let reports_processed: i64 = conn
            .query_one(
                "SELECT COUNT(*) FROM case_report_transcripts WHERE captured_at >= $1 AND captured_at < $2",
                &[&window_start, &window_end],
            )
            .await?
            .get(0);
        let cases_evaluated: i64 = conn
            .query_one(
                "SELECT COUNT(*) FROM cases WHERE doctor_decided_at IS NOT NULL \
                 AND doctor_decided_at >= $1 AND doctor_decided_at < $2",
                &[&window_start, &window_end],
            )
            .await?
            .get(0);
        let accepted: i64 = conn
            .query_one(
                "SELECT COUNT(*) FROM cases WHERE appointment_status = 'confirmed' \
                 AND appointment_decided_at IS NOT NULL \
                 AND appointment_decided_at >= $1 AND appointment_decided_at < $2",
                &[&window_start, &window_end],
            )
            .await?
            .get(0);
        let doctor_denied: i64 = conn
            .query_one(
                "SELECT COUNT(*) FROM cases WHERE doctor_decision = 'deny' \
                 AND doctor_decided_at IS NOT NULL \
                 AND doctor_decided_at >= $1 AND doctor_decided_at < $2",
                &[&window_start, &window_end],
            )
            .await?
            .get(0);
        // Sums doctor denials and scheduler denials without deduplicating a
        // case denied at both stages; the source formula is ambiguous about
        // double-counting and this keeps the same (unconfirmed) semantics.
        let scheduler_denied: i64 = conn
            .query_one(
                "SELECT COUNT(*) FROM cases WHERE appointment_status = 'denied' \
                 AND appointment_decided_at IS NOT NULL \
                 AND appointment_decided_at >= $1 AND appointment_decided_at < $2",
                &[&window_start, &window_end],
            )
            .await?
            .get(0);

        Ok(SupervisorSummaryMetrics {
            patients_received: patients_received as u64,
            reports_processed: reports_processed as u64,
            cases_evaluated: cases_evaluated as u64,
            accepted: accepted as u64,
            refused: (doctor_denied + scheduler_denied) as u64,
        })
    }
}
