//! Port traits for durable storage. One Postgres adapter backs all of them
//! (see `store::postgres`), but callers depend only on these traits so the
//! worker/http/intake layers can be exercised against in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::case_status::CaseStatus;
use crate::domain::models::*;
use crate::error::StoreError;

/// Creation input for a new case row.
#[derive(Debug, Clone)]
pub struct CaseCreateInput {
    pub case_id: Uuid,
    pub status: CaseStatus,
    pub room1_origin_room_id: String,
    pub room1_origin_event_id: String,
    pub room1_sender_user_id: String,
}

#[async_trait]
pub trait CaseStore: Send + Sync {
    /// Create a case row, or fail with `StoreError::DuplicateOriginEvent`.
    async fn create_case(&self, input: CaseCreateInput) -> Result<Case, StoreError>;
    async fn get_case(&self, case_id: Uuid) -> Result<Option<Case>, StoreError>;
    async fn get_case_by_origin_event_id(
        &self,
        origin_event_id: &str,
    ) -> Result<Option<Case>, StoreError>;

    async fn set_status_with_transition(
        &self,
        case_id: Uuid,
        to: CaseStatus,
    ) -> Result<Case, StoreError>;

    async fn store_pdf_extraction(
        &self,
        case_id: Uuid,
        extracted_text: &str,
        agency_record_number: &str,
        to_status: CaseStatus,
    ) -> Result<Case, StoreError>;

    async fn store_llm1_artifacts(
        &self,
        case_id: Uuid,
        structured_data: serde_json::Value,
        to_status: CaseStatus,
    ) -> Result<Case, StoreError>;

    async fn store_suggested_action(
        &self,
        case_id: Uuid,
        suggested_action: serde_json::Value,
        to_status: CaseStatus,
    ) -> Result<Case, StoreError>;

    async fn record_doctor_decision(
        &self,
        case_id: Uuid,
        decision: DoctorDecision,
        support_flag: &str,
        reason: Option<&str>,
        to_status: CaseStatus,
    ) -> Result<Case, StoreError>;

    async fn record_scheduler_outcome(
        &self,
        case_id: Uuid,
        appointment_status: AppointmentStatus,
        appointment_at: Option<DateTime<Utc>>,
        location: Option<&str>,
        instructions: Option<&str>,
        reason: Option<&str>,
        to_status: CaseStatus,
    ) -> Result<Case, StoreError>;

    async fn set_room1_final_reply(
        &self,
        case_id: Uuid,
        event_id: &str,
        to_status: CaseStatus,
    ) -> Result<Case, StoreError>;

    async fn mark_cleanup_completed(&self, case_id: Uuid) -> Result<Case, StoreError>;

    /// Paginated monitoring list, windowed and ordered on `latest_activity_at`
    /// rather than `created_at`/`updated_at`; see `monitoring` module for the
    /// request/response types.
    async fn list_cases_page(
        &self,
        status: Option<CaseStatus>,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<CaseListEntry>, u64), StoreError>;
}

/// One row of a monitoring list page: a case paired with the most recent
/// activity timestamp across its status, journal, transcript, and reaction
/// history. Windowing and ordering for `list_cases_page` both key on this
/// field rather than `created_at`/`updated_at` alone.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CaseListEntry {
    #[serde(flatten)]
    pub case: Case,
    pub latest_activity_at: DateTime<Utc>,
}

#[async_trait]
pub trait JournalStore: Send + Sync {
    async fn append_case_event(&self, input: CaseEventInput) -> Result<CaseEvent, StoreError>;
    async fn append_auth_event(
        &self,
        user_id: Option<Uuid>,
        event_type: &str,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        payload: serde_json::Value,
    ) -> Result<AuthEvent, StoreError>;
    async fn add_case_message(
        &self,
        case_id: Uuid,
        room_id: &str,
        external_event_id: &str,
        sender_user_id: Option<&str>,
        kind: &str,
    ) -> Result<CaseMessage, StoreError>;
    async fn list_message_refs_for_case(&self, case_id: Uuid) -> Result<Vec<MessageRef>, StoreError>;
    async fn list_timeline_for_case(&self, case_id: Uuid) -> Result<Vec<TimelineEntry>, StoreError>;
    /// Reverse lookup used by the chat listener to resolve which case a threaded
    /// reply or reaction targets, from the `(room_id, event_id)` it replied to.
    async fn get_case_id_by_message_ref(
        &self,
        room_id: &str,
        external_event_id: &str,
    ) -> Result<Option<Uuid>, StoreError>;
}

/// One entry in a case's unified chronological timeline.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TimelineEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub detail: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct JobEnqueueInput {
    pub case_id: Option<Uuid>,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub run_after: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, input: JobEnqueueInput) -> Result<Job, StoreError>;
    /// Atomically select and lease the oldest ready job, or `None` if none ready.
    async fn lease_next(&self) -> Result<Option<Job>, StoreError>;
    async fn ack_done(&self, job_id: Uuid) -> Result<(), StoreError>;
    async fn ack_retry(
        &self,
        job_id: Uuid,
        run_after: DateTime<Utc>,
        last_error: &str,
    ) -> Result<(), StoreError>;
    async fn ack_failed(&self, job_id: Uuid, last_error: &str) -> Result<(), StoreError>;
    /// Bootstrap reconciliation: `running -> queued` for all jobs, run once at process start.
    async fn reconcile_running_jobs(&self) -> Result<u64, StoreError>;
}

#[derive(Debug, Clone)]
pub struct CheckpointCreateInput {
    pub case_id: Uuid,
    pub stage: CheckpointStage,
    pub room_id: String,
    pub target_external_event_id: String,
}

#[derive(Debug, Clone)]
pub struct CheckpointReactionInput {
    pub stage: CheckpointStage,
    pub room_id: String,
    pub target_external_event_id: String,
    pub reaction_event_id: String,
    pub reactor_user_id: String,
    pub reaction_key: String,
}

#[async_trait]
pub trait ReactionCheckpointStore: Send + Sync {
    /// Insert one expected checkpoint; duplicate `(room_id, target_event_id)` is absorbed.
    async fn ensure_expected_checkpoint(&self, input: CheckpointCreateInput) -> Result<(), StoreError>;
    /// Move a `PENDING` checkpoint to `POSITIVE_RECEIVED`; returns whether a row changed.
    async fn mark_positive_reaction(&self, input: CheckpointReactionInput) -> Result<bool, StoreError>;
}

#[derive(Debug, Clone)]
pub struct UserCreateInput {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn count_users(&self) -> Result<u64, StoreError>;
    async fn create_user(&self, input: UserCreateInput) -> Result<User, StoreError>;
    /// Insert one admin row iff the table is empty; second racer gets `Ok(false)`.
    async fn insert_initial_admin_if_empty(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<bool, StoreError>;
    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn get_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
    async fn set_account_status(
        &self,
        user_id: Uuid,
        account_status: AccountStatus,
    ) -> Result<Option<User>, StoreError>;
}

#[async_trait]
pub trait AuthTokenStore: Send + Sync {
    async fn create_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<AuthToken, StoreError>;
    async fn get_active_by_hash(&self, token_hash: &str) -> Result<Option<AuthToken>, StoreError>;
    async fn revoke_active_tokens_for_user(&self, user_id: Uuid) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait PromptTemplateStore: Send + Sync {
    async fn get_active(&self, name: &str) -> Result<Option<PromptTemplate>, StoreError>;
}

/// Prior-case summary used to enrich the Room-2 widget.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PriorCaseSummary {
    pub prior_case_id: Uuid,
    pub decided_at: DateTime<Utc>,
    pub decision: &'static str,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PriorCaseContext {
    pub prior_case: Option<PriorCaseSummary>,
    pub prior_denial_count_7d: Option<u32>,
}

#[async_trait]
pub trait PriorCaseQuery: Send + Sync {
    async fn lookup_recent_context(
        &self,
        case_id: Uuid,
        agency_record_number: &str,
        now: DateTime<Utc>,
    ) -> Result<PriorCaseContext, StoreError>;
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SupervisorSummaryMetrics {
    pub patients_received: u64,
    pub reports_processed: u64,
    pub cases_evaluated: u64,
    pub accepted: u64,
    pub refused: u64,
}

#[async_trait]
pub trait SummaryMetricsQuery: Send + Sync {
    async fn aggregate_metrics(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<SupervisorSummaryMetrics, StoreError>;
}

/// Capture of a report/LLM transcript, recorded so C12 can count
/// `reports_processed` and C11 can surface it in a case timeline.
#[derive(Debug, Clone)]
pub struct ReportTranscriptInput {
    pub case_id: Uuid,
    pub kind: String,
    pub content: String,
}

#[async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn capture_transcript(&self, input: ReportTranscriptInput) -> Result<(), StoreError>;
}
