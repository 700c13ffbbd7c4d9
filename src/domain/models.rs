//! Entity records shared across store ports and services.
//!
//! These are the typed records that cross component boundaries; only the
//! `structured_data`/`payload`/`suggested_action` columns stay opaque JSON,
//! per the "don't expose untyped maps through public ports" design note.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::case_status::CaseStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoctorDecision {
    Accept,
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Confirmed,
    Denied,
}

/// The mutable case row. Created by Intake, mutated only by Worker step
/// handlers under transition guards, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub case_id: Uuid,
    pub status: CaseStatus,
    pub room1_origin_room_id: String,
    pub room1_origin_event_id: String,
    pub room1_sender_user_id: String,
    pub pdf_source_uri: Option<String>,
    pub extracted_text: Option<String>,
    pub agency_record_number: Option<String>,
    pub structured_data: Option<serde_json::Value>,
    pub suggested_action: Option<serde_json::Value>,
    pub doctor_decision: Option<DoctorDecision>,
    pub doctor_support_flag: Option<String>,
    pub doctor_reason: Option<String>,
    pub doctor_decided_at: Option<DateTime<Utc>>,
    pub appointment_status: Option<AppointmentStatus>,
    pub appointment_at: Option<DateTime<Utc>>,
    pub appointment_location: Option<String>,
    pub appointment_instructions: Option<String>,
    pub appointment_reason: Option<String>,
    pub appointment_decided_at: Option<DateTime<Utc>>,
    pub room1_final_reply_event_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    System,
    Bot,
    Human,
}

/// Append-only case journal entry. Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseEvent {
    pub id: i64,
    pub case_id: Uuid,
    pub actor_type: ActorType,
    pub actor_user_id: Option<String>,
    pub room_id: Option<String>,
    pub external_event_id: Option<String>,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub captured_at: DateTime<Utc>,
}

/// Input for appending one `CaseEvent`.
#[derive(Debug, Clone)]
pub struct CaseEventInput {
    pub case_id: Uuid,
    pub actor_type: ActorType,
    pub actor_user_id: Option<String>,
    pub room_id: Option<String>,
    pub external_event_id: Option<String>,
    pub event_type: String,
    pub payload: serde_json::Value,
}

/// A tracked chat message per case, used for end-of-lifecycle cleanup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseMessage {
    pub id: i64,
    pub case_id: Uuid,
    pub room_id: String,
    pub external_event_id: String,
    pub sender_user_id: Option<String>,
    pub kind: String,
    pub captured_at: DateTime<Utc>,
}

/// A `(room_id, external_event_id)` pair used during cleanup redaction.
#[derive(Debug, Clone)]
pub struct MessageRef {
    pub room_id: String,
    pub external_event_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }
}

/// One durable job queue row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub case_id: Option<Uuid>,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub attempts: i32,
    pub run_after: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckpointStage {
    Room2Ack,
    Room3Ack,
    Room1Final,
}

impl CheckpointStage {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckpointStage::Room2Ack => "ROOM2_ACK",
            CheckpointStage::Room3Ack => "ROOM3_ACK",
            CheckpointStage::Room1Final => "ROOM1_FINAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckpointOutcome {
    Pending,
    PositiveReceived,
}

/// A "we expect a positive reaction to this posted event" record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionCheckpoint {
    pub case_id: Uuid,
    pub stage: CheckpointStage,
    pub room_id: String,
    pub target_external_event_id: String,
    pub expected_at: DateTime<Utc>,
    pub outcome: CheckpointOutcome,
    pub reaction_event_id: Option<String>,
    pub reactor_user_id: Option<String>,
    pub reaction_key: Option<String>,
    pub reacted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Reader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Blocked,
    Removed,
}

/// A dashboard/API user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub account_status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.account_status == AccountStatus::Active
    }
}

/// An opaque bearer token record; only `token_hash` is ever persisted.
#[derive(Debug, Clone)]
pub struct AuthToken {
    pub id: i64,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl AuthToken {
    /// A token is active iff `revoked_at IS NULL AND expires_at > now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

/// Append-only auth audit trail entry.
#[derive(Debug, Clone)]
pub struct AuthEvent {
    pub id: i64,
    pub user_id: Option<Uuid>,
    pub event_type: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A versioned prompt template. At most one active row per `name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub name: String,
    pub version: i32,
    pub content: String,
    pub is_active: bool,
}
