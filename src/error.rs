//! Top-level error taxonomy, one enum per layer, composed with `thiserror`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {key}: {details}")]
    InvalidValue { key: &'static str, details: String },
    #[error("set only one of BOOTSTRAP_ADMIN_PASSWORD or BOOTSTRAP_ADMIN_PASSWORD_FILE")]
    ConflictingBootstrapPassword,
    #[error("BOOTSTRAP_ADMIN_EMAIL is required when bootstrap-admin variables are set")]
    BootstrapEmailRequired,
    #[error("failed to read BOOTSTRAP_ADMIN_PASSWORD_FILE: {0}")]
    BootstrapPasswordFile(String),
}

/// Store (Postgres adapter) failures, shared by every repository.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),
    #[error("database error: {0}")]
    Db(#[from] tokio_postgres::Error),
    #[error("migration error: {0}")]
    Migration(String),
    #[error("a case already exists for this origin event")]
    DuplicateOriginEvent,
    #[error("a message already exists for this room/event pair")]
    DuplicateCaseMessage,
    #[error("a checkpoint already exists for this room/event target")]
    DuplicateCheckpointTarget,
    #[error("case not found: {0}")]
    CaseNotFound(uuid::Uuid),
    #[error("user not found: {0}")]
    UserNotFound(uuid::Uuid),
}

impl StoreError {
    /// Classify a raw Postgres error into the duplicate-row variants our
    /// unique indices are responsible for, falling back to a plain wrap.
    pub fn from_db_error(err: tokio_postgres::Error, duplicate: StoreError) -> StoreError {
        if let Some(db) = err.as_db_error() {
            if db.code() == &tokio_postgres::error::SqlState::UNIQUE_VIOLATION {
                return duplicate;
            }
        }
        StoreError::Db(err)
    }
}

/// Domain-level invariant violation: an illegal case status transition.
#[derive(Debug, thiserror::Error)]
#[error("invalid case status transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: crate::domain::case_status::CaseStatus,
    pub to: crate::domain::case_status::CaseStatus,
}

/// Cause label attached to a handler failure, per §7's retriable/fatal table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerCause {
    Download,
    Extract,
    Llm1,
    Llm2,
    ChatPost,
    Parse,
    Db,
    Fatal,
}

impl HandlerCause {
    /// Whether a failure tagged with this cause should be retried with backoff.
    pub fn is_retriable(self) -> bool {
        !matches!(self, HandlerCause::Fatal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HandlerCause::Download => "download",
            HandlerCause::Extract => "extract",
            HandlerCause::Llm1 => "llm1",
            HandlerCause::Llm2 => "llm2",
            HandlerCause::ChatPost => "chat_post",
            HandlerCause::Parse => "parse",
            HandlerCause::Db => "db",
            HandlerCause::Fatal => "fatal",
        }
    }
}

/// A step handler failure, carrying the cause label the worker uses to decide
/// whether to requeue with backoff or mark the job permanently failed.
#[derive(Debug, thiserror::Error)]
#[error("{cause}: {details}", cause = self.cause.as_str())]
pub struct HandlerError {
    pub cause: HandlerCause,
    pub details: String,
}

impl HandlerError {
    pub fn new(cause: HandlerCause, details: impl Into<String>) -> Self {
        Self { cause, details: details.into() }
    }

    pub fn retriable(cause: HandlerCause, details: impl Into<String>) -> Self {
        Self::new(cause, details)
    }

    pub fn fatal(details: impl Into<String>) -> Self {
        Self::new(HandlerCause::Fatal, details)
    }
}

impl From<StoreError> for HandlerError {
    fn from(err: StoreError) -> Self {
        HandlerError::new(HandlerCause::Db, err.to_string())
    }
}

/// Failure posting the scheduled Room-4 supervisor summary.
#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("chat gateway error: {0}")]
    Chat(#[from] crate::chat::ChatGatewayError),
    #[error("invalid cron expression: {0}")]
    InvalidSchedule(String),
}

/// HTTP-facing error, rendered as `{"detail": "..."}` per the exposed error envelope.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing bearer token")]
    MissingAuthToken,
    #[error("invalid or expired auth token")]
    InvalidAuthToken,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("caller is not authorized for this action")]
    RoleNotAuthorized,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    WrongState(String),
    #[error("invalid monitoring period: to_date is before from_date")]
    InvalidPeriod,
    #[error("{0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::CaseNotFound(id) => ApiError::NotFound(format!("case not found: {id}")),
            StoreError::UserNotFound(id) => ApiError::NotFound(format!("user not found: {id}")),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::MissingAuthToken | ApiError::InvalidAuthToken | ApiError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::RoleNotAuthorized => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::WrongState(_) => StatusCode::CONFLICT,
            ApiError::InvalidPeriod => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorEnvelope { detail: self.to_string() })).into_response()
    }
}
