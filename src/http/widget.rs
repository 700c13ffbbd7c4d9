//! Dashboard widget alternative to the Room-2 chat decision reply (C18).
//! `submit` builds the exact same `key: value` body the chat parser expects
//! and calls the same handler the chat listener calls, so the two paths can
//! never drift in accepted decision semantics.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::case_status::CaseStatus;
use crate::domain::models::DoctorDecision;
use crate::error::ApiError;

use super::{auth_header, AppState};

#[derive(Debug, Deserialize)]
pub struct CaseIdQuery {
    case_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct BootstrapResponse {
    case_id: Uuid,
    status: CaseStatus,
    doctor_decision: Option<DoctorDecision>,
    doctor_reason: Option<String>,
}

async fn load_case_in_wait_doctor(
    state: &AppState,
    case_id: Uuid,
) -> Result<crate::domain::models::Case, ApiError> {
    let case = state
        .cases
        .get_case(case_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("case not found: {case_id}")))?;
    if case.status != CaseStatus::WaitDoctor {
        return Err(ApiError::WrongState(format!("case {case_id} is not awaiting doctor decision")));
    }
    Ok(case)
}

pub async fn bootstrap(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CaseIdQuery>,
) -> Result<Json<BootstrapResponse>, ApiError> {
    state.guard.require_admin_user(auth_header(&headers)).await?;
    let case = load_case_in_wait_doctor(&state, query.case_id).await?;
    Ok(Json(BootstrapResponse {
        case_id: case.case_id,
        status: case.status,
        doctor_decision: case.doctor_decision,
        doctor_reason: case.doctor_reason,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    case_id: Uuid,
    decision: String,
    support_flag: String,
    reason: Option<String>,
}

pub async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<BootstrapResponse>, ApiError> {
    state.guard.require_admin_user(auth_header(&headers)).await?;
    load_case_in_wait_doctor(&state, req.case_id).await?;

    let body = format!(
        "decision: {}\nsupport_flag: {}\nreason: {}\ncase_id: {}",
        req.decision,
        req.support_flag,
        req.reason.as_deref().unwrap_or(""),
        req.case_id
    );
    state
        .worker
        .handle_doctor_reply(req.case_id, &body)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    let updated = state
        .cases
        .get_case(req.case_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("case not found: {}", req.case_id)))?;

    Ok(Json(BootstrapResponse {
        case_id: updated.case_id,
        status: updated.status,
        doctor_decision: updated.doctor_decision,
        doctor_reason: updated.doctor_reason,
    }))
}
