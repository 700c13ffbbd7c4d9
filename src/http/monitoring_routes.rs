use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::case_status::CaseStatus;
use crate::error::ApiError;
use crate::monitoring::{CaseDetail, CaseListPage, CaseListParams};

use super::{auth_header, AppState};

#[derive(Debug, Deserialize)]
pub struct ListCasesQuery {
    page: Option<u32>,
    page_size: Option<u32>,
    status: Option<String>,
    from_date: Option<NaiveDate>,
    to_date: Option<NaiveDate>,
}

pub async fn list_cases(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListCasesQuery>,
) -> Result<Json<CaseListPage>, ApiError> {
    state.guard.require_audit_user(auth_header(&headers)).await?;

    let status = query
        .status
        .map(|raw| raw.parse::<CaseStatus>())
        .transpose()
        .map_err(|err| ApiError::BadRequest(err.to_string()))?;

    let params = CaseListParams {
        page: query.page.unwrap_or(1),
        page_size: query.page_size.unwrap_or(20),
        status,
        from_date: query.from_date,
        to_date: query.to_date,
    };

    let page = state.monitoring.list_cases(params).await?;
    Ok(Json(page))
}

pub async fn get_case_detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(case_id): Path<Uuid>,
) -> Result<Json<CaseDetail>, ApiError> {
    state.guard.require_audit_user(auth_header(&headers)).await?;
    let detail = state.monitoring.get_case_detail(case_id).await?;
    Ok(Json(detail))
}
