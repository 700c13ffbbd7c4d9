use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::auth::AuthOutcome;
use crate::error::ApiError;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    token: String,
    user_id: uuid::Uuid,
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let ip = connect_info.map(|ConnectInfo(addr)| addr.ip().to_string());
    let user_agent = headers.get(axum::http::header::USER_AGENT).and_then(|v| v.to_str().ok());

    let result = state
        .auth
        .authenticate(&req.email, &req.password, ip.as_deref(), user_agent)
        .await
        .map_err(ApiError::from)?;

    match result.outcome {
        AuthOutcome::Success => {
            let (token, record) = result.issued.expect("success outcome always carries a token");
            Ok(Json(LoginResponse { token, user_id: record.user_id }))
        }
        AuthOutcome::InvalidCredentials => Err(ApiError::InvalidCredentials),
        AuthOutcome::InactiveUser => Err(ApiError::InvalidCredentials),
    }
}
