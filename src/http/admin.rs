use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::models::{Role, User};
use crate::error::ApiError;

use super::{auth_header, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    email: String,
    password: String,
    role: Role,
}

impl From<crate::auth::user_management::UserManagementError> for ApiError {
    fn from(err: crate::auth::user_management::UserManagementError) -> Self {
        use crate::auth::user_management::UserManagementError as E;
        match err {
            E::UserNotFound => ApiError::NotFound("user not found".to_string()),
            E::SelfUserManagement | E::LastActiveAdmin => ApiError::WrongState(err.to_string()),
            E::InvalidCredentials => ApiError::BadRequest(err.to_string()),
            E::Store(store_err) => ApiError::from(store_err),
        }
    }
}

pub async fn list_users(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Vec<User>>, ApiError> {
    state.guard.require_admin_user(auth_header(&headers)).await?;
    let users = state.users.list_users().await?;
    Ok(Json(users))
}

pub async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<User>, ApiError> {
    state.guard.require_admin_user(auth_header(&headers)).await?;
    let user = state.users.create_user(&req.email, &req.password, req.role).await?;
    Ok(Json(user))
}

pub async fn block_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> Result<Json<User>, ApiError> {
    let actor = state.guard.require_admin_user(auth_header(&headers)).await?;
    let user = state.users.block_user(actor.user_id, user_id).await?;
    Ok(Json(user))
}

pub async fn reactivate_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> Result<Json<User>, ApiError> {
    state.guard.require_admin_user(auth_header(&headers)).await?;
    let user = state.users.reactivate_user(user_id).await?;
    Ok(Json(user))
}

pub async fn remove_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> Result<Json<User>, ApiError> {
    let actor = state.guard.require_admin_user(auth_header(&headers)).await?;
    let user = state.users.remove_user(actor.user_id, user_id).await?;
    Ok(Json(user))
}
