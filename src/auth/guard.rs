//! Bearer-token extraction and role-based authorization guard.

use std::sync::Arc;

use crate::auth::tokens::hash_token;
use crate::domain::models::{Role, User};
use crate::error::ApiError;
use crate::store::{AuthTokenStore, UserStore};

/// Strict `Authorization: Bearer <token>` split.
pub fn extract_bearer_token(authorization_header: Option<&str>) -> Result<&str, ApiError> {
    let header = authorization_header.ok_or(ApiError::MissingAuthToken)?;
    let token = header.strip_prefix("Bearer ").ok_or(ApiError::InvalidAuthToken)?;
    if token.is_empty() {
        return Err(ApiError::InvalidAuthToken);
    }
    Ok(token)
}

pub struct AuthGuard {
    tokens: Arc<dyn AuthTokenStore>,
    users: Arc<dyn UserStore>,
}

impl AuthGuard {
    pub fn new(tokens: Arc<dyn AuthTokenStore>, users: Arc<dyn UserStore>) -> Self {
        Self { tokens, users }
    }

    async fn resolve_active_user(&self, authorization_header: Option<&str>) -> Result<User, ApiError> {
        let token = extract_bearer_token(authorization_header)?;
        let token_hash = hash_token(token);
        let record = self
            .tokens
            .get_active_by_hash(&token_hash)
            .await
            .map_err(ApiError::from)?
            .ok_or(ApiError::InvalidAuthToken)?;
        let user = self
            .users
            .get_by_id(record.user_id)
            .await
            .map_err(ApiError::from)?
            .ok_or(ApiError::InvalidAuthToken)?;
        if !user.is_active() {
            return Err(ApiError::InvalidAuthToken);
        }
        Ok(user)
    }

    pub async fn require_admin_user(&self, authorization_header: Option<&str>) -> Result<User, ApiError> {
        let user = self.resolve_active_user(authorization_header).await?;
        if user.role != Role::Admin {
            return Err(ApiError::RoleNotAuthorized);
        }
        Ok(user)
    }

    pub async fn require_audit_user(&self, authorization_header: Option<&str>) -> Result<User, ApiError> {
        let user = self.resolve_active_user(authorization_header).await?;
        match user.role {
            Role::Admin | Role::Reader => Ok(user),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_header() {
        assert!(matches!(extract_bearer_token(None), Err(ApiError::MissingAuthToken)));
    }

    #[test]
    fn rejects_malformed_header() {
        assert!(matches!(extract_bearer_token(Some("Token abc")), Err(ApiError::InvalidAuthToken)));
    }

    #[test]
    fn accepts_bearer_header() {
        assert_eq!(extract_bearer_token(Some("Bearer abc123")).unwrap(), "abc123");
    }
}
