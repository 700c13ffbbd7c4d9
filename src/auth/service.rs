//! Login authentication service. Always emits an auth event regardless of
//! which branch the outcome takes, per the original's audit requirement.

use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::password::PasswordHasher;
use crate::auth::tokens::TokenService;
use crate::domain::credentials::{normalize_user_email, normalize_user_password};
use crate::domain::models::AuthToken;
use crate::error::StoreError;
use crate::store::{JournalStore, UserStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Success,
    InvalidCredentials,
    InactiveUser,
}

pub struct AuthResult {
    pub outcome: AuthOutcome,
    pub issued: Option<(String, AuthToken)>,
}

pub struct AuthService {
    users: Arc<dyn UserStore>,
    journal: Arc<dyn JournalStore>,
    hasher: Arc<dyn PasswordHasher>,
    tokens: Arc<TokenService>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        journal: Arc<dyn JournalStore>,
        hasher: Arc<dyn PasswordHasher>,
        tokens: Arc<TokenService>,
    ) -> Self {
        Self { users, journal, hasher, tokens }
    }

    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<AuthResult, StoreError> {
        let Ok(email) = normalize_user_email(email) else {
            return self.deny(None, "login_failed", ip_address, user_agent).await;
        };
        let Ok(password) = normalize_user_password(password) else {
            return self.deny(None, "login_failed", ip_address, user_agent).await;
        };

        let user = self.users.get_by_email(&email).await?;
        let Some(user) = user else {
            return self.deny(None, "login_failed", ip_address, user_agent).await;
        };

        if !user.is_active() {
            return self.deny(Some(user.user_id), "login_blocked_inactive", ip_address, user_agent).await;
        }

        if !self.hasher.verify_password(&password, &user.password_hash) {
            return self.deny(Some(user.user_id), "login_failed", ip_address, user_agent).await;
        }

        let issued = self.tokens.issue(user.user_id).await?;
        self.journal
            .append_auth_event(Some(user.user_id), "login_success", ip_address, user_agent, json!({}))
            .await?;

        Ok(AuthResult { outcome: AuthOutcome::Success, issued: Some(issued) })
    }

    async fn deny(
        &self,
        user_id: Option<Uuid>,
        event_type: &str,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<AuthResult, StoreError> {
        self.journal.append_auth_event(user_id, event_type, ip_address, user_agent, json!({})).await?;
        let outcome = if event_type == "login_blocked_inactive" {
            AuthOutcome::InactiveUser
        } else {
            AuthOutcome::InvalidCredentials
        };
        Ok(AuthResult { outcome, issued: None })
    }
}
