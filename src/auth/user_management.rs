//! Admin user lifecycle: create, block, reactivate, remove.

use std::sync::Arc;
use uuid::Uuid;

use crate::auth::password::PasswordHasher;
use crate::domain::credentials::{normalize_user_email, normalize_user_password};
use crate::domain::models::{AccountStatus, Role, User};
use crate::error::StoreError;
use crate::store::{AuthTokenStore, UserCreateInput, UserStore};

#[derive(Debug, thiserror::Error)]
pub enum UserManagementError {
    #[error("user not found")]
    UserNotFound,
    #[error("a user cannot perform this action on themselves")]
    SelfUserManagement,
    #[error("cannot disable the last active admin")]
    LastActiveAdmin,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct UserManagementService {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn AuthTokenStore>,
    hasher: Arc<dyn PasswordHasher>,
}

impl UserManagementService {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn AuthTokenStore>,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        Self { users, tokens, hasher }
    }

    pub async fn list_users(&self) -> Result<Vec<User>, UserManagementError> {
        Ok(self.users.list_users().await?)
    }

    pub async fn create_user(
        &self,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<User, UserManagementError> {
        let email =
            normalize_user_email(email).map_err(|_| UserManagementError::InvalidCredentials)?;
        let password =
            normalize_user_password(password).map_err(|_| UserManagementError::InvalidCredentials)?;
        let password_hash = self
            .hasher
            .hash_password(&password)
            .map_err(|e| UserManagementError::Store(StoreError::Migration(e.to_string())))?;
        Ok(self.users.create_user(UserCreateInput { email, password_hash, role }).await?)
    }

    pub async fn block_user(&self, actor: Uuid, target: Uuid) -> Result<User, UserManagementError> {
        self.disable(actor, target, AccountStatus::Blocked).await
    }

    pub async fn remove_user(&self, actor: Uuid, target: Uuid) -> Result<User, UserManagementError> {
        self.disable(actor, target, AccountStatus::Removed).await
    }

    pub async fn reactivate_user(&self, target: Uuid) -> Result<User, UserManagementError> {
        self.users
            .set_account_status(target, AccountStatus::Active)
            .await?
            .ok_or(UserManagementError::UserNotFound)
    }

    async fn disable(
        &self,
        actor: Uuid,
        target: Uuid,
        status: AccountStatus,
    ) -> Result<User, UserManagementError> {
        if actor == target {
            return Err(UserManagementError::SelfUserManagement);
        }

        let target_user = self
            .users
            .get_by_id(target)
            .await?
            .ok_or(UserManagementError::UserNotFound)?;

        if target_user.role == Role::Admin && target_user.is_active() {
            let users = self.users.list_users().await?;
            let active_admins = users
                .iter()
                .filter(|u| u.role == Role::Admin && u.is_active())
                .count();
            if active_admins <= 1 {
                return Err(UserManagementError::LastActiveAdmin);
            }
        }

        let updated = self
            .users
            .set_account_status(target, status)
            .await?
            .ok_or(UserManagementError::UserNotFound)?;
        self.tokens.revoke_active_tokens_for_user(target).await?;
        Ok(updated)
    }
}
