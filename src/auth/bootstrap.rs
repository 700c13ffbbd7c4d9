//! Startup admin bootstrap: insert exactly one admin row the first time the
//! `users` table is empty, racing safely against a second process.

use std::sync::Arc;

use crate::auth::password::PasswordHasher;
use crate::config::AdminBootstrapConfig;
use crate::error::StoreError;
use crate::store::UserStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminBootstrapOutcome {
    Created,
    SkippedUsersPresent,
    SkippedConcurrentInsert,
}

pub async fn ensure_initial_admin_user(
    users: &Arc<dyn UserStore>,
    hasher: &Arc<dyn PasswordHasher>,
    config: &AdminBootstrapConfig,
) -> Result<AdminBootstrapOutcome, StoreError> {
    if users.count_users().await? > 0 {
        return Ok(AdminBootstrapOutcome::SkippedUsersPresent);
    }

    let password_hash = hasher
        .hash_password(&config.password)
        .map_err(|e| StoreError::Migration(e.to_string()))?;

    let inserted = users.insert_initial_admin_if_empty(&config.email, &password_hash).await?;
    Ok(if inserted {
        AdminBootstrapOutcome::Created
    } else {
        AdminBootstrapOutcome::SkippedConcurrentInsert
    })
}
