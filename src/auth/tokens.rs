//! Opaque bearer token issuance. Only `sha256(token)` is ever persisted;
//! the random token itself is returned to the caller exactly once.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::models::AuthToken;
use crate::error::StoreError;
use crate::store::AuthTokenStore;

const TOKEN_BYTES: usize = 32;

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub struct TokenService {
    store: Arc<dyn AuthTokenStore>,
    ttl: Duration,
}

impl TokenService {
    pub fn new(store: Arc<dyn AuthTokenStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Issue a fresh opaque token for `user_id`, returning the raw token
    /// (caller-visible exactly once) alongside the persisted record.
    pub async fn issue(&self, user_id: Uuid) -> Result<(String, AuthToken), StoreError> {
        let token = generate_token();
        let token_hash = hash_token(&token);
        let expires_at: DateTime<Utc> = Utc::now() + self.ttl;
        let record = self.store.create_token(user_id, &token_hash, expires_at).await?;
        Ok((token, record))
    }

    /// Look up the active record behind a raw bearer token, `None` if
    /// unknown/expired/revoked.
    pub async fn verify(&self, token: &str) -> Result<Option<AuthToken>, StoreError> {
        let token_hash = hash_token(token);
        self.store.get_active_by_hash(&token_hash).await
    }
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_tokens_hash_distinctly() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert_ne!(hash_token(&a), hash_token(&b));
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash_token("abc"), hash_token("abc"));
    }
}
