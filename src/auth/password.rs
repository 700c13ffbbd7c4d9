//! Password hashing port, bcrypt-backed.

/// Password hashing contract. Verification must stay constant-time against
/// the hash comparison bcrypt already provides; callers never compare
/// plaintext passwords directly.
pub trait PasswordHasher: Send + Sync {
    fn hash_password(&self, password: &str) -> Result<String, bcrypt::BcryptError>;
    fn verify_password(&self, password: &str, password_hash: &str) -> bool;
}

pub struct BcryptPasswordHasher {
    cost: u32,
}

impl BcryptPasswordHasher {
    pub fn new() -> Self {
        Self { cost: bcrypt::DEFAULT_COST }
    }
}

impl Default for BcryptPasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordHasher for BcryptPasswordHasher {
    fn hash_password(&self, password: &str) -> Result<String, bcrypt::BcryptError> {
        bcrypt::hash(password, self.cost)
    }

    fn verify_password(&self, password: &str, password_hash: &str) -> bool {
        bcrypt::verify(password, password_hash).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_password() {
        let hasher = BcryptPasswordHasher::new();
        let hash = hasher.hash_password("correct horse battery staple").unwrap();
        assert!(hasher.verify_password("correct horse battery staple", &hash));
        assert!(!hasher.verify_password("wrong", &hash));
    }
}
