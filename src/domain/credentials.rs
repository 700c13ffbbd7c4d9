//! Shared normalization helpers for user credential inputs.

/// Normalize one user email and reject blank values.
pub fn normalize_user_email(email: &str) -> Result<String, &'static str> {
    let normalized = email.trim().to_lowercase();
    if normalized.is_empty() {
        return Err("email cannot be blank");
    }
    Ok(normalized)
}

/// Normalize one plaintext password and reject blank values.
pub fn normalize_user_password(password: &str) -> Result<String, &'static str> {
    let normalized = password.trim().to_string();
    if normalized.is_empty() {
        return Err("password cannot be blank");
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_and_lowercases_email() {
        assert_eq!(normalize_user_email("  Doctor@Example.COM ").unwrap(), "doctor@example.com");
    }

    #[test]
    fn rejects_blank_email() {
        assert!(normalize_user_email("   ").is_err());
    }

    #[test]
    fn rejects_blank_password() {
        assert!(normalize_user_password("").is_err());
        assert!(normalize_user_password("   ").is_err());
    }

    #[test]
    fn trims_password_without_lowercasing() {
        assert_eq!(normalize_user_password("  S3cret  ").unwrap(), "S3cret");
    }
}
