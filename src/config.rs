//! Environment-driven runtime settings, loaded once at process start.
//!
//! Mirrors the upstream pattern of typed config structs parsed from `std::env`
//! (plus `.env` via `dotenvy`) rather than a process-global mutable singleton.

use std::path::Path;

use crate::error::ConfigError;

/// Database connection settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: usize,
}

impl DatabaseConfig {
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Which LLM backend the pipeline calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmRuntimeMode {
    /// No network calls; canned responses for local/dev/test runs.
    Deterministic,
    /// Calls out to a configured LLM provider.
    Provider,
}

/// Bootstrap-admin configuration, present only when all required env vars are set.
#[derive(Debug, Clone)]
pub struct AdminBootstrapConfig {
    pub email: String,
    pub password: String,
}

/// All recognized configuration keys, loaded once and passed by `Arc`.
#[derive(Debug, Clone)]
pub struct Settings {
    pub room1_id: String,
    pub room2_id: String,
    pub room3_id: String,
    pub room4_id: String,
    pub matrix_homeserver_url: String,
    pub matrix_bot_user_id: String,
    pub matrix_access_token: String,
    pub matrix_sync_timeout_ms: u64,
    pub matrix_poll_interval_seconds: f64,
    pub worker_poll_interval_seconds: f64,
    pub webhook_public_url: String,
    pub webhook_hmac_secret: String,
    pub database: DatabaseConfig,
    pub llm_runtime_mode: LlmRuntimeMode,
    pub openai_api_key: Option<String>,
    pub log_level: String,
    pub summary_cron_expression: String,
    pub bootstrap_admin: Option<AdminBootstrapConfig>,
}

impl Settings {
    /// Load settings from the process environment (`.env` loaded once beforehand).
    pub fn from_env() -> Result<Settings, ConfigError> {
        let room1_id = require_var("ROOM1_ID")?;
        let room2_id = require_var("ROOM2_ID")?;
        let room3_id = require_var("ROOM3_ID")?;
        let room4_id = var_or("ROOM4_ID", &room1_id);
        let matrix_homeserver_url = require_var("MATRIX_HOMESERVER_URL")?;
        let matrix_bot_user_id = require_var("MATRIX_BOT_USER_ID")?;
        let matrix_access_token = require_var("MATRIX_ACCESS_TOKEN")?;
        let matrix_sync_timeout_ms = parse_var_or("MATRIX_SYNC_TIMEOUT_MS", 30_000u64)?;
        let matrix_poll_interval_seconds = parse_var_or("MATRIX_POLL_INTERVAL_SECONDS", 1.0f64)?;
        let worker_poll_interval_seconds = parse_var_or("WORKER_POLL_INTERVAL_SECONDS", 1.0f64)?;
        let webhook_public_url = require_var("WEBHOOK_PUBLIC_URL")?;
        let webhook_hmac_secret = require_var("WEBHOOK_HMAC_SECRET")?;
        let database_url = require_var("DATABASE_URL")?;
        let pool_size = parse_var_or("DATABASE_POOL_SIZE", 10usize)?;
        let llm_runtime_mode = match std::env::var("LLM_RUNTIME_MODE").ok().as_deref() {
            None | Some("deterministic") => LlmRuntimeMode::Deterministic,
            Some("provider") => LlmRuntimeMode::Provider,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "LLM_RUNTIME_MODE",
                    details: format!("expected deterministic|provider, got {other}"),
                })
            }
        };
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let log_level = var_or("LOG_LEVEL", "info");
        let summary_cron_expression = var_or("SUMMARY_CRON_EXPRESSION", "0 0 8 * * *");

        let bootstrap_admin = resolve_admin_bootstrap_config(
            std::env::var("BOOTSTRAP_ADMIN_EMAIL").ok(),
            std::env::var("BOOTSTRAP_ADMIN_PASSWORD").ok(),
            std::env::var("BOOTSTRAP_ADMIN_PASSWORD_FILE").ok(),
        )?;

        Ok(Settings {
            room1_id,
            room2_id,
            room3_id,
            room4_id,
            matrix_homeserver_url,
            matrix_bot_user_id,
            matrix_access_token,
            matrix_sync_timeout_ms,
            matrix_poll_interval_seconds,
            worker_poll_interval_seconds,
            webhook_public_url,
            webhook_hmac_secret,
            database: DatabaseConfig { url: database_url, pool_size },
            llm_runtime_mode,
            openai_api_key,
            log_level,
            summary_cron_expression,
            bootstrap_admin,
        })
    }
}

/// Resolve bootstrap-admin config from env values, or `None` when disabled.
///
/// Mirrors the upstream xor rule: email is the switch, password and
/// password-file are mutually exclusive, and a set email with nothing else
/// resolved is a configuration error rather than silently ignored.
fn resolve_admin_bootstrap_config(
    email: Option<String>,
    password: Option<String>,
    password_file: Option<String>,
) -> Result<Option<AdminBootstrapConfig>, ConfigError> {
    let any_set = email.is_some() || password.is_some() || password_file.is_some();
    let Some(email) = email else {
        return if any_set { Err(ConfigError::BootstrapEmailRequired) } else { Ok(None) };
    };

    if password.is_some() && password_file.is_some() {
        return Err(ConfigError::ConflictingBootstrapPassword);
    }

    let resolved_password = if let Some(path) = password_file {
        Some(
            std::fs::read_to_string(Path::new(&path))
                .map_err(|e| ConfigError::BootstrapPasswordFile(e.to_string()))?
                .trim()
                .to_string(),
        )
    } else {
        password
    };

    let Some(password) = resolved_password else {
        return Err(ConfigError::InvalidValue {
            key: "BOOTSTRAP_ADMIN_PASSWORD",
            details: "set BOOTSTRAP_ADMIN_PASSWORD or BOOTSTRAP_ADMIN_PASSWORD_FILE".to_string(),
        });
    };

    let email = crate::domain::credentials::normalize_user_email(&email).map_err(|_| {
        ConfigError::InvalidValue {
            key: "BOOTSTRAP_ADMIN_EMAIL",
            details: "cannot be blank".to_string(),
        }
    })?;
    let password = crate::domain::credentials::normalize_user_password(&password).map_err(|_| {
        ConfigError::InvalidValue {
            key: "BOOTSTRAP_ADMIN_PASSWORD",
            details: "cannot be blank".to_string(),
        }
    })?;

    Ok(Some(AdminBootstrapConfig { email, password }))
}

fn require_var(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingVar(key))
}

fn var_or(key: &'static str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_var_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
            key,
            details: e.to_string(),
        }),
    }
}
