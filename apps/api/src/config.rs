use std::str::FromStr;

use anyhow::{bail, Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub rust_log: String,
    pub mail: MailConfig,
    pub site_name: String,
    pub site_url: String,
    /// Upper bound on a single outbound email, in seconds.
    pub mail_send_timeout_secs: u64,
    /// Non-negative by type; a negative env value fails startup.
    pub instant_debounce_secs: u32,
    pub sweep_interval_secs: u64,
    pub event_channel_capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailBackend {
    /// Writes messages to the log instead of sending them.
    Log,
    Smtp,
}

impl FromStr for MailBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" | "console" => Ok(MailBackend::Log),
            "smtp" => Ok(MailBackend::Smtp),
            other => bail!("MAIL_BACKEND must be 'log' or 'smtp', got '{other}'"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub backend: MailBackend,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_pass: Option<String>,
    pub from_email: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let mail = MailConfig {
            backend: env_or("MAIL_BACKEND", MailBackend::Log)?,
            smtp_host: optional_env("SMTP_HOST"),
            smtp_port: env_or("SMTP_PORT", 587)?,
            smtp_user: optional_env("SMTP_USER"),
            smtp_pass: optional_env("SMTP_PASS"),
            from_email: optional_env("DEFAULT_FROM_EMAIL")
                .unwrap_or_else(|| "noreply@jobboard.local".to_string()),
        };
        if mail.backend == MailBackend::Smtp && mail.smtp_host.is_none() {
            bail!("SMTP_HOST is required when MAIL_BACKEND=smtp");
        }

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            port: env_or("PORT", 8080)?,
            rust_log: optional_env("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            mail,
            site_name: optional_env("SITE_NAME").unwrap_or_else(|| "JobBoard".to_string()),
            site_url: optional_env("SITE_URL")
                .unwrap_or_else(|| "http://localhost:8000".to_string())
                .trim_end_matches('/')
                .to_string(),
            mail_send_timeout_secs: env_or("MAIL_SEND_TIMEOUT_SECS", 30)?,
            instant_debounce_secs: env_or(
                "INSTANT_DEBOUNCE_SECS",
                crate::alerts::schedule::INSTANT_DEBOUNCE_SECS,
            )?,
            sweep_interval_secs: env_or("SWEEP_INTERVAL_SECS", 3600)?,
            event_channel_capacity: env_or("EVENT_CHANNEL_CAPACITY", 256)?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_setting(key, optional_env(key), default)
}

fn parse_setting<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key} is invalid ('{raw}'): {e}")),
    }
}
