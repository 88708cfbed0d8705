use crate::errors::{ServiceError, ServiceResult};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TRANSCRIPT_API_BASE: &str = "https://api.voiceflow.com/v2";

/// Options that govern a single export job and the inbound limiter.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Length of the inbound rate-limit window
    pub rate_window: Duration,
    /// Requests accepted per window, process-wide
    pub max_requests: u32,
    /// Pause before every session-turns call to the transcript service
    pub inter_call_delay: Duration,
    /// Budget for the whole job, from listing to a finished archive
    pub job_timeout: Duration,
    pub redaction_enabled: bool,
    pub redaction_url: Option<String>,
    pub transcript_api_base: String,
    /// Parent of every per-job working directory
    pub work_root: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            rate_window: Duration::from_millis(60_000),
            max_requests: 10,
            inter_call_delay: Duration::from_millis(250),
            job_timeout: Duration::from_millis(300_000),
            redaction_enabled: false,
            redaction_url: None,
            transcript_api_base: DEFAULT_TRANSCRIPT_API_BASE.to_string(),
            work_root: std::env::temp_dir(),
        }
    }
}

/// Process wiring for the HTTP server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub auth_token: String,
    pub export: ExportConfig,
}

impl ServerConfig {
    /// Load configuration from the environment, reading a `.env` file first if present.
    pub fn from_env() -> ServiceResult<Self> {
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> ServiceResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ExportConfig::default();

        let auth_token = lookup("AUTH_TOKEN")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| config_error("AUTH_TOKEN must be set"))?;

        let redaction_enabled = match lookup("REDACTION_ENABLED") {
            Some(v) => parse_bool("REDACTION_ENABLED", &v)?,
            None => defaults.redaction_enabled,
        };
        let redaction_url = lookup("REDACTION_URL").filter(|v| !v.trim().is_empty());
        if redaction_enabled && redaction_url.is_none() {
            return Err(config_error("REDACTION_URL must be set when REDACTION_ENABLED=true"));
        }

        let export = ExportConfig {
            rate_window: millis_or(&lookup, "RATE_WINDOW_MS", defaults.rate_window)?,
            max_requests: number_or(&lookup, "RATE_MAX_REQUESTS", defaults.max_requests)?,
            inter_call_delay: millis_or(&lookup, "INTER_CALL_DELAY_MS", defaults.inter_call_delay)?,
            job_timeout: millis_or(&lookup, "JOB_TIMEOUT_MS", defaults.job_timeout)?,
            redaction_enabled,
            redaction_url,
            transcript_api_base: lookup("TRANSCRIPT_API_BASE")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.transcript_api_base),
            work_root: lookup("WORK_ROOT").map(PathBuf::from).unwrap_or(defaults.work_root),
        };

        Ok(Self {
            bind: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: number_or(&lookup, "PORT", 3000u16)?,
            auth_token,
            export,
        })
    }
}

fn config_error(message: &str) -> ServiceError {
    ServiceError::Internal(format!("Configuration error: {}", message))
}

fn number_or<F, T>(lookup: &F, key: &str, default: T) -> ServiceResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| config_error(&format!("{} is not a valid number: {}", key, raw))),
        None => Ok(default),
    }
}

fn millis_or<F>(lookup: &F, key: &str, default: Duration) -> ServiceResult<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let ms = number_or(lookup, key, default.as_millis() as u64)?;
    Ok(Duration::from_millis(ms))
}

fn parse_bool(key: &str, raw: &str) -> ServiceResult<bool> {
    match raw.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(config_error(&format!("{} must be true or false, got {}", key, other))),
    }
}
