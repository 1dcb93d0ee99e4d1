use std::collections::BTreeSet;
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::care::RetryPolicy;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub storage: StorageConfig,
    pub care: CareConfig,
    pub generation: GenerationConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "4343".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = LogFormat::parse(
            &env::var("APP_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string()),
        )?;

        let accounts_path = env::var("APP_ACCOUNTS_PATH").unwrap_or_else(|_| "./db.json".into());
        let chat_history_path =
            env::var("APP_CHAT_HISTORY_PATH").unwrap_or_else(|_| "./db/email.json".into());

        let lock_window_days = positive_var("PERMANENT_DOCTOR_DAYS", 2)
            .map_err(|_| ConfigError::InvalidLockWindow)?;
        let transcript_turns = positive_var("FOLLOW_UP_TRANSCRIPT_TURNS", 14)
            .map_err(|_| ConfigError::InvalidTranscriptTurns)?;

        let api_key = env::var("GOOGLE_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        let companion_model = env::var("GOOGLE_COMPANION_MODEL")
            .unwrap_or_else(|_| "gemini-2.0-flash".to_string());
        let follow_up_model = env::var("GOOGLE_FOLLOWUP_MODEL")
            .or_else(|_| env::var("GOOGLE_GEMINI_MODEL"))
            .unwrap_or_else(|_| "gemini-2.5-flash".to_string());

        let max_attempts = positive_var("COMPANION_MAX_ATTEMPTS", 3)
            .map_err(|_| ConfigError::InvalidRetryPolicy)?;
        let base_delay_ms = env::var("COMPANION_BASE_DELAY_MS")
            .unwrap_or_else(|_| "400".to_string())
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidRetryPolicy)?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                format: log_format,
            },
            storage: StorageConfig {
                accounts_path: PathBuf::from(accounts_path),
                chat_history_path: PathBuf::from(chat_history_path),
            },
            care: CareConfig {
                lock_window_days,
                transcript_turns: transcript_turns as usize,
            },
            generation: GenerationConfig {
                api_key,
                companion_model,
                follow_up_model,
                retry: RetryPolicy {
                    max_attempts,
                    base_delay: Duration::from_millis(base_delay_ms),
                    retryable_statuses: default_retryable_statuses(),
                },
            },
        })
    }
}

fn positive_var(name: &str, default: u32) -> Result<u32, ()> {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse::<u32>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(()),
        },
        Err(_) => Ok(default),
    }
}

pub(crate) fn default_retryable_statuses() -> BTreeSet<u16> {
    [408, 409, 429, 500, 502, 503, 504].into_iter().collect()
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" | "" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::InvalidLogFormat(other.to_string())),
        }
    }
}

/// Locations of the JSON-file collaborators.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub accounts_path: PathBuf,
    pub chat_history_path: PathBuf,
}

/// Doctor-assignment and follow-up dials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CareConfig {
    pub lock_window_days: u32,
    pub transcript_turns: usize,
}

impl CareConfig {
    pub fn lock_window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.lock_window_days))
    }
}

impl Default for CareConfig {
    fn default() -> Self {
        Self {
            lock_window_days: 2,
            transcript_turns: 14,
        }
    }
}

/// Text-generation credentials, model names, and the interactive retry policy.
#[derive(Clone)]
pub struct GenerationConfig {
    pub api_key: Option<String>,
    pub companion_model: String,
    pub follow_up_model: String,
    pub retry: RetryPolicy,
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("companion_model", &self.companion_model)
            .field("follow_up_model", &self.follow_up_model)
            .field("retry", &self.retry)
            .finish()
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidLogFormat(String),
    InvalidLockWindow,
    InvalidTranscriptTurns,
    InvalidRetryPolicy,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidLogFormat(value) => {
                write!(f, "APP_LOG_FORMAT must be 'compact' or 'json' (found '{value}')")
            }
            ConfigError::InvalidLockWindow => {
                write!(f, "PERMANENT_DOCTOR_DAYS must be a positive whole number")
            }
            ConfigError::InvalidTranscriptTurns => {
                write!(f, "FOLLOW_UP_TRANSCRIPT_TURNS must be a positive whole number")
            }
            ConfigError::InvalidRetryPolicy => write!(
                f,
                "COMPANION_MAX_ATTEMPTS must be positive and COMPANION_BASE_DELAY_MS a whole number"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
