use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which model family a request is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationPurpose {
    Companion,
    FollowUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub text: String,
}

/// Everything sent across the process boundary to the text-generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub purpose: GenerationPurpose,
    pub system_instruction: Option<String>,
    pub history: Vec<ChatTurn>,
    pub message: String,
}

impl GenerationRequest {
    /// Single-prompt summarization request.
    pub fn summarize(prompt: impl Into<String>) -> Self {
        Self {
            purpose: GenerationPurpose::FollowUp,
            system_instruction: None,
            history: Vec::new(),
            message: prompt.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("text generation is not configured")]
    Unconfigured,
    #[error("generation service returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("generation transport failed: {0}")]
    Transport(String),
    #[error("generation service returned no text")]
    EmptyResponse,
}

impl GenerationError {
    /// Status used for retry decisions; transport failures count as a 500.
    pub fn effective_status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(_) => Some(500),
            Self::Unconfigured | Self::EmptyResponse => None,
        }
    }

    fn reports_overload(&self) -> bool {
        let message = match self {
            Self::Status { message, .. } | Self::Transport(message) => message,
            Self::Unconfigured | Self::EmptyResponse => return false,
        };
        let lowered = message.to_ascii_lowercase();
        lowered.contains("overload") || lowered.contains("unavailable")
    }
}

/// Prompt in, text out. Implementations may fail or return malformed content.
pub trait TextGenerator: Send + Sync {
    fn generate(
        &self,
        request: GenerationRequest,
    ) -> impl Future<Output = Result<String, GenerationError>> + Send;
}

/// Bounded retry for the interactive chat path. The follow-up pipeline never
/// retries; it falls back to a default record instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub retryable_statuses: BTreeSet<u16>,
}

impl RetryPolicy {
    pub fn is_retryable(&self, error: &GenerationError) -> bool {
        let status_retryable = error
            .effective_status()
            .is_some_and(|status| self.retryable_statuses.contains(&status));
        status_retryable || error.reports_overload()
    }

    /// Delay after the given failed attempt (1-based): base, 2x base, 4x base, ...
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(400),
            retryable_statuses: crate::config::default_retryable_statuses(),
        }
    }
}
