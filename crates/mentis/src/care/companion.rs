use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::errors::{CareError, ValidationError};
use super::generation::{
    ChatTurn, GenerationError, GenerationPurpose, GenerationRequest, RetryPolicy, TextGenerator,
    TurnRole,
};

/// Client-supplied turns kept as context for the next reply.
pub const HISTORY_LIMIT: usize = 10;

pub const COMPANION_INSTRUCTION: &str = r#"You are "The Empathic Companion" inside a self-development and therapeutic application.
Act as a compassionate, understanding friend and advisor for people who experience excessive daydreaming or mental escapism.

Core objectives:
- Help the user understand their mental and emotional state step by step.
- Encourage consistent improvement, focus, and turning dreams into real actions.
- Assess their condition through numeric indicators in a friendly, non-clinical way.

During every session, gather information naturally, then share a numerical assessment across four indicators:
1. Daydreaming intensity (0 = none, 10 = very high)
2. Daily focus and task engagement (0 = very weak, 10 = excellent)
3. General mood (0 = deep sadness, 10 = happiness and stability)
4. Social or academic impact (0 = no effect, 10 = severe impact)

Privacy:
- Never store or send sensitive personal details.

Risk protocol:
- If critical thoughts appear, respond with deep compassion, ask gently about real intention, and encourage immediate help.

Important boundaries:
- Never claim to diagnose. Provide behavioural and emotional insights only.
- Always respond in the same language and dialect as the latest user message or the language hint supplied.
"#;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

impl HistoryItem {
    pub fn new(role: &str, text: &str) -> Self {
        Self {
            role: Some(role.to_string()),
            text: Some(text.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub history: Vec<HistoryItem>,
    #[serde(default = "auto_language")]
    pub language: String,
}

fn auto_language() -> String {
    "auto".to_string()
}

/// Interactive companion path. Unlike follow-up summaries, failures here are
/// retried under a bounded policy and then surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanionChat {
    retry: RetryPolicy,
}

impl CompanionChat {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Trimmed user message plus the generation request built from it.
    pub fn prepare(&self, request: &ChatRequest) -> Result<(String, GenerationRequest), ValidationError> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(ValidationError::MissingField("message"));
        }

        let generation = GenerationRequest {
            purpose: GenerationPurpose::Companion,
            system_instruction: Some(COMPANION_INSTRUCTION.to_string()),
            history: prepare_history(&request.history),
            message: compose_message(message, &request.language),
        };
        Ok((message.to_string(), generation))
    }

    pub async fn reply<G>(&self, generator: &G, request: GenerationRequest) -> Result<String, CareError>
    where
        G: TextGenerator,
    {
        let attempts = self.retry.attempts();
        let mut attempt = 1;
        loop {
            match generator.generate(request.clone()).await {
                Ok(reply) => return Ok(reply),
                // a reply with no text still ends the turn
                Err(GenerationError::EmptyResponse) => {
                    debug!(attempt, "companion returned no text");
                    return Ok(String::new());
                }
                Err(error) => {
                    let retryable = self.retry.is_retryable(&error);
                    if !retryable || attempt >= attempts {
                        warn!(%error, attempt, retryable, "companion reply failed");
                        return Err(CareError::UpstreamUnavailable {
                            retryable,
                            source: error,
                        });
                    }
                    let delay = self.retry.delay_after(attempt);
                    debug!(%error, attempt, delay_ms = delay.as_millis() as u64, "retrying companion reply");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Keep usable entries, last ten, mapped to model/user turns. A leading model
/// turn is dropped, as is any turn repeating the role of the entry before it.
pub fn prepare_history(items: &[HistoryItem]) -> Vec<ChatTurn> {
    let usable: Vec<ChatTurn> = items
        .iter()
        .filter_map(|item| {
            let role = item.role.as_deref()?;
            let text = item.text.as_deref()?.trim();
            if text.is_empty() {
                return None;
            }
            let role = if role == "assistant" {
                TurnRole::Model
            } else {
                TurnRole::User
            };
            Some(ChatTurn {
                role,
                text: text.to_string(),
            })
        })
        .collect();

    let start = usable.len().saturating_sub(HISTORY_LIMIT);
    let window = &usable[start..];

    window
        .iter()
        .enumerate()
        .filter(|(index, turn)| {
            if *index == 0 {
                return turn.role != TurnRole::Model;
            }
            window[index - 1].role != turn.role
        })
        .map(|(_, turn)| turn.clone())
        .collect()
}

pub fn compose_message(message: &str, language: &str) -> String {
    match language.trim() {
        "" | "auto" => {
            format!("{message}\n\nAlways reply in the same language and dialect that I am using.")
        }
        hint => format!("{message}\n\nThe user is communicating in {hint}. Continue in this language."),
    }
}
