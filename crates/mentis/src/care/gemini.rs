//! Text generation backed by the Google Generative Language REST API.

use std::time::Duration;

use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::generation::{
    ChatTurn, GenerationError, GenerationPurpose, GenerationRequest, TextGenerator, TurnRole,
};
use crate::config::GenerationConfig;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

/// Gemini `generateContent` client. Without an API key every call reports
/// `Unconfigured`, so the service still starts and follow-ups fall back.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    companion_model: String,
    follow_up_model: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("configured", &self.api_key.is_some())
            .field("companion_model", &self.companion_model)
            .field("follow_up_model", &self.follow_up_model)
            .finish()
    }
}

impl GeminiClient {
    pub fn from_config(config: &GenerationConfig) -> Result<Self, GenerationError> {
        Self::with_base_url(config, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        config: &GenerationConfig,
        base_url: &str,
    ) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| GenerationError::Transport(error.to_string()))?;

        if config.api_key.is_some() {
            info!(
                companion_model = %config.companion_model,
                follow_up_model = %config.follow_up_model,
                "text generation configured"
            );
        }

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            companion_model: config.companion_model.clone(),
            follow_up_model: config.follow_up_model.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn model_for(&self, purpose: GenerationPurpose) -> &str {
        match purpose {
            GenerationPurpose::Companion => &self.companion_model,
            GenerationPurpose::FollowUp => &self.follow_up_model,
        }
    }

    fn endpoint(&self, purpose: GenerationPurpose) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url,
            self.model_for(purpose)
        )
    }

    async fn call(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let api_key = self.api_key.as_deref().ok_or(GenerationError::Unconfigured)?;
        let key = HeaderValue::from_str(api_key)
            .map_err(|_| GenerationError::Transport("API key is not a valid header value".to_string()))?;

        let url = self.endpoint(request.purpose);
        debug!(purpose = ?request.purpose, turns = request.history.len(), "calling generateContent");

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", key)
            .header(CONTENT_TYPE, "application/json")
            .json(&request_body(&request))
            .send()
            .await
            .map_err(|error| GenerationError::Transport(error.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| GenerationError::Transport(error.to_string()))?;

        if !status.is_success() {
            return Err(GenerationError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        extract_text(&body)
    }
}

impl TextGenerator for GeminiClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        self.call(request).await
    }
}

fn request_body(request: &GenerationRequest) -> GenerateContentBody {
    let mut contents: Vec<Content> = request.history.iter().map(turn_content).collect();
    contents.push(Content::text(Some("user"), &request.message));

    GenerateContentBody {
        system_instruction: request
            .system_instruction
            .as_deref()
            .map(|instruction| Content::text(None, instruction)),
        contents,
    }
}

fn turn_content(turn: &ChatTurn) -> Content {
    let role = match turn.role {
        TurnRole::User => "user",
        TurnRole::Model => "model",
    };
    Content::text(Some(role), &turn.text)
}

fn extract_text(body: &str) -> Result<String, GenerationError> {
    let parsed: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|error| GenerationError::Transport(format!("unreadable response: {error}")))?;

    let text = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .map(|part| part.text)
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        Err(GenerationError::EmptyResponse)
    } else {
        Ok(text)
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .ok()
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| body.trim().to_string())
}
