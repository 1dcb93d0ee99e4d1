use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use super::redaction::{redact, redact_all};

pub const DEFAULT_SUMMARY: &str = "Patient session ended. No additional context captured.";
pub const DEFAULT_IMPROVEMENT: u8 = 50;

/// System instruction for the summarization model.
pub const FOLLOW_UP_INSTRUCTION: &str = r#"You are a licensed therapist creating concise follow-up briefs for another doctor.

Guidelines:
- Remove all personally identifying or sensitive data (names, emails, phone numbers, addresses, exact schools, workplaces).
- Focus on emotional themes, behavioural changes, risks, and progress.
- Offer practical next steps that another clinician can act on.
- Score percentage improvement between 0-100 compared to previous report. 0 = worse, 50 = unchanged, 100 = remarkable progress.
- Keep tone professional, warm, and actionable.

Return ONLY valid JSON using this template:
{
  "summary": "2-3 sentences that capture the patient's state and themes.",
  "keyThemes": ["short bullet", "..."],
  "riskSignals": ["if none, use an empty array"],
  "nextSteps": ["action recommendation", "..."],
  "improvementPercentage": 0
}"#;

/// Content of a follow-up before it gets an id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryDraft {
    pub summary: String,
    pub key_themes: Vec<String>,
    pub risk_signals: Vec<String>,
    pub next_steps: Vec<String>,
    pub improvement_percentage: u8,
}

impl SummaryDraft {
    /// Deterministic record used whenever summarization is unavailable.
    pub fn fallback() -> Self {
        Self {
            summary: DEFAULT_SUMMARY.to_string(),
            key_themes: Vec::new(),
            risk_signals: Vec::new(),
            next_steps: Vec::new(),
            improvement_percentage: DEFAULT_IMPROVEMENT,
        }
    }
}

pub fn compose_prompt(alias: &str, language: &str, transcript: &str) -> String {
    format!(
        "Create a clinical follow-up brief for the assigned doctor.\n\
         Patient alias: {alias}\n\
         Language preference: {language}\n\
         Conversation excerpt:\n\
         {transcript}"
    )
}

/// Parse raw model output into a redacted draft. Missing or malformed fields
/// take their fallback values; only unparseable JSON is an error.
pub fn parse_summary(raw: &str) -> Result<SummaryDraft, serde_json::Error> {
    let value: Value = serde_json::from_str(&strip_code_fences(raw))?;

    let summary = value
        .get("summary")
        .and_then(Value::as_str)
        .map(redact)
        .filter(|summary| !summary.is_empty())
        .unwrap_or_else(|| DEFAULT_SUMMARY.to_string());

    Ok(SummaryDraft {
        summary,
        key_themes: string_list(value.get("keyThemes")),
        risk_signals: string_list(value.get("riskSignals")),
        next_steps: string_list(value.get("nextSteps")),
        improvement_percentage: clamp_percentage(value.get("improvementPercentage")),
    })
}

/// Remove markdown code fences (```json and ```) wrapped around the payload.
pub fn strip_code_fences(raw: &str) -> String {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| Regex::new(r"(?i)```(?:json)?").expect("fence pattern compiles"));
    fence.replace_all(raw, "").trim().to_string()
}

/// Numbers and numeric-prefixed strings are clamped to 0..=100 and rounded;
/// anything else yields the default.
pub fn clamp_percentage(value: Option<&Value>) -> u8 {
    let parsed = match value {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => leading_float(text),
        _ => None,
    };
    match parsed {
        Some(number) if !number.is_nan() => number.clamp(0.0, 100.0).round() as u8,
        _ => DEFAULT_IMPROVEMENT,
    }
}

fn leading_float(text: &str) -> Option<f64> {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    let number = NUMBER.get_or_init(|| {
        Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?").expect("number pattern compiles")
    });
    number
        .find(text.trim_start())
        .and_then(|found| found.as_str().parse::<f64>().ok())
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => {
            let items: Vec<String> = items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
            redact_all(&items)
        }
        _ => Vec::new(),
    }
}
