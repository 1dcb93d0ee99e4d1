use super::redaction::redact;
use crate::care::repository::ChatEntry;

pub const EMPTY_TRANSCRIPT: &str = "No recent conversation was captured.";

/// Redacted excerpt of the most recent `turns` exchanges, oldest first.
pub fn build_transcript(history: &[ChatEntry], turns: usize) -> String {
    if history.is_empty() || turns == 0 {
        return EMPTY_TRANSCRIPT.to_string();
    }

    let start = history.len().saturating_sub(turns);
    history[start..]
        .iter()
        .map(|entry| {
            format!(
                "Patient: {}\nCompanion: {}",
                redact(&entry.user_message),
                redact(&entry.ai_reply)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
