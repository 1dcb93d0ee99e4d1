//! Redacted, best-effort follow-up summaries shared with the assigned doctor.
//!
//! Sensitive data is stripped from every transcript line before the prompt is
//! composed, and summarizer failures of any kind degrade to a fixed default
//! record instead of failing the share.

pub mod redaction;
pub mod summary;
pub mod transcript;

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use super::assignment::AssignmentPolicy;
use super::domain::{truncate_to_millis, Account, DoctorProfile, FollowUp};
use super::errors::{CareError, ValidationError};
use super::generation::{GenerationRequest, TextGenerator};
use super::repository::ChatEntry;

pub use redaction::redact;
pub use summary::{SummaryDraft, DEFAULT_IMPROVEMENT, DEFAULT_SUMMARY, FOLLOW_UP_INSTRUCTION};
pub use transcript::build_transcript;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowUpPipeline {
    policy: AssignmentPolicy,
    transcript_turns: usize,
}

impl FollowUpPipeline {
    pub fn new(policy: AssignmentPolicy, transcript_turns: usize) -> Self {
        Self {
            policy,
            transcript_turns: transcript_turns.max(1),
        }
    }

    pub fn transcript_turns(&self) -> usize {
        self.transcript_turns
    }

    /// Consent and assignment gate, checked before anything leaves the process.
    pub fn check_preconditions<'a>(
        &self,
        account: &'a Account,
        history: &[ChatEntry],
        now: DateTime<Utc>,
    ) -> Result<&'a DoctorProfile, CareError> {
        let recipient = self.policy.ensure_can_share(account, now)?;
        if history.is_empty() {
            return Err(ValidationError::NoConversationHistory.into());
        }
        Ok(recipient)
    }

    /// Summarization request built only from redacted text.
    pub fn compose_request(&self, account: &Account, history: &[ChatEntry]) -> GenerationRequest {
        let transcript = build_transcript(history, self.transcript_turns);
        let prompt = summary::compose_prompt(
            &redact(account.display_name()),
            &account.language_preference,
            &transcript,
        );

        let mut request = GenerationRequest::summarize(prompt);
        request.system_instruction = Some(FOLLOW_UP_INSTRUCTION.to_string());
        request
    }

    /// Never fails: call errors and unusable output both yield the fallback.
    pub async fn summarize<G>(&self, generator: &G, request: GenerationRequest) -> SummaryDraft
    where
        G: TextGenerator,
    {
        match generator.generate(request).await {
            Ok(raw) => summary::parse_summary(&raw).unwrap_or_else(|error| {
                warn!(%error, "follow-up summary was not valid JSON; using default record");
                SummaryDraft::fallback()
            }),
            Err(error) => {
                warn!(%error, "follow-up summarizer unavailable; using default record");
                SummaryDraft::fallback()
            }
        }
    }

    pub fn record(&self, draft: SummaryDraft, now: DateTime<Utc>) -> FollowUp {
        FollowUp {
            id: Uuid::new_v4().to_string(),
            created_at: truncate_to_millis(now),
            summary: draft.summary,
            key_themes: draft.key_themes,
            risk_signals: draft.risk_signals,
            next_steps: draft.next_steps,
            improvement_percentage: draft.improvement_percentage,
            doctor_notes: Vec::new(),
        }
    }

    /// The only mutation the pipeline makes: one follow-up appended at the end.
    pub fn append(&self, account: &Account, follow_up: FollowUp, now: DateTime<Utc>) -> Account {
        let mut next = account.clone();
        next.follow_ups.push(follow_up);
        next.updated_at = truncate_to_millis(now);
        next
    }
}
