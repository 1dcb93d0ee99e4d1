use super::common::*;

use crate::care::assignment::AssignmentPolicy;
use crate::care::directory::DoctorDirectory;
use crate::care::errors::{CareError, PolicyError};
use crate::care::followup::{FollowUpPipeline, SummaryDraft, FOLLOW_UP_INSTRUCTION};
use crate::care::generation::GenerationPurpose;
use crate::care::repository::ChatEntry;
use crate::care::Account;

const WINDOW_MS: i64 = 2 * DAY_MS;

fn pipeline(turns: usize) -> FollowUpPipeline {
    FollowUpPipeline::new(AssignmentPolicy::default(), turns)
}

fn assigned_patient() -> Account {
    let doctors = vec![doctor("d1@clinic.test", "Dr. One")];
    AssignmentPolicy::default()
        .choose_doctor(
            &patient("pat@example.com"),
            &DoctorDirectory::new(&doctors),
            "d1@clinic.test",
            at(0),
        )
        .expect("selection")
}

fn history(count: i64) -> Vec<ChatEntry> {
    (0..count)
        .map(|index| ChatEntry::new(at(index), format!("message {index}"), format!("reply {index}")))
        .collect()
}

#[test]
fn preconditions_name_the_recipient() {
    let account = assigned_patient();
    let recipient = pipeline(14)
        .check_preconditions(&account, &history(1), at(1_000))
        .expect("can share");
    assert_eq!(recipient.id, "d1@clinic.test");
}

#[test]
fn preconditions_close_with_the_selection_window() {
    let account = assigned_patient();
    let error = pipeline(14)
        .check_preconditions(&account, &history(1), at(WINDOW_MS))
        .expect_err("window closed");
    assert!(matches!(
        error,
        CareError::Policy(PolicyError::PermanentDoctorRequired { days: 2 })
    ));
}

#[test]
fn request_carries_only_redacted_recent_turns() {
    let account = assigned_patient();
    let mut entries = history(6);
    entries.push(ChatEntry::new(at(10), "my number is 555-123-4567", "noted"));

    let request = pipeline(3).compose_request(&account, &entries);

    assert_eq!(request.purpose, GenerationPurpose::FollowUp);
    assert_eq!(request.system_instruction.as_deref(), Some(FOLLOW_UP_INSTRUCTION));
    assert!(request.history.is_empty());
    assert!(request.message.contains("Patient alias: [redacted-email]"));
    assert!(request.message.contains("Language preference: en"));
    assert!(request.message.contains("Patient: message 4"));
    assert!(!request.message.contains("message 3"));
    assert!(request.message.contains("Patient: my number is [redacted-phone]"));
    assert!(!request.message.contains("pat@example.com"));
}

#[tokio::test]
async fn unusable_model_output_yields_the_fallback() {
    let generator = ScriptedGenerator::new(vec![Ok("Here is your summary!".to_string())]);
    let pipeline = pipeline(14);
    let request = pipeline.compose_request(&assigned_patient(), &history(2));

    let draft = pipeline.summarize(&generator, request).await;
    assert_eq!(draft, SummaryDraft::fallback());
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn partial_model_output_keeps_what_parses() {
    let generator = ScriptedGenerator::new(vec![Ok(
        r#"{"summary":"","keyThemes":["sleep", 3],"improvementPercentage":140}"#.to_string(),
    )]);
    let pipeline = pipeline(14);
    let request = pipeline.compose_request(&assigned_patient(), &history(2));

    let draft = pipeline.summarize(&generator, request).await;
    assert_eq!(draft.summary, SummaryDraft::fallback().summary);
    assert_eq!(draft.key_themes, vec!["sleep"]);
    assert!(draft.next_steps.is_empty());
    assert_eq!(draft.improvement_percentage, 100);
}

#[test]
fn append_adds_one_entry_at_the_end() {
    let pipeline = pipeline(14);
    let account = assigned_patient();

    let first = pipeline.record(SummaryDraft::fallback(), at(5_000));
    let second = pipeline.record(SummaryDraft::fallback(), at(6_000));
    assert_ne!(first.id, second.id);
    assert!(first.doctor_notes.is_empty());

    let once = pipeline.append(&account, first.clone(), at(5_000));
    let twice = pipeline.append(&once, second.clone(), at(6_000));
    assert_eq!(twice.follow_ups, vec![first, second]);
    assert_eq!(twice.updated_at, at(6_000));
    assert_eq!(twice.selected_doctor, account.selected_doctor);
}
