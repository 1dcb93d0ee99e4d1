use chrono::{DateTime, Utc};
use serde::Serialize;

use super::assignment::{AssignmentPolicy, AssignmentState};
use super::domain::{Account, Assessment, DoctorNote, DoctorProfile, FollowUp, Provider, Role};

/// Session-facing view of an account with the derived assignment fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub email: String,
    pub username: String,
    pub provider: Provider,
    pub role: Option<Role>,
    pub assessment_completed: bool,
    pub assessment: Option<Assessment>,
    pub language_preference: String,
    pub selected_doctor: Option<DoctorProfile>,
    pub no_doctor: bool,
    pub doctor_description: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub doctor_selection_date: Option<DateTime<Utc>>,
    pub permanent_doctor_id: Option<String>,
    pub assignment_state: AssignmentState,
    pub needs_permanent_doctor: bool,
    /// Milliseconds left to change doctors freely; present only while selecting.
    pub time_until_permanent_required: Option<i64>,
    pub permanent_doctor_days: i64,
}

impl AccountView {
    pub fn build(account: &Account, policy: &AssignmentPolicy, now: DateTime<Utc>) -> Self {
        let state = policy.state(account, now);
        Self {
            email: account.email.clone(),
            username: account.username.clone(),
            provider: account.provider,
            role: account.role,
            assessment_completed: account.assessment_completed,
            assessment: account.assessment.clone(),
            language_preference: account.language_preference.clone(),
            selected_doctor: account.selected_doctor.clone(),
            no_doctor: account.no_doctor,
            doctor_description: account.doctor_description.clone(),
            doctor_selection_date: account.doctor_selection_date,
            permanent_doctor_id: account.permanent_doctor_id.clone(),
            assignment_state: state,
            needs_permanent_doctor: state == AssignmentState::LockRequired,
            time_until_permanent_required: policy
                .time_until_permanent_required(account, now)
                .map(|remaining| remaining.num_milliseconds()),
            permanent_doctor_days: policy.window_days(),
        }
    }
}

/// Follow-up as shown to the patient; risk signals stay with the doctor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientFollowUpView {
    pub id: String,
    pub summary: String,
    pub key_themes: Vec<String>,
    pub next_steps: Vec<String>,
    pub improvement_percentage: u8,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    pub doctor_notes: Vec<DoctorNote>,
}

impl From<&FollowUp> for PatientFollowUpView {
    fn from(entry: &FollowUp) -> Self {
        Self {
            id: entry.id.clone(),
            summary: entry.summary.clone(),
            key_themes: entry.key_themes.clone(),
            next_steps: entry.next_steps.clone(),
            improvement_percentage: entry.improvement_percentage,
            created_at: entry.created_at,
            doctor_notes: entry.doctor_notes.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientFollowUps {
    pub follow_ups: Vec<PatientFollowUpView>,
    pub doctor: Option<DoctorProfile>,
}

impl PatientFollowUps {
    pub fn from_account(account: &Account) -> Self {
        Self {
            follow_ups: account.follow_ups.iter().map(PatientFollowUpView::from).collect(),
            doctor: account.selected_doctor.clone(),
        }
    }
}

/// A patient currently pointing at the requesting doctor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignedPatient {
    pub email: String,
    pub username: String,
    pub assessment: Option<Assessment>,
    pub follow_ups: Vec<FollowUp>,
}

impl AssignedPatient {
    pub fn from_account(account: &Account) -> Self {
        Self {
            email: account.email.clone(),
            username: account.display_name().to_string(),
            assessment: account.assessment.clone(),
            follow_ups: account.follow_ups.clone(),
        }
    }
}
