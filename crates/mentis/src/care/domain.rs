use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// How the account first authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Local,
    Google,
}

/// Capability set chosen once per account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Doctor,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::Doctor => "doctor",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Daydreaming severity band derived from the assessment percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentLevel {
    Mild,
    Moderate,
    High,
    Severe,
}

impl AssessmentLevel {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Mild => "mild",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::Severe => "severe",
        }
    }
}

/// Stored result of one assessment submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub answers: Vec<u8>,
    pub score: u32,
    pub max_score: u32,
    pub percentage: u8,
    pub level: AssessmentLevel,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub completed_at: DateTime<Utc>,
}

/// Public doctor profile. Copies held on patient accounts are frozen at
/// selection time and do not follow later profile edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_speciality")]
    pub speciality: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A note a doctor appended to a follow-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorNote {
    pub id: String,
    pub doctor_id: String,
    pub doctor_name: String,
    pub note: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// One sharing event. Immutable apart from `doctor_notes`, which only grows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUp {
    pub id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    pub summary: String,
    #[serde(default)]
    pub key_themes: Vec<String>,
    #[serde(default)]
    pub risk_signals: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(deserialize_with = "lenient_percentage")]
    pub improvement_percentage: u8,
    #[serde(default)]
    pub doctor_notes: Vec<DoctorNote>,
}

/// Fully populated account, as produced by the normalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub email: String,
    pub username: String,
    pub provider: Provider,
    pub role: Option<Role>,
    pub assessment: Option<Assessment>,
    pub assessment_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub language_preference: String,
    pub selected_doctor: Option<DoctorProfile>,
    pub no_doctor: bool,
    pub doctor_selection_date: Option<DateTime<Utc>>,
    pub permanent_doctor_id: Option<String>,
    pub follow_ups: Vec<FollowUp>,
    pub doctor_description: Option<String>,
    pub languages: Option<Vec<String>>,
    pub location: Option<String>,
    pub speciality: Option<String>,
    /// Fields owned by layers outside this crate (credentials, session data).
    pub extra: Map<String, Value>,
}

impl Account {
    pub fn is_patient(&self) -> bool {
        self.role == Some(Role::Patient)
    }

    pub fn is_doctor(&self) -> bool {
        self.role == Some(Role::Doctor)
    }

    pub fn display_name(&self) -> &str {
        if self.username.trim().is_empty() {
            &self.email
        } else {
            &self.username
        }
    }

    pub fn follow_up(&self, id: &str) -> Option<&FollowUp> {
        self.follow_ups.iter().find(|entry| entry.id == id)
    }
}

/// Account exactly as persisted. Every field except the email may be missing
/// in older records; nullable fields distinguish "absent" (`None`) from an
/// explicit null (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub role: Option<Option<Role>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub assessment: Option<Option<Assessment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessment_completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_preference: Option<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub selected_doctor: Option<Option<DoctorProfile>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_doctor: Option<bool>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub doctor_selection_date: Option<Option<i64>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub permanent_doctor_id: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_ups: Option<Vec<FollowUp>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctor_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub languages: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speciality: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AccountRecord {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Self::default()
        }
    }
}

impl From<Account> for AccountRecord {
    fn from(account: Account) -> Self {
        Self {
            email: account.email,
            username: Some(account.username),
            provider: Some(account.provider),
            role: Some(account.role),
            assessment: Some(account.assessment),
            assessment_completed: Some(account.assessment_completed),
            created_at: Some(account.created_at.timestamp_millis()),
            updated_at: Some(account.updated_at.timestamp_millis()),
            language_preference: Some(account.language_preference),
            selected_doctor: Some(account.selected_doctor),
            no_doctor: Some(account.no_doctor),
            doctor_selection_date: Some(
                account
                    .doctor_selection_date
                    .map(|date| date.timestamp_millis()),
            ),
            permanent_doctor_id: Some(account.permanent_doctor_id),
            follow_ups: Some(account.follow_ups),
            doctor_description: account.doctor_description,
            languages: account.languages,
            location: account.location,
            speciality: account.speciality,
            extra: account.extra,
        }
    }
}

pub(crate) fn default_language() -> String {
    "en".to_string()
}

pub(crate) fn default_speciality() -> String {
    crate::care::directory::DEFAULT_SPECIALITY.to_string()
}

/// Storage and API timestamps carry millisecond precision only.
pub fn truncate_to_millis(instant: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(instant.timestamp_millis()).unwrap_or(instant)
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn lenient_percentage<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    if raw.is_nan() {
        return Ok(50);
    }
    Ok(raw.clamp(0.0, 100.0).round() as u8)
}
