use super::domain::Role;
use super::generation::GenerationError;
use super::repository::RepositoryError;

/// Malformed input rejected at the boundary. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("all {expected} answers are required (received {found})")]
    AnswerCount { expected: usize, found: usize },
    #[error("answer {position} must be between 1 and {max} (received {value})")]
    AnswerOutOfRange { position: usize, value: i64, max: u8 },
    #[error("answer {position} must be a whole number (received {value})")]
    AnswerNotInteger { position: usize, value: String },
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("role must be 'patient' or 'doctor' (received '{0}')")]
    UnsupportedRole(String),
    #[error("no conversation history available to summarize")]
    NoConversationHistory,
}

/// A requested transition that the doctor-assignment rules forbid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("only {required}s can {action}")]
    RoleRequired { required: Role, action: &'static str },
    #[error("role is already set to {current}")]
    RoleAlreadyChosen { current: Role },
    #[error("you chose to use the companion without a doctor; doctor sharing is unavailable")]
    OptedOut,
    #[error("a doctor is already selected; opting out is only possible before choosing one")]
    DoctorAlreadySelected,
    #[error("a doctor must be selected before sending follow-ups")]
    NoDoctorSelected,
    #[error("you must select a doctor before choosing a permanent one")]
    SelectionRequired,
    #[error("after {days} day(s), you must choose a permanent doctor first")]
    PermanentDoctorRequired { days: i64 },
    #[error("your permanent doctor is already set and cannot be changed")]
    PermanentDoctorLocked { permanent_doctor_id: String },
    #[error("after {days} day(s), you can only share sessions with your permanent doctor")]
    SharingRestricted { days: i64 },
    #[error("selected doctor '{doctor_id}' was not found")]
    UnknownDoctor { doctor_id: String },
    #[error("you are not assigned to this patient")]
    NotAssignedToPatient,
}

impl PolicyError {
    /// Role mismatches are authorization failures rather than state conflicts.
    pub fn is_role_mismatch(&self) -> bool {
        matches!(self, Self::RoleRequired { .. })
    }
}

/// A referenced record that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotFoundError {
    #[error("account '{0}' not found")]
    Account(String),
    #[error("patient '{0}' not found")]
    Patient(String),
    #[error("follow-up entry '{0}' not found")]
    FollowUp(String),
}

/// Error raised by the care service and its components.
#[derive(Debug, thiserror::Error)]
pub enum CareError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error("text generation unavailable: {source}")]
    UpstreamUnavailable {
        retryable: bool,
        #[source]
        source: GenerationError,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
