//! Doctor assignment, assessment scoring, follow-up sharing, and the
//! companion chat for the Mentis care workflows.
//!
//! Time-dependent rules take "now" explicitly, and collaborators (account
//! store, chat history, text generator) sit behind traits so the service can
//! run over files, memory, or test doubles.

pub mod assessment;
pub mod assignment;
pub mod companion;
pub mod directory;
pub mod domain;
pub mod errors;
pub mod followup;
pub mod gemini;
pub mod generation;
pub mod normalizer;
pub mod repository;
pub mod requests;
pub mod router;
pub mod service;
pub mod storage;
pub mod views;

#[cfg(test)]
pub(crate) mod tests;

pub use assessment::{classify, AssessmentScore, AssessmentScorer};
pub use assignment::{AssignmentPolicy, AssignmentState};
pub use companion::{ChatRequest, CompanionChat, HistoryItem};
pub use directory::{DoctorDirectory, DEFAULT_SPECIALITY};
pub use domain::{
    Account, AccountRecord, Assessment, AssessmentLevel, DoctorNote, DoctorProfile, FollowUp,
    Provider, Role,
};
pub use errors::{CareError, NotFoundError, PolicyError, ValidationError};
pub use followup::{FollowUpPipeline, SummaryDraft};
pub use gemini::GeminiClient;
pub use generation::{
    ChatTurn, GenerationError, GenerationPurpose, GenerationRequest, RetryPolicy, TextGenerator,
    TurnRole,
};
pub use normalizer::{AccountNormalizer, NormalizedAccount};
pub use repository::{AccountStore, ChatEntry, ChatHistoryStore, RepositoryError};
pub use requests::{
    AccountOpening, AssessmentSubmission, DoctorChoice, DoctorNoteInput, DoctorProfileUpdate,
    RawAnswer, RoleSelection,
};
pub use router::{care_router, CALLER_HEADER};
pub use service::{AccountLocks, CareService, Clock, SystemClock};
pub use storage::{
    InMemoryAccountStore, InMemoryChatHistory, JsonFileAccountStore, JsonFileChatHistory,
};
pub use views::{AccountView, AssignedPatient, PatientFollowUpView, PatientFollowUps};
