use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::AccountRecord;

/// Whole-collection account storage. There is no partial update primitive, so
/// callers serialize read-modify-write cycles themselves.
pub trait AccountStore: Send + Sync {
    fn get_all(&self) -> Result<Vec<AccountRecord>, RepositoryError>;
    fn put_all(&self, records: Vec<AccountRecord>) -> Result<(), RepositoryError>;
}

/// Append-only per-account log of companion exchanges.
pub trait ChatHistoryStore: Send + Sync {
    fn append(&self, account_id: &str, entry: ChatEntry) -> Result<(), RepositoryError>;
    fn get_all(&self, account_id: &str) -> Result<Vec<ChatEntry>, RepositoryError>;
}

/// One user message and the companion reply it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub user_message: String,
    #[serde(default)]
    pub ai_reply: String,
}

impl ChatEntry {
    pub fn new(
        timestamp: DateTime<Utc>,
        user_message: impl Into<String>,
        ai_reply: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            user_message: user_message.into(),
            ai_reply: ai_reply.into(),
        }
    }
}

/// Error enumeration for storage failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("storage io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored data is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
