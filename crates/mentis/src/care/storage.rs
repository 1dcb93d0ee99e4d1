use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

use super::domain::AccountRecord;
use super::repository::{AccountStore, ChatEntry, ChatHistoryStore, RepositoryError};

/// Exchanges kept per account by the file-backed chat history.
pub const CHAT_HISTORY_LIMIT: usize = 1000;

const ACCOUNTS_KEY: &str = "accounts";

/// Account collection stored under the `accounts` key of a JSON document.
/// Other top-level keys in the document are left untouched.
#[derive(Debug)]
pub struct JsonFileAccountStore {
    path: PathBuf,
    io: Mutex<()>,
}

impl JsonFileAccountStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AccountStore for JsonFileAccountStore {
    fn get_all(&self) -> Result<Vec<AccountRecord>, RepositoryError> {
        let _guard = self.io.lock().expect("account file mutex poisoned");
        let mut document = read_document(&self.path)?;
        match document.remove(ACCOUNTS_KEY) {
            Some(accounts @ Value::Array(_)) => Ok(serde_json::from_value(accounts)?),
            _ => Ok(Vec::new()),
        }
    }

    fn put_all(&self, records: Vec<AccountRecord>) -> Result<(), RepositoryError> {
        let _guard = self.io.lock().expect("account file mutex poisoned");
        let mut document = read_document(&self.path)?;
        document.insert(ACCOUNTS_KEY.to_string(), serde_json::to_value(records)?);
        write_atomically(&self.path, &Value::Object(document))
    }
}

/// Chat exchanges keyed by account email in a single JSON document.
#[derive(Debug)]
pub struct JsonFileChatHistory {
    path: PathBuf,
    limit: usize,
    io: Mutex<()>,
}

impl JsonFileChatHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            limit: CHAT_HISTORY_LIMIT,
            io: Mutex::new(()),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    fn read_all(&self) -> Result<BTreeMap<String, Vec<ChatEntry>>, RepositoryError> {
        let document = read_document(&self.path)?;
        Ok(serde_json::from_value(Value::Object(document))?)
    }
}

impl ChatHistoryStore for JsonFileChatHistory {
    fn append(&self, account_id: &str, entry: ChatEntry) -> Result<(), RepositoryError> {
        let _guard = self.io.lock().expect("chat history mutex poisoned");
        let mut history = self.read_all()?;
        let entries = history.entry(account_id.to_string()).or_default();
        entries.push(entry);
        if entries.len() > self.limit {
            let excess = entries.len() - self.limit;
            entries.drain(..excess);
        }
        write_atomically(&self.path, &serde_json::to_value(history)?)
    }

    fn get_all(&self, account_id: &str) -> Result<Vec<ChatEntry>, RepositoryError> {
        let _guard = self.io.lock().expect("chat history mutex poisoned");
        let mut history = self.read_all()?;
        Ok(history.remove(account_id).unwrap_or_default())
    }
}

fn read_document(path: &Path) -> Result<Map<String, Value>, RepositoryError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Map::new()),
        Err(error) => return Err(error.into()),
    };
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    Ok(serde_json::from_str(&raw)?)
}

fn write_atomically(path: &Path, document: &Value) -> Result<(), RepositoryError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, serde_json::to_vec_pretty(document)?)?;
    fs::rename(&staging, path)?;
    Ok(())
}

/// Process-local account collection used by the demo and by tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAccountStore {
    records: Arc<Mutex<Vec<AccountRecord>>>,
}

impl InMemoryAccountStore {
    pub fn with_records(records: Vec<AccountRecord>) -> Self {
        Self {
            records: Arc::new(Mutex::new(records)),
        }
    }

    pub fn records(&self) -> Vec<AccountRecord> {
        self.records
            .lock()
            .expect("account store mutex poisoned")
            .clone()
    }
}

impl AccountStore for InMemoryAccountStore {
    fn get_all(&self) -> Result<Vec<AccountRecord>, RepositoryError> {
        Ok(self.records())
    }

    fn put_all(&self, records: Vec<AccountRecord>) -> Result<(), RepositoryError> {
        *self.records.lock().expect("account store mutex poisoned") = records;
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryChatHistory {
    entries: Arc<Mutex<BTreeMap<String, Vec<ChatEntry>>>>,
}

impl ChatHistoryStore for InMemoryChatHistory {
    fn append(&self, account_id: &str, entry: ChatEntry) -> Result<(), RepositoryError> {
        let mut guard = self.entries.lock().expect("chat history mutex poisoned");
        let entries = guard.entry(account_id.to_string()).or_default();
        entries.push(entry);
        if entries.len() > CHAT_HISTORY_LIMIT {
            let excess = entries.len() - CHAT_HISTORY_LIMIT;
            entries.drain(..excess);
        }
        Ok(())
    }

    fn get_all(&self, account_id: &str) -> Result<Vec<ChatEntry>, RepositoryError> {
        let guard = self.entries.lock().expect("chat history mutex poisoned");
        Ok(guard.get(account_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::care::tests::common::at;
    use serde_json::json;

    #[test]
    fn missing_file_reads_as_empty_collection() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileAccountStore::new(dir.path().join("db.json"));
        assert!(store.get_all().expect("reads").is_empty());
    }

    #[test]
    fn put_all_keeps_unrelated_document_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("db.json");
        fs::write(
            &path,
            serde_json::to_vec(&json!({
                "accounts": [{ "email": "old@example.com", "password": "hash" }],
                "settings": { "theme": "dark" }
            }))
            .expect("fixture"),
        )
        .expect("write fixture");

        let store = JsonFileAccountStore::new(&path);
        let mut records = store.get_all().expect("reads");
        assert_eq!(records.len(), 1);
        records.push(AccountRecord::new("new@example.com"));
        store.put_all(records).expect("writes");

        let written: Value =
            serde_json::from_slice(&fs::read(&path).expect("read back")).expect("json");
        assert_eq!(written["settings"]["theme"], json!("dark"));
        assert_eq!(written["accounts"][0]["password"], json!("hash"));
        assert_eq!(written["accounts"][1]["email"], json!("new@example.com"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn malformed_document_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("db.json");
        fs::write(&path, b"{ not json").expect("write fixture");
        let store = JsonFileAccountStore::new(&path);
        assert!(matches!(store.get_all(), Err(RepositoryError::Malformed(_))));
    }

    #[test]
    fn chat_history_creates_parent_directory_and_caps_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let history =
            JsonFileChatHistory::new(dir.path().join("db").join("email.json")).with_limit(3);

        for turn in 0..5 {
            history
                .append(
                    "pat@example.com",
                    ChatEntry::new(at(turn * 1_000), format!("message {turn}"), "reply"),
                )
                .expect("append");
        }
        history
            .append("other@example.com", ChatEntry::new(at(0), "hi", "hello"))
            .expect("append");

        let entries = history.get_all("pat@example.com").expect("reads");
        let messages: Vec<&str> = entries
            .iter()
            .map(|entry| entry.user_message.as_str())
            .collect();
        assert_eq!(messages, vec!["message 2", "message 3", "message 4"]);
        assert_eq!(history.get_all("other@example.com").expect("reads").len(), 1);
        assert!(history.get_all("nobody@example.com").expect("reads").is_empty());
    }

    #[test]
    fn in_memory_store_replaces_whole_collection() {
        let store = InMemoryAccountStore::with_records(vec![AccountRecord::new("a@example.com")]);
        store
            .put_all(vec![AccountRecord::new("b@example.com")])
            .expect("writes");
        let emails: Vec<String> = store.records().into_iter().map(|record| record.email).collect();
        assert_eq!(emails, vec!["b@example.com"]);
    }
}
