use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::response::Response;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::care::domain::{Account, AccountRecord, DoctorProfile, Role};
use crate::care::generation::{GenerationError, GenerationRequest, RetryPolicy, TextGenerator};
use crate::care::normalizer::AccountNormalizer;
use crate::care::repository::ChatEntry;
use crate::care::service::{CareService, Clock};
use crate::care::storage::{InMemoryAccountStore, InMemoryChatHistory};
use crate::care::DEFAULT_SPECIALITY;
use crate::config::CareConfig;

const BASE_MS: i64 = 1_759_309_200_000;
pub(crate) const DAY_MS: i64 = 86_400_000;

pub(crate) type TestService = CareService<InMemoryAccountStore, InMemoryChatHistory, ScriptedGenerator>;

/// Fixed instant offset from a common base, in milliseconds.
pub(crate) fn at(offset_ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(BASE_MS + offset_ms).expect("valid timestamp")
}

pub(crate) fn account(email: &str, role: Option<Role>) -> Account {
    let mut record = AccountRecord::new(email);
    record.role = Some(role);
    AccountNormalizer::normalize(&record, at(0)).account
}

pub(crate) fn doctor(email: &str, name: &str) -> Account {
    let mut record = AccountRecord::new(email);
    record.username = Some(name.to_string());
    record.role = Some(Some(Role::Doctor));
    record.assessment_completed = Some(true);
    AccountNormalizer::normalize(&record, at(0)).account
}

pub(crate) fn patient(email: &str) -> Account {
    account(email, Some(Role::Patient))
}

pub(crate) fn sample_profile(id: &str) -> DoctorProfile {
    DoctorProfile {
        id: id.to_string(),
        name: "Dr. Sample".to_string(),
        email: id.to_string(),
        languages: vec!["en".to_string()],
        location: None,
        speciality: DEFAULT_SPECIALITY.to_string(),
        description: None,
    }
}

/// Generator that replays a fixed script of outcomes and records requests.
#[derive(Debug)]
pub(crate) struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<String, GenerationError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub(crate) fn new(script: Vec<Result<String, GenerationError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().expect("requests mutex poisoned").len()
    }

    pub(crate) fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().expect("requests mutex poisoned").clone()
    }
}

impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        self.requests
            .lock()
            .expect("requests mutex poisoned")
            .push(request);
        self.script
            .lock()
            .expect("script mutex poisoned")
            .pop_front()
            .unwrap_or(Err(GenerationError::EmptyResponse))
    }
}

/// Clock the tests move by hand.
#[derive(Debug)]
pub(crate) struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub(crate) fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub(crate) fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().expect("clock mutex poisoned") = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

pub(crate) struct Harness {
    pub(crate) service: Arc<TestService>,
    pub(crate) accounts: Arc<InMemoryAccountStore>,
    pub(crate) history: Arc<InMemoryChatHistory>,
    pub(crate) generator: Arc<ScriptedGenerator>,
    pub(crate) clock: Arc<ManualClock>,
}

impl Harness {
    pub(crate) fn stored(&self, email: &str) -> Account {
        let record = self
            .accounts
            .records()
            .into_iter()
            .find(|record| record.email == email)
            .expect("account stored");
        AccountNormalizer::normalize(&record, self.clock.now()).account
    }

    pub(crate) fn seed_chat(&self, email: &str, exchanges: &[(&str, &str)]) {
        use crate::care::repository::ChatHistoryStore;
        for (index, (message, reply)) in exchanges.iter().enumerate() {
            self.history
                .append(email, ChatEntry::new(at(index as i64), *message, *reply))
                .expect("history append");
        }
    }
}

pub(crate) fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        ..RetryPolicy::default()
    }
}

/// Service over in-memory stores seeded with the given accounts, clock at `at(0)`.
pub(crate) fn harness(
    accounts: Vec<Account>,
    script: Vec<Result<String, GenerationError>>,
) -> Harness {
    let records = accounts.into_iter().map(AccountRecord::from).collect();
    let accounts = Arc::new(InMemoryAccountStore::with_records(records));
    let history = Arc::new(InMemoryChatHistory::default());
    let generator = Arc::new(ScriptedGenerator::new(script));
    let clock = Arc::new(ManualClock::starting_at(at(0)));

    let service = CareService::new(
        Arc::clone(&accounts),
        Arc::clone(&history),
        Arc::clone(&generator),
        &CareConfig::default(),
        fast_retry(),
    )
    .with_clock(clock.clone());

    Harness {
        service: Arc::new(service),
        accounts,
        history,
        generator,
        clock,
    }
}

pub(crate) async fn read_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}
