use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

use super::assessment::AssessmentScorer;
use super::assignment::AssignmentPolicy;
use super::companion::{ChatRequest, CompanionChat};
use super::directory::DoctorDirectory;
use super::domain::{
    truncate_to_millis, Account, AccountRecord, Assessment, DoctorNote, DoctorProfile, FollowUp,
    Role,
};
use super::errors::{CareError, NotFoundError, PolicyError, ValidationError};
use super::followup::{redact, FollowUpPipeline};
use super::generation::{RetryPolicy, TextGenerator};
use super::normalizer::AccountNormalizer;
use super::repository::{AccountStore, ChatEntry, ChatHistoryStore};
use super::requests::{
    non_blank, AccountOpening, AssessmentSubmission, DoctorProfileUpdate, RoleSelection,
};
use super::views::{AccountView, AssignedPatient, PatientFollowUps};
use crate::config::CareConfig;

/// Source of "now" for every time-dependent rule.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Async mutex per account email. Entries nobody holds are pruned on the
/// next acquisition.
#[derive(Debug, Default)]
pub struct AccountLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl AccountLocks {
    pub async fn acquire(&self, email: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut guard = self.inner.lock().expect("account lock map poisoned");
            guard.retain(|_, lock| Arc::strong_count(lock) > 1);
            guard
                .entry(email.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Orchestrates the care workflows over the account store, the chat history,
/// and the text generator.
pub struct CareService<S, H, G> {
    accounts: Arc<S>,
    history: Arc<H>,
    generator: Arc<G>,
    clock: Arc<dyn Clock>,
    policy: AssignmentPolicy,
    scorer: AssessmentScorer,
    pipeline: FollowUpPipeline,
    companion: CompanionChat,
    locks: AccountLocks,
    commit: AsyncMutex<()>,
}

impl<S, H, G> CareService<S, H, G>
where
    S: AccountStore + 'static,
    H: ChatHistoryStore + 'static,
    G: TextGenerator + 'static,
{
    pub fn new(
        accounts: Arc<S>,
        history: Arc<H>,
        generator: Arc<G>,
        care: &CareConfig,
        retry: RetryPolicy,
    ) -> Self {
        let policy = AssignmentPolicy::new(care.lock_window());
        Self {
            accounts,
            history,
            generator,
            clock: Arc::new(SystemClock),
            policy,
            scorer: AssessmentScorer::standard(),
            pipeline: FollowUpPipeline::new(policy, care.transcript_turns),
            companion: CompanionChat::new(retry),
            locks: AccountLocks::default(),
            commit: AsyncMutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &AssignmentPolicy {
        &self.policy
    }

    /// Create the account on first login, or return the existing one with a
    /// missing username filled in and the latest provider recorded.
    pub async fn open_account(&self, opening: AccountOpening) -> Result<AccountView, CareError> {
        let email = non_blank(Some(&opening.email)).ok_or(ValidationError::MissingField("email"))?;
        let username = non_blank(opening.username.as_deref());

        let _account_lock = self.locks.acquire(&email).await;
        let _commit = self.commit.lock().await;
        let now = self.clock.now();

        let mut records = self.accounts.get_all()?;
        let position = records.iter().position(|record| record.email == email);
        let mut record = match position {
            Some(index) => records[index].clone(),
            None => AccountRecord::new(email.clone()),
        };
        let before = record.clone();

        let has_username = record
            .username
            .as_deref()
            .is_some_and(|name| !name.trim().is_empty());
        if !has_username {
            record.username = username;
        }
        if let Some(provider) = opening.provider {
            record.provider = Some(provider);
        }

        let normalized = AccountNormalizer::normalize(&record, now);
        let mut account = normalized.account;
        if normalized.updated || record != before {
            account.updated_at = truncate_to_millis(now);
        }
        let changed = position.is_none() || normalized.updated || record != before;

        if changed {
            let stored = AccountRecord::from(account.clone());
            match position {
                Some(index) => records[index] = stored,
                None => {
                    info!(provider = ?account.provider, "account created");
                    records.push(stored);
                }
            }
            self.accounts.put_all(records)?;
        }

        Ok(AccountView::build(&account, &self.policy, now))
    }

    /// Normalized account view; a backfilled record is written back.
    pub async fn account_view(&self, email: &str) -> Result<AccountView, CareError> {
        self.commit(email, |account, _, now| {
            Ok(AccountView::build(account, &self.policy, now))
        })
        .await
    }

    pub async fn choose_role(
        &self,
        email: &str,
        selection: RoleSelection,
    ) -> Result<AccountView, CareError> {
        let role = parse_role(&selection.role)?;
        self.commit(email, |account, _, now| {
            match account.role {
                Some(current) if current == role => {}
                Some(current) => return Err(PolicyError::RoleAlreadyChosen { current }.into()),
                None => {
                    account.role = Some(role);
                    if role == Role::Doctor {
                        account.assessment_completed = true;
                    }
                    account.updated_at = truncate_to_millis(now);
                    info!(%role, "role chosen");
                }
            }
            Ok(AccountView::build(account, &self.policy, now))
        })
        .await
    }

    pub async fn update_doctor_profile(
        &self,
        email: &str,
        update: DoctorProfileUpdate,
    ) -> Result<DoctorProfile, CareError> {
        let description = non_blank(Some(&update.description))
            .ok_or(ValidationError::MissingField("description"))?;

        self.commit(email, |account, _, now| {
            ensure_role(account, Role::Doctor, "update a doctor profile")?;
            account.doctor_description = Some(description);
            if let Some(languages) = update.languages {
                let languages: Vec<String> = languages
                    .iter()
                    .filter_map(|language| non_blank(Some(language)))
                    .collect();
                account.languages = Some(languages).filter(|languages| !languages.is_empty());
            }
            if let Some(location) = update.location {
                account.location = non_blank(Some(&location));
            }
            if let Some(speciality) = update.speciality {
                account.speciality = non_blank(Some(&speciality));
            }
            account.updated_at = truncate_to_millis(now);
            Ok(DoctorProfile::from_account(account))
        })
        .await
    }

    /// Score the answers and route the patient: opt out, pick a doctor, or
    /// leave the assignment untouched. Applies all or nothing.
    pub async fn submit_assessment(
        &self,
        email: &str,
        submission: AssessmentSubmission,
    ) -> Result<AccountView, CareError> {
        let answers = self.scorer.validate_submitted(&submission.answers)?;
        let score = self.scorer.score(&answers);
        let doctor_id = non_blank(submission.doctor_id.as_deref());
        let language = non_blank(submission.language.as_deref());

        self.commit(email, |account, all, now| {
            ensure_role(account, Role::Patient, "submit an assessment")?;

            let mut next = account.clone();
            if let Some(language) = &language {
                next.language_preference = language.clone();
            }
            next.assessment = Some(Assessment {
                answers,
                score: score.score,
                max_score: score.max_score,
                percentage: score.percentage,
                level: score.level,
                language: next.language_preference.clone(),
                summary: non_blank(submission.summary.as_deref()),
                completed_at: truncate_to_millis(now),
            });
            next.assessment_completed = true;
            next.updated_at = truncate_to_millis(now);

            if submission.no_doctor {
                next = self.policy.opt_out(&next, now)?;
            } else if let Some(doctor_id) = &doctor_id {
                next = self
                    .policy
                    .choose_doctor(&next, &DoctorDirectory::new(all), doctor_id, now)?;
            }

            info!(level = score.level.label(), percentage = score.percentage, "assessment recorded");
            *account = next;
            Ok(AccountView::build(account, &self.policy, now))
        })
        .await
    }

    /// Doctor listing in account-collection order.
    pub fn doctors(&self) -> Result<Vec<DoctorProfile>, CareError> {
        let accounts = self.load_all()?;
        Ok(DoctorDirectory::new(&accounts).profiles().collect())
    }

    pub async fn choose_doctor(&self, email: &str, doctor_id: &str) -> Result<AccountView, CareError> {
        let doctor_id = non_blank(Some(doctor_id)).ok_or(ValidationError::MissingField("doctorId"))?;
        self.commit(email, |account, all, now| {
            *account = self
                .policy
                .choose_doctor(account, &DoctorDirectory::new(all), &doctor_id, now)?;
            Ok(AccountView::build(account, &self.policy, now))
        })
        .await
    }

    pub async fn set_permanent_doctor(
        &self,
        email: &str,
        doctor_id: &str,
    ) -> Result<AccountView, CareError> {
        let doctor_id = non_blank(Some(doctor_id)).ok_or(ValidationError::MissingField("doctorId"))?;
        self.commit(email, |account, all, now| {
            *account = self.policy.set_permanent_doctor(
                account,
                &DoctorDirectory::new(all),
                &doctor_id,
                now,
            )?;
            info!(doctor = %doctor_id, "permanent doctor set");
            Ok(AccountView::build(account, &self.policy, now))
        })
        .await
    }

    /// Live companion reply. The exchange is logged to the chat history; a
    /// history write failure does not cost the patient the reply.
    pub async fn chat(&self, email: &str, request: ChatRequest) -> Result<String, CareError> {
        let account = self.load_account(email)?;
        ensure_role(&account, Role::Patient, "use the companion")?;
        let (message, generation) = self.companion.prepare(&request)?;

        let reply = self.companion.reply(self.generator.as_ref(), generation).await?;

        let entry = ChatEntry::new(truncate_to_millis(self.clock.now()), message, reply.clone());
        if let Err(error) = self.history.append(&account.email, entry) {
            warn!(%error, "failed to persist chat exchange");
        }
        Ok(reply)
    }

    pub fn chat_history(&self, email: &str) -> Result<Vec<ChatEntry>, CareError> {
        let account = self.load_account(email)?;
        ensure_role(&account, Role::Patient, "access chat history")?;
        Ok(self.history.get_all(&account.email)?)
    }

    /// Summarize recent chat and append the follow-up for the assigned doctor.
    ///
    /// The summarizer runs outside the commit lock; the account is re-read
    /// and the sharing rules re-checked before the append.
    pub async fn share_follow_up(&self, email: &str) -> Result<FollowUp, CareError> {
        let _account_lock = self.locks.acquire(email).await;

        let account = self.load_account(email)?;
        let history = self.history.get_all(&account.email)?;
        self.pipeline
            .check_preconditions(&account, &history, self.clock.now())?;

        let request = self.pipeline.compose_request(&account, &history);
        let draft = self
            .pipeline
            .summarize(self.generator.as_ref(), request)
            .await;

        self.commit_locked(email, NotFoundError::Account(email.to_string()), |account, _, now| {
            let recipient = self.pipeline.check_preconditions(account, &history, now)?;
            info!(doctor = %recipient.id, "follow-up shared");
            let follow_up = self.pipeline.record(draft, now);
            *account = self.pipeline.append(account, follow_up.clone(), now);
            Ok(follow_up)
        })
        .await
    }

    pub async fn patient_follow_ups(&self, email: &str) -> Result<PatientFollowUps, CareError> {
        self.commit(email, |account, _, _| {
            ensure_role(account, Role::Patient, "view follow-ups")?;
            Ok(PatientFollowUps::from_account(account))
        })
        .await
    }

    /// Patients whose current selection is this doctor, in collection order.
    pub fn doctor_follow_ups(&self, doctor_email: &str) -> Result<Vec<AssignedPatient>, CareError> {
        let accounts = self.load_all()?;
        let doctor = accounts
            .iter()
            .find(|account| account.email == doctor_email)
            .ok_or_else(|| NotFoundError::Account(doctor_email.to_string()))?;
        ensure_role(doctor, Role::Doctor, "review follow-ups")?;

        Ok(accounts
            .iter()
            .filter(|account| account.is_patient() && is_assigned_to(account, doctor_email))
            .map(AssignedPatient::from_account)
            .collect())
    }

    pub async fn add_doctor_note(
        &self,
        doctor_email: &str,
        patient_email: &str,
        follow_up_id: &str,
        note: &str,
    ) -> Result<FollowUp, CareError> {
        let follow_up_id =
            non_blank(Some(follow_up_id)).ok_or(ValidationError::MissingField("followUpId"))?;
        let note = non_blank(Some(note)).ok_or(ValidationError::MissingField("note"))?;

        let doctor = self.load_account(doctor_email)?;
        ensure_role(&doctor, Role::Doctor, "add notes")?;

        let _account_lock = self.locks.acquire(patient_email).await;
        self.commit_locked(
            patient_email,
            NotFoundError::Patient(patient_email.to_string()),
            |patient, _, now| {
                if !is_assigned_to(patient, &doctor.email) {
                    return Err(PolicyError::NotAssignedToPatient.into());
                }
                let entry = patient
                    .follow_ups
                    .iter_mut()
                    .find(|entry| entry.id == follow_up_id)
                    .ok_or_else(|| NotFoundError::FollowUp(follow_up_id.clone()))?;
                entry.doctor_notes.push(DoctorNote {
                    id: Uuid::new_v4().to_string(),
                    doctor_id: doctor.email.clone(),
                    doctor_name: doctor.display_name().to_string(),
                    note: redact(&note),
                    created_at: truncate_to_millis(now),
                });
                let updated = entry.clone();
                patient.updated_at = truncate_to_millis(now);
                Ok(updated)
            },
        )
        .await
    }

    async fn commit<T, F>(&self, email: &str, mutate: F) -> Result<T, CareError>
    where
        F: FnOnce(&mut Account, &[Account], DateTime<Utc>) -> Result<T, CareError>,
    {
        let _account_lock = self.locks.acquire(email).await;
        self.commit_locked(email, NotFoundError::Account(email.to_string()), mutate)
            .await
    }

    /// Read-modify-write of one account under the store-wide commit lock. The
    /// caller must hold the account lock. Nothing is written when `mutate`
    /// fails, or when neither normalization nor `mutate` changed the account.
    async fn commit_locked<T, F>(
        &self,
        email: &str,
        missing: NotFoundError,
        mutate: F,
    ) -> Result<T, CareError>
    where
        F: FnOnce(&mut Account, &[Account], DateTime<Utc>) -> Result<T, CareError>,
    {
        let _commit = self.commit.lock().await;
        let now = self.clock.now();

        let mut records = self.accounts.get_all()?;
        let index = records
            .iter()
            .position(|record| record.email == email)
            .ok_or(missing)?;

        let normalized: Vec<_> = records
            .iter()
            .map(|record| AccountNormalizer::normalize(record, now))
            .collect();
        let backfilled = normalized[index].updated;
        let accounts: Vec<Account> = normalized.into_iter().map(|entry| entry.account).collect();

        let before = accounts[index].clone();
        let mut target = before.clone();
        let output = mutate(&mut target, &accounts, now)?;

        if backfilled || target != before {
            records[index] = AccountRecord::from(target);
            self.accounts.put_all(records)?;
        }
        Ok(output)
    }

    fn load_all(&self) -> Result<Vec<Account>, CareError> {
        let now = self.clock.now();
        Ok(self
            .accounts
            .get_all()?
            .iter()
            .map(|record| AccountNormalizer::normalize(record, now).account)
            .collect())
    }

    fn load_account(&self, email: &str) -> Result<Account, CareError> {
        let record = self
            .accounts
            .get_all()?
            .into_iter()
            .find(|record| record.email == email)
            .ok_or_else(|| NotFoundError::Account(email.to_string()))?;
        Ok(AccountNormalizer::normalize(&record, self.clock.now()).account)
    }
}

fn parse_role(raw: &str) -> Result<Role, ValidationError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "patient" => Ok(Role::Patient),
        "doctor" => Ok(Role::Doctor),
        _ => Err(ValidationError::UnsupportedRole(raw.to_string())),
    }
}

fn ensure_role(account: &Account, required: Role, action: &'static str) -> Result<(), PolicyError> {
    if account.role == Some(required) {
        Ok(())
    } else {
        Err(PolicyError::RoleRequired { required, action })
    }
}

fn is_assigned_to(patient: &Account, doctor_email: &str) -> bool {
    patient
        .selected_doctor
        .as_ref()
        .is_some_and(|doctor| doctor.id == doctor_email)
}
