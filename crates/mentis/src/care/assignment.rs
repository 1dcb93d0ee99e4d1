use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::directory::DoctorDirectory;
use super::domain::{truncate_to_millis, Account, DoctorProfile, Role};
use super::errors::PolicyError;

/// Where a patient stands in the doctor-assignment lifecycle. Derived from
/// account fields on demand; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AssignmentState {
    Unassigned,
    OptedOut,
    Selecting,
    LockRequired,
    Locked,
}

impl AssignmentState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Unassigned => "unassigned",
            Self::OptedOut => "optedOut",
            Self::Selecting => "selecting",
            Self::LockRequired => "lockRequired",
            Self::Locked => "locked",
        }
    }
}

/// Doctor-assignment state machine with the time-windowed permanent-doctor rule.
///
/// Every transition takes the current account and returns the next one; the
/// input is never modified, so a failed transition leaves nothing behind.
/// Elapsed time at or beyond the window counts as expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignmentPolicy {
    lock_window: Duration,
}

impl AssignmentPolicy {
    pub fn new(lock_window: Duration) -> Self {
        Self { lock_window }
    }

    pub fn lock_window(&self) -> Duration {
        self.lock_window
    }

    pub fn window_days(&self) -> i64 {
        self.lock_window.num_days()
    }

    pub fn state(&self, account: &Account, now: DateTime<Utc>) -> AssignmentState {
        if account.no_doctor {
            return AssignmentState::OptedOut;
        }
        if account.permanent_doctor_id.is_some() {
            return AssignmentState::Locked;
        }
        match account.doctor_selection_date {
            None => AssignmentState::Unassigned,
            Some(selected_at) if self.window_expired(selected_at, now) => {
                AssignmentState::LockRequired
            }
            Some(_) => AssignmentState::Selecting,
        }
    }

    /// Remaining free-change time; only meaningful while `Selecting`.
    pub fn time_until_permanent_required(
        &self,
        account: &Account,
        now: DateTime<Utc>,
    ) -> Option<Duration> {
        if self.state(account, now) != AssignmentState::Selecting {
            return None;
        }
        let selected_at = account.doctor_selection_date?;
        let remaining = selected_at + self.lock_window - now;
        Some(remaining.max(Duration::zero()))
    }

    pub fn choose_doctor(
        &self,
        account: &Account,
        directory: &DoctorDirectory<'_>,
        doctor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, PolicyError> {
        ensure_patient(account, "choose a doctor")?;

        match self.state(account, now) {
            AssignmentState::OptedOut => Err(PolicyError::OptedOut),
            AssignmentState::LockRequired => Err(PolicyError::PermanentDoctorRequired {
                days: self.window_days(),
            }),
            AssignmentState::Locked => {
                let permanent = account.permanent_doctor_id.as_deref().unwrap_or_default();
                if permanent != doctor_id {
                    return Err(PolicyError::PermanentDoctorLocked {
                        permanent_doctor_id: permanent.to_string(),
                    });
                }
                let already_selected = account
                    .selected_doctor
                    .as_ref()
                    .is_some_and(|doctor| doctor.id == doctor_id);
                if already_selected {
                    return Ok(account.clone());
                }
                let snapshot = resolve(directory, doctor_id)?;
                Ok(with_selection(account, snapshot, now))
            }
            AssignmentState::Unassigned => {
                let snapshot = resolve(directory, doctor_id)?;
                let mut next = with_selection(account, snapshot, now);
                next.doctor_selection_date = Some(truncate_to_millis(now));
                Ok(next)
            }
            AssignmentState::Selecting => {
                let snapshot = resolve(directory, doctor_id)?;
                Ok(with_selection(account, snapshot, now))
            }
        }
    }

    /// Bind the patient to one doctor for good. Allowed any time after the
    /// first selection, including early, voluntary lock-in.
    pub fn set_permanent_doctor(
        &self,
        account: &Account,
        directory: &DoctorDirectory<'_>,
        doctor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, PolicyError> {
        ensure_patient(account, "choose a permanent doctor")?;
        if account.no_doctor {
            return Err(PolicyError::OptedOut);
        }
        if account.doctor_selection_date.is_none() {
            return Err(PolicyError::SelectionRequired);
        }
        if let Some(permanent) = account.permanent_doctor_id.as_deref() {
            if permanent == doctor_id {
                return Ok(account.clone());
            }
            return Err(PolicyError::PermanentDoctorLocked {
                permanent_doctor_id: permanent.to_string(),
            });
        }

        let snapshot = resolve(directory, doctor_id)?;
        let mut next = with_selection(account, snapshot, now);
        next.permanent_doctor_id = Some(doctor_id.to_string());
        Ok(next)
    }

    /// Assessment-time choice to use the companion without a doctor.
    pub fn opt_out(&self, account: &Account, now: DateTime<Utc>) -> Result<Account, PolicyError> {
        ensure_patient(account, "opt out of doctor sharing")?;
        match self.state(account, now) {
            AssignmentState::OptedOut => Ok(account.clone()),
            AssignmentState::Unassigned => {
                let mut next = account.clone();
                next.no_doctor = true;
                next.selected_doctor = None;
                next.doctor_selection_date = None;
                next.permanent_doctor_id = None;
                next.updated_at = truncate_to_millis(now);
                Ok(next)
            }
            AssignmentState::Selecting
            | AssignmentState::LockRequired
            | AssignmentState::Locked => Err(PolicyError::DoctorAlreadySelected),
        }
    }

    /// Sharing gate for the follow-up pipeline. Returns the doctor that will
    /// receive the follow-up.
    pub fn ensure_can_share<'a>(
        &self,
        account: &'a Account,
        now: DateTime<Utc>,
    ) -> Result<&'a DoctorProfile, PolicyError> {
        ensure_patient(account, "share follow-ups")?;
        if account.no_doctor {
            return Err(PolicyError::OptedOut);
        }
        let doctor = account
            .selected_doctor
            .as_ref()
            .ok_or(PolicyError::NoDoctorSelected)?;

        let days = self.window_days();
        let window_closed = account
            .doctor_selection_date
            .map_or(true, |selected_at| self.window_expired(selected_at, now));

        match self.state(account, now) {
            AssignmentState::LockRequired => Err(PolicyError::PermanentDoctorRequired { days }),
            AssignmentState::Locked => {
                if account.permanent_doctor_id.as_deref() == Some(doctor.id.as_str()) {
                    Ok(doctor)
                } else {
                    Err(PolicyError::SharingRestricted { days })
                }
            }
            _ if window_closed => Err(PolicyError::PermanentDoctorRequired { days }),
            _ => Ok(doctor),
        }
    }

    fn window_expired(&self, selected_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - selected_at >= self.lock_window
    }
}

impl Default for AssignmentPolicy {
    fn default() -> Self {
        Self::new(Duration::days(2))
    }
}

fn ensure_patient(account: &Account, action: &'static str) -> Result<(), PolicyError> {
    if account.is_patient() {
        Ok(())
    } else {
        Err(PolicyError::RoleRequired {
            required: Role::Patient,
            action,
        })
    }
}

fn resolve(directory: &DoctorDirectory<'_>, doctor_id: &str) -> Result<DoctorProfile, PolicyError> {
    directory
        .resolve(doctor_id)
        .ok_or_else(|| PolicyError::UnknownDoctor {
            doctor_id: doctor_id.to_string(),
        })
}

fn with_selection(account: &Account, snapshot: DoctorProfile, now: DateTime<Utc>) -> Account {
    let mut next = account.clone();
    next.selected_doctor = Some(snapshot);
    next.no_doctor = false;
    next.updated_at = truncate_to_millis(now);
    next
}
