use super::domain::{Account, DoctorProfile};

pub const DEFAULT_SPECIALITY: &str = "Mentis Anchora Specialist";

impl DoctorProfile {
    /// Public view of a doctor account using its current profile fields.
    pub fn from_account(account: &Account) -> Self {
        let languages = match &account.languages {
            Some(languages) => languages.clone(),
            None => vec![account.language_preference.clone()],
        };

        Self {
            id: account.email.clone(),
            name: account.display_name().to_string(),
            email: account.email.clone(),
            languages,
            location: account.location.clone(),
            speciality: account
                .speciality
                .clone()
                .unwrap_or_else(|| DEFAULT_SPECIALITY.to_string()),
            description: account.doctor_description.clone(),
        }
    }
}

/// Doctor listing derived on demand from the account collection.
///
/// Nothing is cached, so profile edits show up on the next call. Order is the
/// insertion order of the underlying collection; no sort is applied.
#[derive(Debug, Clone, Copy)]
pub struct DoctorDirectory<'a> {
    accounts: &'a [Account],
}

impl<'a> DoctorDirectory<'a> {
    pub fn new(accounts: &'a [Account]) -> Self {
        Self { accounts }
    }

    pub fn profiles(&self) -> impl Iterator<Item = DoctorProfile> + 'a {
        self.accounts
            .iter()
            .filter(|account| account.is_doctor())
            .map(DoctorProfile::from_account)
    }

    /// Resolve a doctor id (the doctor's email) to a fresh profile snapshot.
    pub fn resolve(&self, doctor_id: &str) -> Option<DoctorProfile> {
        self.accounts
            .iter()
            .find(|account| account.is_doctor() && account.email == doctor_id)
            .map(DoctorProfile::from_account)
    }
}
