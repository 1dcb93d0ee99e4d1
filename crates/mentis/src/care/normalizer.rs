use chrono::{DateTime, Utc};

use super::domain::{default_language, truncate_to_millis, Account, AccountRecord};

/// Normalized account plus whether anything had to be backfilled, so callers
/// know to persist the normalized form.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedAccount {
    pub account: Account,
    pub updated: bool,
}

/// Backfills missing fields on stored records. Idempotent, and never replaces
/// a value that is already present.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountNormalizer;

impl AccountNormalizer {
    pub fn normalize(record: &AccountRecord, now: DateTime<Utc>) -> NormalizedAccount {
        let now = truncate_to_millis(now);
        let mut updated = false;
        let mut backfill = |missing: bool| {
            if missing {
                updated = true;
            }
        };

        let username = match record.username.as_deref() {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => {
                backfill(true);
                record.email.clone()
            }
        };

        backfill(record.provider.is_none());
        let provider = record.provider.unwrap_or_default();

        backfill(record.role.is_none());
        let role = record.role.flatten();

        backfill(record.assessment.is_none());
        let assessment = record.assessment.clone().flatten();

        backfill(record.assessment_completed.is_none());
        let assessment_completed = record
            .assessment_completed
            .unwrap_or(assessment.is_some());

        let created_at = match record.created_at.and_then(DateTime::<Utc>::from_timestamp_millis) {
            Some(created) => created,
            None => {
                backfill(true);
                now
            }
        };

        let language_preference = match record.language_preference.as_deref() {
            Some(language) if !language.trim().is_empty() => language.to_string(),
            _ => {
                backfill(true);
                default_language()
            }
        };

        backfill(record.selected_doctor.is_none());
        let selected_doctor = record.selected_doctor.clone().flatten();

        backfill(record.no_doctor.is_none());
        let no_doctor = record.no_doctor.unwrap_or(false);

        backfill(record.doctor_selection_date.is_none());
        let mut doctor_selection_date = record
            .doctor_selection_date
            .flatten()
            .and_then(DateTime::<Utc>::from_timestamp_millis);
        // legacy records picked a doctor before the selection date was tracked
        if doctor_selection_date.is_none() && selected_doctor.is_some() {
            backfill(true);
            doctor_selection_date = Some(now);
        }

        backfill(record.permanent_doctor_id.is_none());
        let permanent_doctor_id = record.permanent_doctor_id.clone().flatten();

        backfill(record.follow_ups.is_none());
        let follow_ups = record.follow_ups.clone().unwrap_or_default();

        let stored_updated_at = record.updated_at.and_then(DateTime::<Utc>::from_timestamp_millis);
        backfill(stored_updated_at.is_none());

        let updated_at = match (updated, stored_updated_at) {
            (false, Some(stamp)) => stamp,
            _ => now,
        };

        NormalizedAccount {
            account: Account {
                email: record.email.clone(),
                username,
                provider,
                role,
                assessment,
                assessment_completed,
                created_at,
                updated_at,
                language_preference,
                selected_doctor,
                no_doctor,
                doctor_selection_date,
                permanent_doctor_id,
                follow_ups,
                doctor_description: record.doctor_description.clone(),
                languages: record.languages.clone(),
                location: record.location.clone(),
                speciality: record.speciality.clone(),
                extra: record.extra.clone(),
            },
            updated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::care::domain::{Provider, Role};
    use crate::care::tests::common::{at, sample_profile};
    use serde_json::json;

    fn legacy_record() -> AccountRecord {
        serde_json::from_value(json!({
            "email": "legacy@example.com",
            "password": "kept",
            "role": "patient",
            "createdAt": 1_700_000_000_000_i64
        }))
        .expect("legacy record parses")
    }

    #[test]
    fn backfills_missing_fields_with_documented_defaults() {
        let now = at(0);
        let normalized = AccountNormalizer::normalize(&legacy_record(), now);
        assert!(normalized.updated);

        let account = normalized.account;
        assert_eq!(account.username, "legacy@example.com");
        assert_eq!(account.provider, Provider::Local);
        assert_eq!(account.role, Some(Role::Patient));
        assert_eq!(account.language_preference, "en");
        assert!(account.follow_ups.is_empty());
        assert!(!account.no_doctor);
        assert!(!account.assessment_completed);
        assert_eq!(account.permanent_doctor_id, None);
        assert_eq!(account.created_at.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(account.updated_at, now);
        assert_eq!(account.extra.get("password"), Some(&json!("kept")));
    }

    #[test]
    fn normalizing_twice_changes_nothing() {
        let first = AccountNormalizer::normalize(&legacy_record(), at(0));
        let second = AccountNormalizer::normalize(
            &AccountRecord::from(first.account.clone()),
            at(5_000),
        );
        assert!(!second.updated);
        assert_eq!(second.account, first.account);
    }

    #[test]
    fn idempotent_for_sub_millisecond_clocks() {
        let now = at(0) + chrono::Duration::nanoseconds(123_456);
        let first = AccountNormalizer::normalize(&AccountRecord::new("x@example.com"), now);
        let second =
            AccountNormalizer::normalize(&AccountRecord::from(first.account.clone()), now);
        assert!(!second.updated);
        assert_eq!(second.account, first.account);
    }

    #[test]
    fn never_overwrites_present_values() {
        let mut record = AccountRecord::from(
            AccountNormalizer::normalize(&legacy_record(), at(0)).account,
        );
        record.provider = Some(Provider::Google);
        record.language_preference = Some("ar".to_string());
        record.no_doctor = Some(true);
        record.permanent_doctor_id = Some(Some("amy@clinic.test".to_string()));

        let normalized = AccountNormalizer::normalize(&record, at(10_000));
        assert!(!normalized.updated);
        assert_eq!(normalized.account.provider, Provider::Google);
        assert_eq!(normalized.account.language_preference, "ar");
        assert!(normalized.account.no_doctor);
        assert_eq!(
            normalized.account.permanent_doctor_id.as_deref(),
            Some("amy@clinic.test")
        );
    }

    #[test]
    fn legacy_selection_without_date_starts_the_window_now() {
        let mut record = AccountRecord::from(
            AccountNormalizer::normalize(&legacy_record(), at(0)).account,
        );
        record.selected_doctor = Some(Some(sample_profile("amy@clinic.test")));
        record.doctor_selection_date = Some(None);

        let now = at(60_000);
        let normalized = AccountNormalizer::normalize(&record, now);
        assert!(normalized.updated);
        assert_eq!(normalized.account.doctor_selection_date, Some(now));
    }

    #[test]
    fn completed_flag_defaults_from_assessment_presence() {
        let record: AccountRecord = serde_json::from_value(json!({
            "email": "done@example.com",
            "assessment": {
                "answers": [4, 4, 4, 4, 4, 4, 4, 4, 4, 4],
                "score": 40,
                "maxScore": 40,
                "percentage": 100,
                "level": "severe",
                "completedAt": 1_700_000_000_000_i64
            }
        }))
        .expect("parses");
        let normalized = AccountNormalizer::normalize(&record, at(0));
        assert!(normalized.account.assessment_completed);
        assert_eq!(
            normalized
                .account
                .assessment
                .as_ref()
                .map(|assessment| assessment.language.as_str()),
            Some("en")
        );
    }
}
