use chrono::{Datelike, NaiveDate};

use super::normalize::{
    clean_name, format_display_id, normalize_email, normalize_gender, normalize_phone,
    parse_date, split_name, timestamp_or, trailing_digits,
};
use super::{is_active_status, TransformContext};
use crate::config::DisplayIdConfig;
use crate::dump::LegacyPatient;
use crate::model::{Address, EmergencyContact, Patient};

const UNKNOWN_NAME: &str = "Unknown";
const MAX_AGE: i64 = 130;

/// Display id from the legacy unique id's digits, else legacy id + offset (saturating).
pub fn display_id_for(row: &LegacyPatient, cfg: &DisplayIdConfig) -> String {
    let number = row
        .unique_id
        .as_deref()
        .and_then(trailing_digits)
        .filter(|n| *n > 0)
        .unwrap_or_else(|| row.id.saturating_add(cfg.offset));
    format_display_id(&cfg.prefix, cfg.width, number)
}

pub fn transform_patient(row: &LegacyPatient, ctx: &TransformContext) -> Patient {
    let full_name = row
        .name
        .as_deref()
        .map(clean_name)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| UNKNOWN_NAME.to_string());
    let (first_name, last_name) = split_name(&full_name);

    let date_of_birth = row.dob.as_deref().and_then(parse_date);
    let age = row
        .age
        .filter(|a| (1..=MAX_AGE).contains(a))
        .or_else(|| date_of_birth.map(|dob| age_on(dob, ctx.migrated_at.date_naive())));

    let emergency_name = row.emergency_name.as_deref().map(clean_name);
    let emergency_phone = row.emergency_phone.as_deref().and_then(normalize_phone);
    let emergency_contact = (emergency_name.is_some() || emergency_phone.is_some()).then(|| {
        EmergencyContact {
            name: emergency_name,
            phone: emergency_phone,
        }
    });

    let created_at = timestamp_or(row.created_at.as_deref(), ctx.migrated_at);
    let updated_at = timestamp_or(row.updated_at.as_deref(), created_at);

    Patient {
        legacy_id: row.id,
        patient_id: display_id_for(row, &ctx.display_id),
        first_name,
        last_name,
        full_name,
        gender: normalize_gender(row.gender.as_deref()),
        age,
        date_of_birth,
        phone: row.phone.as_deref().and_then(normalize_phone),
        email: row.email.as_deref().and_then(normalize_email),
        address: Address {
            street: row.address.clone(),
            city: row.city.clone(),
            state: row.state.clone(),
            pincode: row.pincode.clone(),
        },
        emergency_contact,
        medical_history: row.history.clone(),
        is_active: is_active_status(row.status.as_deref()),
        created_at,
        updated_at,
    }
}

fn age_on(dob: NaiveDate, today: NaiveDate) -> i64 {
    let mut years = i64::from(today.year() - dob.year());
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        years -= 1;
    }
    years.max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Gender;
    use crate::transform::test_context;

    fn legacy(id: i64) -> LegacyPatient {
        LegacyPatient {
            id,
            name: Some("Mrs. Sunita  Rao".into()),
            gender: Some("female".into()),
            phone: Some("+91 98765 43210".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_transform_basic_fields() {
        let ctx = test_context();
        let patient = transform_patient(&legacy(42), &ctx);
        assert_eq!(patient.legacy_id, 42);
        assert_eq!(patient.full_name, "Sunita Rao");
        assert_eq!(patient.first_name, "Sunita");
        assert_eq!(patient.last_name, "Rao");
        assert_eq!(patient.gender, Gender::Female);
        assert_eq!(patient.phone.as_deref(), Some("9876543210"));
        assert_eq!(patient.patient_id, "PAT001042");
        assert!(patient.is_active);
        assert_eq!(patient.created_at, ctx.migrated_at);
        assert!(patient.emergency_contact.is_none());
    }

    #[test]
    fn test_display_id_prefers_unique_id() {
        let cfg = DisplayIdConfig::default();
        let mut row = legacy(7);
        row.unique_id = Some("P-0315".into());
        assert_eq!(display_id_for(&row, &cfg), "PAT000315");

        row.unique_id = Some("n/a".into());
        assert_eq!(display_id_for(&row, &cfg), "PAT001007");
    }

    #[test]
    fn test_display_id_fallback_saturates_at_extreme_ids() {
        let ctx = test_context();
        let patient = transform_patient(&legacy(i64::MAX), &ctx);
        assert_eq!(patient.legacy_id, i64::MAX);
        assert_eq!(patient.patient_id, format!("PAT{}", i64::MAX));

        let cfg = DisplayIdConfig {
            offset: i64::MAX,
            ..DisplayIdConfig::default()
        };
        assert_eq!(
            display_id_for(&legacy(1), &cfg),
            format!("PAT{}", i64::MAX)
        );
    }

    #[test]
    fn test_invalid_fields_degrade() {
        let ctx = test_context();
        let row = LegacyPatient {
            id: 3,
            dob: Some("0000-00-00".into()),
            phone: Some("12345".into()),
            email: Some("none".into()),
            age: Some(0),
            status: Some("inactive".into()),
            created_at: Some("garbage".into()),
            ..Default::default()
        };
        let patient = transform_patient(&row, &ctx);
        assert_eq!(patient.full_name, "Unknown");
        assert_eq!(patient.date_of_birth, None);
        assert_eq!(patient.phone, None);
        assert_eq!(patient.email, None);
        assert_eq!(patient.age, None);
        assert_eq!(patient.gender, Gender::Other);
        assert!(!patient.is_active);
        assert_eq!(patient.created_at, ctx.migrated_at);
    }

    #[test]
    fn test_age_from_dob() {
        let ctx = test_context();
        let row = LegacyPatient {
            id: 9,
            dob: Some("1990-06-01".into()),
            emergency_name: Some("Mr. Anil".into()),
            ..Default::default()
        };
        let patient = transform_patient(&row, &ctx);
        assert_eq!(patient.age, Some(33));
        let contact = patient.emergency_contact.unwrap();
        assert_eq!(contact.name.as_deref(), Some("Anil"));
        assert_eq!(contact.phone, None);
    }

    #[test]
    fn test_transform_is_deterministic() {
        let ctx = test_context();
        assert_eq!(
            transform_patient(&legacy(5), &ctx),
            transform_patient(&legacy(5), &ctx)
        );
    }
}
