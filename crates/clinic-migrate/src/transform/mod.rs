//! Entity transformers.
//!
//! Pure, deterministic functions from typed legacy records to target
//! records. No I/O, no errors: invalid fields degrade to defaults so one bad
//! row never costs the batch. Foreign keys are left unresolved here and are
//! wired later through the crosswalks.

mod appointment;
mod charge;
pub mod normalize;
mod patient;

pub use appointment::{appointment_status, payment_method, transform_appointment};
pub use charge::{classify_category, dedupe_service_items, transform_charge};
pub use patient::{display_id_for, transform_patient};

use chrono::{DateTime, Utc};

use crate::config::DisplayIdConfig;

/// Inputs shared by every transformer in one run.
#[derive(Debug, Clone)]
pub struct TransformContext {
    pub display_id: DisplayIdConfig,

    /// Timestamp used when a legacy row carries none.
    pub migrated_at: DateTime<Utc>,
}

impl TransformContext {
    pub fn new(display_id: DisplayIdConfig, migrated_at: DateTime<Utc>) -> Self {
        Self {
            display_id,
            migrated_at,
        }
    }
}

/// Legacy status values that mark a record as no longer active.
pub(crate) fn is_active_status(status: Option<&str>) -> bool {
    !matches!(
        status.map(|s| s.trim().to_ascii_lowercase()).as_deref(),
        Some("0" | "inactive" | "deleted" | "disabled")
    )
}

#[cfg(test)]
pub(crate) fn test_context() -> TransformContext {
    use chrono::TimeZone;
    TransformContext::new(
        DisplayIdConfig::default(),
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap(),
    )
}
