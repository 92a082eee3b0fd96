//! Per-run state threaded through every stage.
//!
//! Created at the start of a run and dropped at its end; nothing here
//! outlives the run or is shared between runs.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::crosswalk::{Crosswalk, DoctorCrosswalk};
use crate::error::{MigrateError, Result};
use crate::transform::TransformContext;

pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub transform: TransformContext,
    pub patients: Crosswalk,
    pub doctors: Option<DoctorCrosswalk>,
    pub appointments: Crosswalk,
    cancel: CancellationToken,
}

impl RunContext {
    pub fn new(config: &Config, cancel: CancellationToken) -> Self {
        let started_at = Utc::now();
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at,
            transform: TransformContext::new(config.display_id.clone(), started_at),
            patients: Crosswalk::new(&config.collections.patients),
            doctors: None,
            appointments: Crosswalk::new(&config.collections.appointments),
            cancel,
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fail with [`MigrateError::Cancelled`] once cancellation was requested.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(MigrateError::Cancelled);
        }
        Ok(())
    }

    pub fn resolve_patient(&self, legacy_id: Option<i64>) -> Option<String> {
        legacy_id
            .and_then(|id| self.patients.resolve(id))
            .map(str::to_string)
    }

    pub fn resolve_doctor(&self, legacy_id: Option<i64>) -> Option<String> {
        let doctors = self.doctors.as_ref()?;
        legacy_id
            .and_then(|id| doctors.resolve(id))
            .map(str::to_string)
    }
}
