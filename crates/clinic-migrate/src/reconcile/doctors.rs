//! Doctor reference repairs.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use super::{PassReport, ReconcilePass};
use crate::crosswalk::{doctor_name_key, LEGACY_ID_FIELD};
use crate::error::{MigrateError, Result};
use crate::model::Doctor;
use crate::store::{from_document, DocumentStore, Filter, Update, UpdateOp, ID_FIELD};

const DOCTOR_FIELD: &str = "doctor";

/// Rebind appointments and bills from stale doctor ids to the correct ones.
#[derive(Debug, Clone)]
pub struct RepairDoctorLinks {
    /// `(from, to)` doctor `_id` pairs.
    pub mappings: Vec<(String, String)>,
    pub doctors: String,
    pub dependents: Vec<String>,
}

impl RepairDoctorLinks {
    pub fn new(mappings: Vec<(String, String)>, doctors: &str, dependents: &[&str]) -> Self {
        Self {
            mappings,
            doctors: doctors.to_string(),
            dependents: dependents.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[async_trait]
impl ReconcilePass for RepairDoctorLinks {
    fn name(&self) -> &str {
        "repair-doctor-links"
    }

    async fn run(&self, store: &dyn DocumentStore) -> Result<PassReport> {
        if self.mappings.is_empty() {
            return Err(MigrateError::reconcile(self.name(), "no doctor id mappings given"));
        }
        for (from, to) in &self.mappings {
            if from == to {
                return Err(MigrateError::reconcile(
                    self.name(),
                    format!("mapping {} -> {} is a no-op", from, to),
                ));
            }
            if store.count(&self.doctors, &Filter::eq(ID_FIELD, to.as_str())).await? == 0 {
                return Err(MigrateError::reconcile(
                    self.name(),
                    format!("target doctor {} does not exist", to),
                ));
            }
        }

        let mut report = PassReport::new(self.name());
        let stale = Filter::is_in(DOCTOR_FIELD, self.mappings.iter().map(|(from, _)| from.as_str()));
        for collection in &self.dependents {
            report.matched += store.count(collection, &stale).await?;
            let ops = self
                .mappings
                .iter()
                .map(|(from, to)| {
                    UpdateOp::new(
                        Filter::eq(DOCTOR_FIELD, from.as_str()),
                        Update::new().set(DOCTOR_FIELD, to.as_str()),
                    )
                })
                .collect();
            let modified = store.bulk_update(collection, ops).await?;
            report
                .details
                .push(format!("{}: {} records rebound", collection, modified));
            report.modified += modified;
        }
        Ok(report)
    }
}

/// Fold a duplicate doctor into its survivor, then delete the duplicate.
///
/// Refuses unless both records carry the same name (honorific-stripped,
/// case-insensitive) and the same specialization.
#[derive(Debug, Clone)]
pub struct MergeDoctors {
    pub duplicate: String,
    pub survivor: String,
    pub doctors: String,
    pub dependents: Vec<String>,
}

impl MergeDoctors {
    pub fn new(duplicate: &str, survivor: &str, doctors: &str, dependents: &[&str]) -> Self {
        Self {
            duplicate: duplicate.to_string(),
            survivor: survivor.to_string(),
            doctors: doctors.to_string(),
            dependents: dependents.iter().map(|c| c.to_string()).collect(),
        }
    }

    async fn load(&self, store: &dyn DocumentStore, id: &str) -> Result<Option<Doctor>> {
        let mut docs = store
            .find(&self.doctors, &Filter::eq(ID_FIELD, id), None)
            .await?;
        match docs.pop() {
            Some(doc) => Ok(Some(from_document(doc)?)),
            None => Ok(None),
        }
    }

    fn refuse(&self, reason: String) -> MigrateError {
        MigrateError::MergeNotConfirmed {
            duplicate: self.duplicate.clone(),
            survivor: self.survivor.clone(),
            reason,
        }
    }

    /// Name and specialization must agree.
    pub fn confirm(&self, duplicate: &Doctor, survivor: &Doctor) -> Result<()> {
        let (dup_name, surv_name) = (doctor_name_key(&duplicate.name), doctor_name_key(&survivor.name));
        if dup_name != surv_name {
            return Err(self.refuse(format!(
                "names differ ({:?} vs {:?})",
                duplicate.name, survivor.name
            )));
        }
        let specialty = |d: &Doctor| {
            d.specialization
                .as_deref()
                .map(|s| s.trim().to_lowercase())
                .unwrap_or_default()
        };
        if specialty(duplicate) != specialty(survivor) {
            return Err(self.refuse(format!(
                "specializations differ ({:?} vs {:?})",
                duplicate.specialization, survivor.specialization
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ReconcilePass for MergeDoctors {
    fn name(&self) -> &str {
        "merge-doctors"
    }

    async fn run(&self, store: &dyn DocumentStore) -> Result<PassReport> {
        if self.duplicate == self.survivor {
            return Err(self.refuse("duplicate and survivor are the same record".to_string()));
        }
        let mut report = PassReport::new(self.name());

        let Some(survivor) = self.load(store, &self.survivor).await? else {
            return Err(MigrateError::reconcile(
                self.name(),
                format!("survivor doctor {} does not exist", self.survivor),
            ));
        };
        let Some(duplicate) = self.load(store, &self.duplicate).await? else {
            info!("Duplicate doctor {} already merged", self.duplicate);
            report
                .details
                .push(format!("duplicate {} not found, nothing to merge", self.duplicate));
            return Ok(report);
        };
        self.confirm(&duplicate, &survivor)?;

        let stale = Filter::eq(DOCTOR_FIELD, self.duplicate.as_str());
        for collection in &self.dependents {
            report.matched += store.count(collection, &stale).await?;
            let op = UpdateOp::new(
                stale.clone(),
                Update::new().set(DOCTOR_FIELD, self.survivor.as_str()),
            );
            report.modified += store.bulk_update(collection, vec![op]).await?;
        }

        // Keep the duplicate's legacy id reachable through the survivor.
        if let (Some(legacy), None) = (duplicate.legacy_id, survivor.legacy_id) {
            let op = UpdateOp::new(
                Filter::eq(ID_FIELD, self.survivor.as_str()),
                Update::new().set(LEGACY_ID_FIELD, Value::from(legacy)),
            );
            store.bulk_update(&self.doctors, vec![op]).await?;
            report
                .details
                .push(format!("legacy id {} moved to survivor", legacy));
        } else if duplicate.legacy_id.is_some() {
            warn!(
                "Duplicate doctor {} carried legacy id {:?}; survivor keeps {:?}",
                self.duplicate, duplicate.legacy_id, survivor.legacy_id
            );
        }

        report.deleted = store
            .delete_many(&self.doctors, &Filter::eq(ID_FIELD, self.duplicate.as_str()))
            .await?;
        Ok(report)
    }
}
