//! Reconciliation passes.
//!
//! Each pass repairs one class of inconsistency with a bounded query followed
//! by one bulk write. Filters exclude records that are already correct, so a
//! pass can be rerun at any time. Passes are never chained automatically;
//! the operator invokes each one explicitly.

mod display_ids;
mod doctors;
mod orphans;
mod relabel;

pub use display_ids::NormalizeDisplayIds;
pub use doctors::{MergeDoctors, RepairDoctorLinks};
pub use orphans::PruneOrphans;
pub use relabel::RelabelField;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::store::DocumentStore;

/// Outcome of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    pub pass: String,

    /// Records the pass selected.
    pub matched: u64,

    /// Records rewritten.
    pub modified: u64,

    /// Records removed.
    pub deleted: u64,

    /// True when the pass only counted.
    pub dry_run: bool,

    /// Operator-facing notes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl PassReport {
    pub fn new(pass: &str) -> Self {
        Self {
            pass: pass.to_string(),
            ..Default::default()
        }
    }
}

/// A repeatable repair over the document store.
#[async_trait]
pub trait ReconcilePass: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, store: &dyn DocumentStore) -> Result<PassReport>;
}

/// Run one pass with start/finish logging.
pub async fn run_pass(pass: &dyn ReconcilePass, store: &dyn DocumentStore) -> Result<PassReport> {
    info!("Reconcile pass {}: starting", pass.name());
    let report = pass.run(store).await?;
    info!(
        pass = %report.pass,
        matched = report.matched,
        modified = report.modified,
        deleted = report.deleted,
        dry_run = report.dry_run,
        "Reconcile pass complete"
    );
    Ok(report)
}
