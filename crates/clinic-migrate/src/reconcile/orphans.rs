//! Orphan pruning.
//!
//! Migrated appointments and bills whose patient reference never resolved
//! are orphans: their source patients had no usable phone and were not
//! carried over. Without confirmation the pass only counts them.

use async_trait::async_trait;

use super::{PassReport, ReconcilePass};
use crate::crosswalk::LEGACY_ID_FIELD;
use crate::error::Result;
use crate::store::{DocumentStore, Filter};

#[derive(Debug, Clone)]
pub struct PruneOrphans {
    /// Collections to prune, dependents first (bills before appointments).
    pub collections: Vec<String>,
    pub confirm: bool,
}

impl PruneOrphans {
    pub fn new(collections: &[&str], confirm: bool) -> Self {
        Self {
            collections: collections.iter().map(|c| c.to_string()).collect(),
            confirm,
        }
    }

    /// Only migrated records with a null patient qualify.
    pub fn orphan_filter() -> Filter {
        Filter::And(vec![
            Filter::exists(LEGACY_ID_FIELD),
            Filter::is_null("patient"),
        ])
    }
}

#[async_trait]
impl ReconcilePass for PruneOrphans {
    fn name(&self) -> &str {
        "prune-orphans"
    }

    async fn run(&self, store: &dyn DocumentStore) -> Result<PassReport> {
        let filter = Self::orphan_filter();
        let mut report = PassReport::new(self.name());
        report.dry_run = !self.confirm;

        for collection in &self.collections {
            let count = store.count(collection, &filter).await?;
            report.matched += count;
            if self.confirm && count > 0 {
                let deleted = store.delete_many(collection, &filter).await?;
                report.deleted += deleted;
                report.details.push(format!("{}: {} deleted", collection, deleted));
            } else {
                report.details.push(format!("{}: {} orphans", collection, count));
            }
        }
        Ok(report)
    }
}
