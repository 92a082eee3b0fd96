//! Bulk rewrite of an obsolete enum value.

use async_trait::async_trait;
use serde_json::Value;

use super::{PassReport, ReconcilePass};
use crate::error::{MigrateError, Result};
use crate::store::{DocumentStore, Filter, Update, UpdateOp};

#[derive(Debug, Clone)]
pub struct RelabelField {
    pub collection: String,
    pub field: String,
    pub from: Value,
    pub to: Value,
}

impl RelabelField {
    pub fn new(collection: &str, field: &str, from: impl Into<Value>, to: impl Into<Value>) -> Self {
        Self {
            collection: collection.to_string(),
            field: field.to_string(),
            from: from.into(),
            to: to.into(),
        }
    }
}

#[async_trait]
impl ReconcilePass for RelabelField {
    fn name(&self) -> &str {
        "relabel"
    }

    async fn run(&self, store: &dyn DocumentStore) -> Result<PassReport> {
        if self.from == self.to {
            return Err(MigrateError::reconcile(
                self.name(),
                format!("{} is already {}", self.field, self.to),
            ));
        }
        if self.field.is_empty() || self.field.contains('.') {
            return Err(MigrateError::reconcile(
                self.name(),
                format!("field {:?} must be a top-level field name", self.field),
            ));
        }

        let filter = Filter::Eq(self.field.clone(), self.from.clone());
        let mut report = PassReport::new(self.name());
        report.matched = store.count(&self.collection, &filter).await?;
        if report.matched > 0 {
            let op = UpdateOp::new(filter, Update::new().set(&self.field, self.to.clone()));
            report.modified = store.bulk_update(&self.collection, vec![op]).await?;
        }
        report.details.push(format!(
            "{}.{}: {} -> {}",
            self.collection, self.field, self.from, self.to
        ));
        Ok(report)
    }
}
