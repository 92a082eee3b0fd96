//! Patient display id normalization.
//!
//! Non-canonical ids are rewritten from their trailing digit run. Every
//! proposal is checked against the ids that stay and against the other
//! proposals; any collision aborts the pass before a single write.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use super::{PassReport, ReconcilePass};
use crate::config::DisplayIdConfig;
use crate::error::{MigrateError, Result};
use crate::store::{doc_id, DocumentStore, Filter, Update, UpdateOp, ID_FIELD};
use crate::transform::normalize::{format_display_id, trailing_digits};

pub const DISPLAY_ID_FIELD: &str = "patientId";

#[derive(Debug, Clone)]
pub struct NormalizeDisplayIds {
    pub collection: String,
    pub format: DisplayIdConfig,
}

/// One planned rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rename {
    pub id: String,
    pub from: String,
    pub to: String,
}

impl NormalizeDisplayIds {
    pub fn new(collection: &str, format: DisplayIdConfig) -> Self {
        Self {
            collection: collection.to_string(),
            format,
        }
    }

    /// Canonical form of `display_id`, or `None` without a digit run.
    pub fn canonical(&self, display_id: &str) -> Option<String> {
        trailing_digits(display_id)
            .map(|n| format_display_id(&self.format.prefix, self.format.width, n))
    }

    /// Plan rewrites for `(doc id, display id)` pairs.
    ///
    /// Returns the renames and the display ids that have no digits to keep.
    pub fn plan(&self, current: &[(String, String)]) -> Result<(Vec<Rename>, Vec<String>)> {
        let mut renames = Vec::new();
        let mut unfixable = Vec::new();
        let mut kept = HashSet::new();

        for (id, display) in current {
            match self.canonical(display) {
                Some(canonical) if canonical == *display => {
                    kept.insert(display.clone());
                }
                Some(canonical) => renames.push(Rename {
                    id: id.clone(),
                    from: display.clone(),
                    to: canonical,
                }),
                None => {
                    kept.insert(display.clone());
                    unfixable.push(display.clone());
                }
            }
        }

        let mut targets: HashMap<&str, Vec<&Rename>> = HashMap::new();
        for rename in &renames {
            targets.entry(rename.to.as_str()).or_default().push(rename);
        }
        let mut collisions: Vec<String> = targets
            .iter()
            .filter(|(to, group)| group.len() > 1 || kept.contains(**to))
            .flat_map(|(_, group)| group.iter().map(|r| format!("{} -> {}", r.from, r.to)))
            .collect();
        if !collisions.is_empty() {
            collisions.sort();
            return Err(MigrateError::IdCollision(collisions));
        }

        Ok((renames, unfixable))
    }
}

#[async_trait]
impl ReconcilePass for NormalizeDisplayIds {
    fn name(&self) -> &str {
        "normalize-ids"
    }

    async fn run(&self, store: &dyn DocumentStore) -> Result<PassReport> {
        let docs = store
            .find(
                &self.collection,
                &Filter::not_null(DISPLAY_ID_FIELD),
                Some(&[DISPLAY_ID_FIELD]),
            )
            .await?;
        let current: Vec<(String, String)> = docs
            .iter()
            .filter_map(|d| {
                let display = d.get(DISPLAY_ID_FIELD).and_then(Value::as_str)?;
                Some((doc_id(d)?.to_string(), display.to_string()))
            })
            .collect();

        let (renames, unfixable) = self.plan(&current)?;
        let mut report = PassReport::new(self.name());
        report.matched = renames.len() as u64;
        for display_id in &unfixable {
            warn!("Display id {:?} has no digits to normalize", display_id);
            report.details.push(format!("{}: no digits, left as is", display_id));
        }

        let ops = renames
            .iter()
            .map(|r| {
                UpdateOp::new(
                    Filter::And(vec![
                        Filter::eq(ID_FIELD, r.id.as_str()),
                        Filter::eq(DISPLAY_ID_FIELD, r.from.as_str()),
                    ]),
                    Update::new().set(DISPLAY_ID_FIELD, r.to.as_str()),
                )
            })
            .collect::<Vec<_>>();
        if !ops.is_empty() {
            report.modified = store.bulk_update(&self.collection, ops).await?;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Document, MemoryStore};
    use serde_json::json;

    fn pass() -> NormalizeDisplayIds {
        NormalizeDisplayIds::new("patients", DisplayIdConfig::default())
    }

    fn pairs(ids: &[&str]) -> Vec<(String, String)> {
        ids.iter()
            .enumerate()
            .map(|(i, d)| (format!("id{}", i), d.to_string()))
            .collect()
    }

    #[test]
    fn test_plan_rewrites_non_canonical() {
        let (renames, unfixable) = pass()
            .plan(&pairs(&["PAT001001", "P-1002", "pat1003", "walk-in"]))
            .unwrap();
        assert_eq!(renames.len(), 2);
        assert_eq!(renames[0].to, "PAT001002");
        assert_eq!(renames[1].to, "PAT001003");
        assert_eq!(unfixable, vec!["walk-in"]);
    }

    #[test]
    fn test_collision_with_existing_id_aborts() {
        let err = pass().plan(&pairs(&["PAT001001", "P-1001"])).unwrap_err();
        match err {
            MigrateError::IdCollision(list) => assert_eq!(list, vec!["P-1001 -> PAT001001"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_collision_between_proposals_aborts() {
        let err = pass().plan(&pairs(&["A-7", "B-0007"])).unwrap_err();
        assert!(matches!(err, MigrateError::IdCollision(ref l) if l.len() == 2));
    }

    #[tokio::test]
    async fn test_run_is_rerunnable_and_aborts_without_writes() {
        let store = MemoryStore::new();
        let docs: Vec<Document> = ["PAT001001", "P-1002"]
            .iter()
            .map(|d| match json!({"patientId": d}) {
                Value::Object(m) => m,
                _ => unreachable!(),
            })
            .collect();
        store.insert_many("patients", docs).await.unwrap();

        let report = pass().run(&store).await.unwrap();
        assert_eq!(report.modified, 1);
        let rerun = pass().run(&store).await.unwrap();
        assert_eq!(rerun.matched, 0);

        let clash = match json!({"patientId": "X1002"}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        store.insert_many("patients", vec![clash]).await.unwrap();
        assert!(pass().run(&store).await.is_err());
        assert_eq!(
            store
                .count("patients", &Filter::eq("patientId", "X1002"))
                .await
                .unwrap(),
            1
        );
    }
}
