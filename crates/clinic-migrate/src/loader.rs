//! Idempotent loader and link step.
//!
//! Insertion is gated purely on `legacyId`: a candidate whose legacy id is
//! already in the target collection is skipped, so an identical batch loaded
//! twice writes nothing the second time. Inserts go out in bounded chunks;
//! a failed chunk aborts the load and a rerun resumes where it stopped.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::crosswalk::{Crosswalk, LEGACY_ID_FIELD};
use crate::error::{MigrateError, Result};
use crate::model::LegacyKeyed;
use crate::store::{doc_id, lookup, to_document, DocumentStore, Filter, Update, UpdateOp, ID_FIELD};

/// Legacy appointment key carried by bills.
pub const LEGACY_APPOINTMENT_FIELD: &str = "legacyAppointmentId";

/// Counts for one collection load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadStats {
    pub collection: String,

    /// Candidates handed to the loader.
    pub found: usize,

    /// Newly written (or, in a dry run, planned) records.
    pub inserted: usize,

    /// Candidates whose legacy id was already present.
    pub skipped: usize,

    /// Repeats of a legacy id within the same batch.
    pub duplicates: usize,
}

/// Counts for one link pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStats {
    pub collection: String,
    pub field: String,

    /// Records with a legacy key but a null reference.
    pub found: usize,

    /// Records actually patched.
    pub linked: u64,

    /// Records whose legacy key has no crosswalk entry.
    pub not_found: usize,
}

/// Insert/skip partition of one candidate batch.
#[derive(Debug, Clone)]
pub struct LoadPlan<T> {
    pub to_insert: Vec<T>,
    pub stats: LoadStats,
}

/// Result of executing a plan.
#[derive(Debug, Clone, Default)]
pub struct LoadOutcome {
    pub stats: LoadStats,

    /// `(legacyId, _id)` for every inserted record, for the crosswalks.
    pub assigned: Vec<(i64, String)>,
}

/// Foreign keys of a stored appointment, copied onto its bill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentRefs {
    pub id: String,
    pub patient: Option<String>,
    pub doctor: Option<String>,
}

pub struct Loader<'a> {
    store: &'a dyn DocumentStore,
    chunk_size: usize,
    cancel: CancellationToken,
}

impl<'a> Loader<'a> {
    pub fn new(store: &'a dyn DocumentStore, chunk_size: usize, cancel: CancellationToken) -> Self {
        Self {
            store,
            chunk_size: chunk_size.max(1),
            cancel,
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(MigrateError::Cancelled);
        }
        Ok(())
    }

    /// Legacy ids already present in a collection.
    pub async fn existing_legacy_ids(&self, collection: &str) -> Result<HashSet<i64>> {
        let docs = self
            .store
            .find(
                collection,
                &Filter::exists(LEGACY_ID_FIELD),
                Some(&[LEGACY_ID_FIELD]),
            )
            .await?;
        Ok(docs
            .iter()
            .filter_map(|d| d.get(LEGACY_ID_FIELD).and_then(Value::as_i64))
            .collect())
    }

    /// Partition candidates into insert and skip without writing.
    pub async fn plan<T: LegacyKeyed>(
        &self,
        collection: &str,
        candidates: Vec<T>,
    ) -> Result<LoadPlan<T>> {
        let existing = self.existing_legacy_ids(collection).await?;
        let mut stats = LoadStats {
            collection: collection.to_string(),
            found: candidates.len(),
            ..Default::default()
        };

        let mut in_batch = HashSet::new();
        let mut to_insert = Vec::new();
        for candidate in candidates {
            let legacy = candidate.legacy_id();
            if existing.contains(&legacy) {
                stats.skipped += 1;
            } else if !in_batch.insert(legacy) {
                stats.duplicates += 1;
            } else {
                to_insert.push(candidate);
            }
        }
        stats.inserted = to_insert.len();

        if stats.duplicates > 0 {
            warn!(
                collection,
                duplicates = stats.duplicates,
                "Repeated legacy ids within one batch, keeping the first"
            );
        }
        debug!(
            collection,
            found = stats.found,
            to_insert = stats.inserted,
            skipped = stats.skipped,
            "Planned load"
        );
        Ok(LoadPlan { to_insert, stats })
    }

    /// Write a plan's inserts in chunks.
    pub async fn execute<T: LegacyKeyed + Serialize>(
        &self,
        collection: &str,
        plan: LoadPlan<T>,
    ) -> Result<LoadOutcome> {
        let LoadPlan { to_insert, mut stats } = plan;
        let mut assigned = Vec::with_capacity(to_insert.len());

        for (chunk_no, chunk) in to_insert.chunks(self.chunk_size).enumerate() {
            self.check_cancelled()?;
            let docs = chunk.iter().map(to_document::<T>).collect::<Result<Vec<_>>>()?;
            let ids = self.store.insert_many(collection, docs).await?;
            assigned.extend(chunk.iter().map(|r| r.legacy_id()).zip(ids));
            debug!(collection, chunk = chunk_no + 1, rows = chunk.len(), "Inserted chunk");
        }

        stats.inserted = assigned.len();
        info!(
            collection,
            found = stats.found,
            inserted = stats.inserted,
            skipped = stats.skipped,
            "Loaded collection"
        );
        Ok(LoadOutcome { stats, assigned })
    }

    /// Plan and execute in one step.
    pub async fn load<T: LegacyKeyed + Serialize>(
        &self,
        collection: &str,
        candidates: Vec<T>,
    ) -> Result<LoadOutcome> {
        let plan = self.plan(collection, candidates).await?;
        self.execute(collection, plan).await
    }

    async fn apply_in_chunks(&self, collection: &str, ops: Vec<UpdateOp>) -> Result<u64> {
        let mut modified = 0;
        for chunk in ops.chunks(self.chunk_size) {
            self.check_cancelled()?;
            modified += self.store.bulk_update(collection, chunk.to_vec()).await?;
        }
        Ok(modified)
    }

    /// Fill `ref_field` on records that carry `legacy_field` but no reference.
    ///
    /// Unresolvable legacy keys are left untouched and counted.
    pub async fn link_field(
        &self,
        collection: &str,
        legacy_field: &str,
        ref_field: &str,
        crosswalk: &Crosswalk,
    ) -> Result<LinkStats> {
        let pending = self
            .store
            .find(
                collection,
                &Filter::And(vec![
                    Filter::not_null(legacy_field),
                    Filter::is_null(ref_field),
                ]),
                Some(&[legacy_field]),
            )
            .await?;

        let mut stats = LinkStats {
            collection: collection.to_string(),
            field: ref_field.to_string(),
            found: pending.len(),
            ..Default::default()
        };

        let mut ops = Vec::new();
        for doc in &pending {
            let target = lookup(doc, legacy_field)
                .and_then(Value::as_i64)
                .and_then(|legacy| crosswalk.resolve(legacy));
            match (doc_id(doc), target) {
                (Some(id), Some(target)) => ops.push(UpdateOp::new(
                    Filter::eq(ID_FIELD, id),
                    Update::new().set(ref_field, target),
                )),
                _ => stats.not_found += 1,
            }
        }

        stats.linked = self.apply_in_chunks(collection, ops).await?;
        log_link(&stats);
        Ok(stats)
    }

    /// `legacyId` → stored appointment references.
    pub async fn appointment_refs(
        &self,
        appointments: &str,
    ) -> Result<HashMap<i64, AppointmentRefs>> {
        let docs = self
            .store
            .find(
                appointments,
                &Filter::exists(LEGACY_ID_FIELD),
                Some(&[LEGACY_ID_FIELD, "patient", "doctor"]),
            )
            .await?;

        let text = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_string);
        Ok(docs
            .iter()
            .filter_map(|d| {
                let legacy = d.get(LEGACY_ID_FIELD).and_then(Value::as_i64)?;
                let refs = AppointmentRefs {
                    id: doc_id(d)?.to_string(),
                    patient: text(d.get("patient")),
                    doctor: text(d.get("doctor")),
                };
                Some((legacy, refs))
            })
            .collect())
    }

    /// Copy appointment, patient and doctor references onto bills from
    /// their owning appointments. Bills never resolve references on their own.
    pub async fn link_bills(&self, bills: &str, appointments: &str) -> Result<LinkStats> {
        let pending = self
            .store
            .find(
                bills,
                &Filter::And(vec![
                    Filter::not_null(LEGACY_APPOINTMENT_FIELD),
                    Filter::Or(vec![
                        Filter::is_null("appointment"),
                        Filter::is_null("patient"),
                        Filter::is_null("doctor"),
                    ]),
                ]),
                Some(&[LEGACY_APPOINTMENT_FIELD, "appointment", "patient", "doctor"]),
            )
            .await?;

        let mut stats = LinkStats {
            collection: bills.to_string(),
            field: "appointment".to_string(),
            found: pending.len(),
            ..Default::default()
        };
        if pending.is_empty() {
            log_link(&stats);
            return Ok(stats);
        }

        let refs = self.appointment_refs(appointments).await?;
        let mut ops = Vec::new();
        for doc in &pending {
            let owner = doc
                .get(LEGACY_APPOINTMENT_FIELD)
                .and_then(Value::as_i64)
                .and_then(|legacy| refs.get(&legacy));
            let (Some(id), Some(owner)) = (doc_id(doc), owner) else {
                stats.not_found += 1;
                continue;
            };
            let update = bill_ref_update(
                doc.get("appointment"),
                doc.get("patient"),
                doc.get("doctor"),
                owner,
            );
            if update.is_empty() {
                stats.not_found += 1;
            } else {
                ops.push(UpdateOp::new(Filter::eq(ID_FIELD, id), update));
            }
        }

        stats.linked = self.apply_in_chunks(bills, ops).await?;
        log_link(&stats);
        Ok(stats)
    }
}

/// Fields of a bill that its owning appointment can fill.
fn bill_ref_update(
    appointment: Option<&Value>,
    patient: Option<&Value>,
    doctor: Option<&Value>,
    owner: &AppointmentRefs,
) -> Update {
    let is_null = |v: Option<&Value>| v.map_or(true, Value::is_null);
    let mut update = Update::new();
    if is_null(appointment) {
        update = update.set("appointment", owner.id.as_str());
    }
    if let (true, Some(p)) = (is_null(patient), &owner.patient) {
        update = update.set("patient", p.as_str());
    }
    if let (true, Some(d)) = (is_null(doctor), &owner.doctor) {
        update = update.set("doctor", d.as_str());
    }
    update
}

fn log_link(stats: &LinkStats) {
    if stats.not_found > 0 {
        warn!(
            collection = %stats.collection,
            field = %stats.field,
            found = stats.found,
            linked = stats.linked,
            not_found = stats.not_found,
            "Link step left references unresolved"
        );
    } else {
        info!(
            collection = %stats.collection,
            field = %stats.field,
            found = stats.found,
            linked = stats.linked,
            "Link step complete"
        );
    }
}
