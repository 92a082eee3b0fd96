//! Legacy id to target id crosswalks.
//!
//! A crosswalk is rebuilt every run from records already in the store plus
//! ids assigned earlier in the same run. Lookups never fabricate records:
//! an unknown legacy id resolves to `None` and the reference stays null.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{DoctorMatchConfig, DoctorMatchPolicy};
use crate::dump::LegacyDoctor;
use crate::error::Result;
use crate::model::Doctor;
use crate::store::{doc_id, from_document, DocumentStore, Filter};
use crate::transform::normalize::clean_name;

/// Field carrying the legacy id on every migrated record.
pub const LEGACY_ID_FIELD: &str = "legacyId";

/// legacyId → `_id` for one entity type.
#[derive(Debug, Clone, Default)]
pub struct Crosswalk {
    entity: String,
    map: HashMap<i64, String>,
}

impl Crosswalk {
    pub fn new(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            map: HashMap::new(),
        }
    }

    /// Build from every record in `collection` that carries a legacy id.
    pub async fn from_store(store: &dyn DocumentStore, collection: &str) -> Result<Self> {
        let docs = store
            .find(
                collection,
                &Filter::exists(LEGACY_ID_FIELD),
                Some(&[LEGACY_ID_FIELD]),
            )
            .await?;

        let mut crosswalk = Self::new(collection);
        for doc in &docs {
            let legacy = doc.get(LEGACY_ID_FIELD).and_then(Value::as_i64);
            if let (Some(legacy), Some(id)) = (legacy, doc_id(doc)) {
                crosswalk.insert(legacy, id);
            }
        }
        debug!(entity = collection, entries = crosswalk.len(), "Built crosswalk from store");
        Ok(crosswalk)
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Record an id assigned during this run. The first mapping wins.
    pub fn insert(&mut self, legacy_id: i64, id: &str) {
        self.map
            .entry(legacy_id)
            .or_insert_with(|| id.to_string());
    }

    pub fn extend<'a, I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = &'a (i64, String)>,
    {
        for (legacy, id) in entries {
            self.insert(*legacy, id);
        }
    }

    pub fn resolve(&self, legacy_id: i64) -> Option<&str> {
        self.map.get(&legacy_id).map(String::as_str)
    }

    pub fn contains(&self, legacy_id: i64) -> bool {
        self.map.contains_key(&legacy_id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// A legacy doctor whose name matched more than one existing doctor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguousDoctor {
    pub legacy_id: i64,
    pub name: String,
    pub candidates: Vec<String>,
}

/// Outcome of doctor matching, surfaced in the run report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorMatchReport {
    pub resolved: usize,
    pub unresolved: Vec<i64>,
    pub ambiguous: Vec<AmbiguousDoctor>,
}

/// Doctor crosswalk plus the matching diagnostics.
#[derive(Debug, Clone)]
pub struct DoctorCrosswalk {
    pub crosswalk: Crosswalk,
    pub report: DoctorMatchReport,
}

impl DoctorCrosswalk {
    pub fn resolve(&self, legacy_id: i64) -> Option<&str> {
        self.crosswalk.resolve(legacy_id)
    }
}

/// Load the doctors already present in the target.
pub async fn existing_doctors(store: &dyn DocumentStore, collection: &str) -> Result<Vec<Doctor>> {
    let docs = store.find(collection, &Filter::All, None).await?;
    let mut doctors = Vec::with_capacity(docs.len());
    for doc in docs {
        match from_document::<Doctor>(doc) {
            Ok(doctor) => doctors.push(doctor),
            Err(e) => warn!("Skipping unreadable doctor record: {}", e),
        }
    }
    Ok(doctors)
}

/// Name key used for matching: honorific-stripped and lowercased.
pub fn doctor_name_key(name: &str) -> String {
    clean_name(name).to_lowercase()
}

/// Build the doctor crosswalk.
///
/// Resolution order per legacy id:
/// 1. an existing doctor already carrying that `legacyId`;
/// 2. the legacy name (from the dump's doctor table, else the historical
///    seed table) matched against existing doctors under `config.policy`.
///
/// More than one candidate is ambiguous and stays unresolved.
pub fn build_doctor_crosswalk(
    existing: &[Doctor],
    legacy_doctors: &[LegacyDoctor],
    config: &DoctorMatchConfig,
) -> DoctorCrosswalk {
    let mut crosswalk = Crosswalk::new("doctors");
    let mut report = DoctorMatchReport::default();

    for doctor in existing {
        if let Some(legacy) = doctor.legacy_id {
            crosswalk.insert(legacy, &doctor.id);
        }
    }

    let mut names: HashMap<i64, String> = config
        .historical
        .iter()
        .map(|h| (h.legacy_id, h.name.clone()))
        .collect();
    for doctor in legacy_doctors {
        if let Some(name) = &doctor.name {
            names.insert(doctor.id, name.clone());
        }
    }

    let legacy_ids: BTreeSet<i64> = names.keys().copied().collect();
    for legacy_id in legacy_ids {
        if crosswalk.contains(legacy_id) {
            report.resolved += 1;
            continue;
        }
        let Some(name) = names.get(&legacy_id) else {
            continue;
        };
        let candidates = match_doctor(name, existing, config.policy);
        match candidates.as_slice() {
            [] => report.unresolved.push(legacy_id),
            [only] => {
                crosswalk.insert(legacy_id, &only.id);
                report.resolved += 1;
            }
            many => {
                warn!(
                    legacy_id,
                    name = %name,
                    candidates = many.len(),
                    "Ambiguous doctor match left unresolved"
                );
                report.ambiguous.push(AmbiguousDoctor {
                    legacy_id,
                    name: name.clone(),
                    candidates: many.iter().map(|d| d.id.clone()).collect(),
                });
            }
        }
    }

    info!(
        resolved = report.resolved,
        unresolved = report.unresolved.len(),
        ambiguous = report.ambiguous.len(),
        "Built doctor crosswalk"
    );
    DoctorCrosswalk { crosswalk, report }
}

/// Existing doctors whose name matches `name` under `policy`.
pub fn match_doctor<'a>(
    name: &str,
    existing: &'a [Doctor],
    policy: DoctorMatchPolicy,
) -> Vec<&'a Doctor> {
    let key = doctor_name_key(name);
    if key.is_empty() {
        return Vec::new();
    }
    existing
        .iter()
        .filter(|d| {
            let other = doctor_name_key(&d.name);
            match policy {
                DoctorMatchPolicy::Exact => other == key,
                DoctorMatchPolicy::Substring => {
                    !other.is_empty() && (other.contains(&key) || key.contains(&other))
                }
            }
        })
        .collect()
}
