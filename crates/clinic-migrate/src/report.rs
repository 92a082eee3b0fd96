//! Run report.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crosswalk::DoctorMatchReport;
use crate::dump::ParseStats;
use crate::error::{MigrateError, Result};
use crate::loader::{LinkStats, LoadStats};

/// Counts produced by the transform phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformSummary {
    pub patients: usize,
    pub appointments: usize,
    pub bills: usize,
    pub service_items: usize,

    /// Charges collapsed by (name, category).
    pub duplicate_service_items: usize,

    /// Charges dropped for lacking a name.
    pub charges_without_name: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    DryRun,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Unique run identifier.
    pub run_id: String,

    pub status: RunStatus,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,

    /// SHA-256 of the effective configuration.
    pub config_hash: String,

    pub dump: String,
    pub store: String,

    /// Per legacy table tokenizer counts.
    pub parse: BTreeMap<String, ParseStats>,

    pub transform: TransformSummary,

    /// Per collection insert/skip counts, in load order.
    pub loads: Vec<LoadStats>,

    /// Link step counts; empty for dry runs.
    pub links: Vec<LinkStats>,

    pub doctors: DoctorMatchReport,
}

impl MigrationReport {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report as JSON (temp file, then rename).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = self.to_json()?;
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// Load a previously saved report.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MigrateError::Config(format!("Cannot read report {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn total_inserted(&self) -> usize {
        self.loads.iter().map(|l| l.inserted).sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.loads.iter().map(|l| l.skipped).sum()
    }

    pub fn total_not_found(&self) -> usize {
        self.links.iter().map(|l| l.not_found).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> MigrationReport {
        let now = Utc::now();
        MigrationReport {
            run_id: "r1".into(),
            status: RunStatus::Completed,
            started_at: now,
            completed_at: now,
            duration_seconds: 0.5,
            config_hash: "abc".into(),
            dump: "dump.sql".into(),
            store: "memory".into(),
            parse: BTreeMap::new(),
            transform: TransformSummary::default(),
            loads: vec![
                LoadStats {
                    collection: "patients".into(),
                    found: 3,
                    inserted: 2,
                    skipped: 1,
                    duplicates: 0,
                },
                LoadStats {
                    collection: "bills".into(),
                    found: 1,
                    inserted: 1,
                    skipped: 0,
                    duplicates: 0,
                },
            ],
            links: vec![],
            doctors: DoctorMatchReport::default(),
        }
    }

    #[test]
    fn test_totals_and_json() {
        let report = report();
        assert_eq!(report.total_inserted(), 3);
        assert_eq!(report.total_skipped(), 1);
        let json = report.to_json().unwrap();
        assert!(json.contains("\"status\": \"completed\""));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        report().save(&path).unwrap();
        let loaded = MigrationReport::load(&path).unwrap();
        assert_eq!(loaded.run_id, "r1");
        assert_eq!(loaded.loads.len(), 2);
        assert!(!path.with_extension("tmp").exists());
    }
}
