//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::{MigrateError, Result};
use sha2::{Digest, Sha256};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    ///
    /// An empty document yields the defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = if yaml.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Compute a SHA256 hash of the configuration for the run report.
    pub fn hash(&self) -> String {
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl StoreConfig {
    /// Read store settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read store settings through an arbitrary variable lookup.
    ///
    /// A missing or blank connection string is a configuration error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup(STORE_URL_ENV)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| MigrateError::Config(format!("{} is required", STORE_URL_ENV)))?;

        let database = lookup(DATABASE_ENV)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "clinic".to_string());

        let store = Self { url, database };
        store.validate()?;
        Ok(store)
    }

    pub fn validate(&self) -> Result<()> {
        validation::validate_store(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_from_yaml_overrides() {
        let yaml = r#"
migration:
  chunk_size: 250
tables:
  patients: patient_master
display_id:
  prefix: CLN
doctors:
  policy: substring
  historical:
    - legacy_id: 3
      name: Dr. Ankita Sharma
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.migration.get_chunk_size(), 250);
        assert_eq!(config.tables.patients, "patient_master");
        assert_eq!(config.tables.appointments, "appointments");
        assert_eq!(config.display_id.prefix, "CLN");
        assert_eq!(config.display_id.width, 6);
        assert_eq!(config.doctors.policy, DoctorMatchPolicy::Substring);
        assert_eq!(config.doctors.historical.len(), 1);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = Config::from_yaml("").unwrap();
        assert_eq!(config.migration.get_chunk_size(), DEFAULT_CHUNK_SIZE);
        assert_eq!(config.doctors.policy, DoctorMatchPolicy::Exact);
    }

    #[test]
    fn test_invalid_yaml_value_rejected() {
        assert!(Config::from_yaml("migration:\n  chunk_size: 0\n").is_err());
    }

    #[test]
    fn test_hash_changes_with_config() {
        let a = Config::default();
        let mut b = Config::default();
        b.migration.chunk_size = Some(10);
        assert_eq!(a.hash(), Config::default().hash());
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_store_from_lookup() {
        let vars: HashMap<&str, &str> = [
            (STORE_URL_ENV, "memory://"),
            (DATABASE_ENV, "clinic_prod"),
        ]
        .into_iter()
        .collect();
        let store = StoreConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(store.url, "memory://");
        assert_eq!(store.database, "clinic_prod");
    }

    #[test]
    fn test_store_database_defaults() {
        let store = StoreConfig::from_lookup(|k| {
            (k == STORE_URL_ENV).then(|| "memory://".to_string())
        })
        .unwrap();
        assert_eq!(store.database, "clinic");
    }

    #[test]
    fn test_missing_store_url_is_config_error() {
        let err = StoreConfig::from_lookup(|_| None).unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
    }
}
