//! Configuration validation.

use super::{Config, StoreConfig};
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if let Some(0) = config.migration.chunk_size {
        return Err(MigrateError::Config(
            "migration.chunk_size must be at least 1".into(),
        ));
    }

    let tables = [
        ("tables.patients", &config.tables.patients),
        ("tables.appointments", &config.tables.appointments),
        ("tables.charges", &config.tables.charges),
        ("tables.doctors", &config.tables.doctors),
    ];
    for (key, value) in tables {
        if value.trim().is_empty() {
            return Err(MigrateError::Config(format!("{key} must not be empty")));
        }
    }

    let collections = [
        ("collections.patients", &config.collections.patients),
        ("collections.appointments", &config.collections.appointments),
        ("collections.bills", &config.collections.bills),
        ("collections.service_items", &config.collections.service_items),
        ("collections.doctors", &config.collections.doctors),
    ];
    for (key, value) in collections {
        if value.trim().is_empty() {
            return Err(MigrateError::Config(format!("{key} must not be empty")));
        }
    }

    if config.display_id.prefix.is_empty() {
        return Err(MigrateError::Config(
            "display_id.prefix must not be empty".into(),
        ));
    }
    if config.display_id.prefix.ends_with(|c: char| c.is_ascii_digit()) {
        return Err(MigrateError::Config(
            "display_id.prefix must not end with a digit".into(),
        ));
    }
    if config.display_id.width == 0 {
        return Err(MigrateError::Config(
            "display_id.width must be at least 1".into(),
        ));
    }

    Ok(())
}

/// Validate store settings read from the environment.
pub fn validate_store(store: &StoreConfig) -> Result<()> {
    if store.url.trim().is_empty() {
        return Err(MigrateError::Config(format!(
            "{} is required",
            super::STORE_URL_ENV
        )));
    }
    if store.database.trim().is_empty() {
        return Err(MigrateError::Config(format!(
            "{} must not be empty",
            super::DATABASE_ENV
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let mut config = Config::default();
        config.migration.chunk_size = Some(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_empty_table_name_rejected() {
        let mut config = Config::default();
        config.tables.charges = "  ".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_prefix_ending_in_digit_rejected() {
        let mut config = Config::default();
        config.display_id.prefix = "P1".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_width_rejected() {
        let mut config = Config::default();
        config.display_id.width = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_store_debug_redacts_password() {
        let store = StoreConfig {
            url: "postgres://clinic:super_secret_password_123@db:5432/legacy".to_string(),
            database: "clinic".to_string(),
        };
        let debug_output = format!("{:?}", store);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_123"));
    }

    #[test]
    fn test_empty_store_url_rejected() {
        let store = StoreConfig {
            url: String::new(),
            database: "clinic".to_string(),
        };
        assert!(validate_store(&store).is_err());
    }
}
