//! # clinic-migrate
//!
//! Migration of a legacy clinic SQL dump into a document store.
//!
//! The pipeline reads the `INSERT` statements of a text dump, turns each
//! legacy row into a typed record, transforms it into the target shape and
//! loads it idempotently, keyed by the legacy primary key. A link step fills
//! cross-collection references once their targets exist, and standalone
//! reconciliation passes repair data that was migrated in earlier runs.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use clinic_migrate::{Config, Migrator, StoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> clinic_migrate::Result<()> {
//!     let store = StoreConfig::from_env()?;
//!     let config = Config::load("config.yaml")?;
//!     let migrator = Migrator::connect(config, &store).await?;
//!     let report = migrator.run(Path::new("legacy.sql"), false).await?;
//!     println!("Inserted {} records", report.total_inserted());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod crosswalk;
pub mod dump;
pub mod error;
pub mod loader;
pub mod model;
pub mod orchestrator;
pub mod reconcile;
pub mod report;
pub mod store;
pub mod transform;

// Re-exports for convenient access
pub use config::{Config, StoreConfig};
pub use crosswalk::{Crosswalk, DoctorCrosswalk};
pub use dump::{DumpReader, LegacyValue, ParseStats};
pub use error::{MigrateError, Result};
pub use loader::{LinkStats, LoadStats, Loader};
pub use orchestrator::{HealthCheckResult, Migrator, ParsedDump};
pub use reconcile::{run_pass, PassReport, ReconcilePass};
pub use report::{MigrationReport, RunStatus};
pub use store::{DocumentStore, MemoryStore, PgDocumentStore};
