//! Error types for the migration library.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for migration operations.
///
/// Only environment, connectivity and operator-refusal problems are errors.
/// Malformed rows and unparseable fields are counted, never raised.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (missing environment, invalid YAML values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The legacy dump file does not exist.
    #[error("Legacy dump not found: {}", .0.display())]
    DumpNotFound(PathBuf),

    /// Document store rejected an operation or is unreachable.
    #[error("Store error: {message}\n  Context: {context}")]
    Store { message: String, context: String },

    /// PostgreSQL document store error.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// A reconciliation pass refused to run.
    #[error("Reconciliation pass {pass} refused: {message}")]
    Reconcile { pass: String, message: String },

    /// Doctor merge was requested for records that do not match.
    #[error("Doctor merge {duplicate} -> {survivor} not confirmed: {reason}")]
    MergeNotConfirmed {
        duplicate: String,
        survivor: String,
        reason: String,
    },

    /// Display id normalization would produce duplicate ids.
    #[error("Display id normalization would collide: {}", .0.join(", "))]
    IdCollision(Vec<String>),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Run was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

pub const EXIT_CONFIG_ERROR: u8 = 1;
pub const EXIT_STORE_ERROR: u8 = 2;
pub const EXIT_RECONCILE_REFUSED: u8 = 3;
pub const EXIT_DUMP_NOT_FOUND: u8 = 4;
pub const EXIT_IO_ERROR: u8 = 7;
pub const EXIT_CANCELLED: u8 = 130;

impl MigrateError {
    /// Create a Store error with context about where it occurred
    pub fn store(message: impl Into<String>, context: impl Into<String>) -> Self {
        MigrateError::Store {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create a Reconcile error
    pub fn reconcile(pass: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Reconcile {
            pass: pass.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this error category.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => EXIT_CONFIG_ERROR,
            MigrateError::Store { .. } | MigrateError::Postgres(_) => EXIT_STORE_ERROR,
            MigrateError::Reconcile { .. }
            | MigrateError::MergeNotConfirmed { .. }
            | MigrateError::IdCollision(_) => EXIT_RECONCILE_REFUSED,
            MigrateError::DumpNotFound(_) => EXIT_DUMP_NOT_FOUND,
            MigrateError::Io(_) | MigrateError::Json(_) => EXIT_IO_ERROR,
            MigrateError::Cancelled => EXIT_CANCELLED,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
