//! Document store abstraction.
//!
//! The pipeline only needs five operations from its target: `find`,
//! `insert_many`, `bulk_update`, `delete_many` and `count`. Any backend that
//! implements [`DocumentStore`] can host a migration:
//!
//! - **Memory**: [`MemoryStore`], optionally snapshotted to a JSON file.
//! - **PostgreSQL**: [`PgDocumentStore`], one JSONB table per collection.
//!
//! No lock or transaction spans more than one call; each call is atomic on
//! its own and nothing more is assumed.

mod filter;
mod memory;
mod postgres;

pub use filter::{lookup, Filter, Update, UpdateOp};
pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::config::{redact_url, StoreConfig};
use crate::error::{MigrateError, Result};

/// A stored record: a JSON object with a string `_id`.
pub type Document = serde_json::Map<String, Value>;

/// Primary key field assigned by the store.
pub const ID_FIELD: &str = "_id";

/// Persistence operations the pipeline depends on.
///
/// Implementations must be `Send + Sync`; the orchestrator holds them as
/// `Arc<dyn DocumentStore>`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Documents matching `filter`, in insertion order.
    ///
    /// With a projection only the listed fields (plus `_id`) are returned.
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        projection: Option<&[&str]>,
    ) -> Result<Vec<Document>>;

    /// Insert documents, assigning `_id` where absent. Returns the ids in
    /// input order.
    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<Vec<String>>;

    /// Apply every update to all documents matching its filter.
    ///
    /// Returns the number of documents whose content actually changed.
    async fn bulk_update(&self, collection: &str, ops: Vec<UpdateOp>) -> Result<u64>;

    /// Delete matching documents, returning how many were removed.
    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64>;

    /// Number of matching documents.
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64>;

    /// Verify the store is reachable.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    /// Backend name for logs and reports.
    fn store_type(&self) -> &str;

    /// Release connections.
    async fn close(&self) {}
}

/// Open the store named by `config.url`.
///
/// `memory://` is ephemeral, `file://<dir>` snapshots to
/// `<dir>/<database>.json`, `postgres://` uses JSONB tables.
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn DocumentStore>> {
    let url = config.url.trim();
    let store: Arc<dyn DocumentStore> = if url.starts_with("memory://") {
        Arc::new(MemoryStore::new())
    } else if let Some(dir) = url.strip_prefix("file://") {
        let path = std::path::Path::new(dir).join(format!("{}.json", config.database));
        Arc::new(MemoryStore::open(path)?)
    } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        Arc::new(PgDocumentStore::connect(url, &config.database).await?)
    } else {
        return Err(MigrateError::Config(format!(
            "Unsupported store URL scheme: {}",
            redact_url(url)
        )));
    };
    info!(
        store = store.store_type(),
        database = %config.database,
        "Connected to document store"
    );
    Ok(store)
}

/// Serialize a record into a document.
pub fn to_document<T: Serialize>(record: &T) -> Result<Document> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => Err(MigrateError::store(
            format!("expected a JSON object, got {}", other),
            "to_document",
        )),
    }
}

/// Deserialize a document into a record.
pub fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

/// The document's `_id`, if it has a string one.
pub fn doc_id(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

/// Keep only `fields` (and `_id`).
pub fn project(doc: Document, fields: &[&str]) -> Document {
    doc.into_iter()
        .filter(|(k, _)| k == ID_FIELD || fields.contains(&k.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_project_keeps_id() {
        let doc = json!({"_id": "a", "legacyId": 1, "name": "x"});
        let Value::Object(doc) = doc else { unreachable!() };
        let projected = project(doc, &["legacyId"]);
        assert_eq!(projected.len(), 2);
        assert!(projected.contains_key("_id"));
        assert!(!projected.contains_key("name"));
    }

    #[test]
    fn test_to_document_rejects_scalars() {
        assert!(to_document(&5).is_err());
        let doc = to_document(&json!({"a": 1})).unwrap();
        assert_eq!(doc["a"], 1);
    }

    #[tokio::test]
    async fn test_connect_rejects_unknown_scheme() {
        let config = StoreConfig {
            url: "mongodb://user:pw@host".into(),
            database: "clinic".into(),
        };
        let err = connect(&config).await.err().unwrap();
        assert!(matches!(err, MigrateError::Config(_)));
        assert!(!err.to_string().contains("pw"));
    }

    #[tokio::test]
    async fn test_connect_memory() {
        let config = StoreConfig {
            url: "memory://".into(),
            database: "clinic".into(),
        };
        let store = connect(&config).await.unwrap();
        assert_eq!(store.store_type(), "memory");
    }
}
