//! In-process document store, optionally snapshotted to a JSON file.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{doc_id, project, Document, DocumentStore, Filter, UpdateOp, ID_FIELD};
use crate::error::{MigrateError, Result};

type Collections = BTreeMap<String, Vec<Document>>;

/// Document store held in memory.
///
/// When opened with a path, the whole store is rewritten after every
/// mutating call (temp file, then rename) so a crash never leaves a torn
/// snapshot.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<Collections>,
    path: Option<PathBuf>,
}

impl MemoryStore {
    /// Ephemeral store.
    pub fn new() -> Self {
        Self::default()
    }

    /// File-backed store. Loads the snapshot if it exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let collections = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Collections::new()
        };
        debug!(path = %path.display(), "Opened file-backed memory store");
        Ok(Self {
            collections: RwLock::new(collections),
            path: Some(path),
        })
    }

    /// Snapshot path, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn persist(&self, collections: &Collections) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content = serde_json::to_string(collections)?;
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, path)?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        projection: Option<&[&str]>,
    ) -> Result<Vec<Document>> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .iter()
            .filter(|d| filter.matches(d))
            .map(|d| match projection {
                Some(fields) => project(d.clone(), fields),
                None => d.clone(),
            })
            .collect())
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<Vec<String>> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        let mut collections = self.collections.write().await;
        let target = collections.entry(collection.to_string()).or_default();

        let mut seen: HashSet<String> = target
            .iter()
            .filter_map(doc_id)
            .map(str::to_string)
            .collect();
        let mut ids = Vec::with_capacity(docs.len());
        let mut prepared = Vec::with_capacity(docs.len());
        for mut doc in docs {
            let id = match doc_id(&doc) {
                Some(id) => id.to_string(),
                None => {
                    let id = Uuid::new_v4().to_string();
                    doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                    id
                }
            };
            if !seen.insert(id.clone()) {
                return Err(MigrateError::store(
                    format!("duplicate _id {}", id),
                    format!("insert_many({})", collection),
                ));
            }
            ids.push(id);
            prepared.push(doc);
        }
        target.extend(prepared);

        self.persist(&collections)?;
        Ok(ids)
    }

    async fn bulk_update(&self, collection: &str, ops: Vec<UpdateOp>) -> Result<u64> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let mut modified = 0;
        for op in &ops {
            for doc in docs.iter_mut().filter(|d| op.filter.matches(d)) {
                if op.update.apply(doc) {
                    modified += 1;
                }
            }
        }

        if modified > 0 {
            self.persist(&collections)?;
        }
        Ok(modified)
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|d| !filter.matches(d));
        let deleted = (before - docs.len()) as u64;

        if deleted > 0 {
            self.persist(&collections)?;
        }
        Ok(deleted)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().filter(|d| filter.matches(d)).count() as u64)
            .unwrap_or(0))
    }

    async fn ping(&self) -> Result<()> {
        if let Some(path) = &self.path {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            if !dir.is_dir() {
                return Err(MigrateError::store(
                    format!("snapshot directory {} is missing", dir.display()),
                    "ping",
                ));
            }
        }
        Ok(())
    }

    fn store_type(&self) -> &str {
        if self.path.is_some() {
            "file"
        } else {
            "memory"
        }
    }
}
