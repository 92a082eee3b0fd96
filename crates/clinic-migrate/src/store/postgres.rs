//! PostgreSQL document store.
//!
//! Each collection is a table `doc_<collection>(seq, id, doc JSONB)`. All
//! values cross the wire as text and are cast server-side, so no JSON
//! support is needed from the driver.

use std::collections::HashSet;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Config as PgConfig, NoTls};
use tracing::{debug, info};
use uuid::Uuid;

use super::{doc_id, project, Document, DocumentStore, Filter, UpdateOp, ID_FIELD};
use crate::error::{MigrateError, Result};

const DEFAULT_POOL_SIZE: usize = 4;

/// PostgreSQL identifier length limit.
const MAX_IDENTIFIER_LENGTH: usize = 63;

const TABLE_PREFIX: &str = "doc_";

/// Document store backed by JSONB tables.
pub struct PgDocumentStore {
    pool: Pool,
    ensured: Mutex<HashSet<String>>,
}

impl PgDocumentStore {
    /// Connect using a `postgres://` URL; `database` overrides its dbname.
    pub async fn connect(url: &str, database: &str) -> Result<Self> {
        let mut pg_config: PgConfig = url
            .parse()
            .map_err(|e| MigrateError::Config(format!("Invalid PostgreSQL URL: {}", e)))?;
        pg_config.dbname(database);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(DEFAULT_POOL_SIZE)
            .build()
            .map_err(|e| MigrateError::store(format!("Failed to create pool: {}", e), "connect"))?;

        let store = Self {
            pool,
            ensured: Mutex::new(HashSet::new()),
        };
        store.ping().await?;
        info!("Connected to PostgreSQL document store: {}", database);
        Ok(store)
    }

    async fn client(&self) -> Result<Object> {
        self.pool.get().await.map_err(|e| {
            MigrateError::store(format!("Failed to get connection: {}", e), "pool")
        })
    }

    /// Quoted table name for a collection, creating the table on first use.
    async fn table(&self, collection: &str) -> Result<String> {
        let raw = format!("{}{}", TABLE_PREFIX, collection);
        let table = quote_pg(&raw)?;

        let mut ensured = self.ensured.lock().await;
        if ensured.contains(collection) {
            return Ok(table);
        }

        let index = quote_pg(&format!("{}_legacy_id_idx", raw))?;
        let client = self.client().await?;
        client
            .batch_execute(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    seq BIGSERIAL,
                    id TEXT PRIMARY KEY,
                    doc JSONB NOT NULL
                );
                CREATE INDEX IF NOT EXISTS {index} ON {table} ((doc -> 'legacyId'));"
            ))
            .await?;
        debug!("Ensured document table {}", table);

        ensured.insert(collection.to_string());
        Ok(table)
    }
}

/// Quote a PostgreSQL identifier after validating it.
fn quote_pg(name: &str) -> Result<String> {
    if name.is_empty() || name.contains('\0') || name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "Invalid collection identifier: {:?}",
            name
        )));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

#[derive(Debug, Clone, PartialEq)]
enum Param {
    Text(String),
    TextArray(Vec<String>),
}

/// Positional parameters for one statement.
#[derive(Debug, Default)]
struct SqlParams {
    params: Vec<Param>,
}

impl SqlParams {
    fn text(&mut self, value: String) -> String {
        self.params.push(Param::Text(value));
        format!("${}::text", self.params.len())
    }

    fn array(&mut self, values: Vec<String>) -> String {
        self.params.push(Param::TextArray(values));
        format!("${}::text[]", self.params.len())
    }

    fn jsonb(&mut self, value: &Value) -> String {
        format!("{}::jsonb", self.text(value.to_string()))
    }

    fn path(&mut self, field: &str) -> String {
        let parts = field.split('.').map(str::to_string).collect();
        format!("(doc #> {})", self.array(parts))
    }

    fn refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|p| match p {
                Param::Text(s) => s as &(dyn ToSql + Sync),
                Param::TextArray(v) => v as &(dyn ToSql + Sync),
            })
            .collect()
    }
}

/// Render a filter as a SQL boolean expression over the `doc` column.
fn filter_sql(filter: &Filter, params: &mut SqlParams) -> String {
    match filter {
        Filter::All => "TRUE".to_string(),
        Filter::Eq(field, value) => {
            let path = params.path(field);
            format!("{} = {}", path, params.jsonb(value))
        }
        Filter::Ne(field, value) => {
            let path = params.path(field);
            format!("{} IS DISTINCT FROM {}", path, params.jsonb(value))
        }
        Filter::In(_, values) if values.is_empty() => "FALSE".to_string(),
        Filter::In(field, values) => {
            let path = params.path(field);
            let list = params.array(values.iter().map(Value::to_string).collect());
            format!("{} = ANY({}::jsonb[])", path, list)
        }
        Filter::Exists(field, true) => format!("{} IS NOT NULL", params.path(field)),
        Filter::Exists(field, false) => format!("{} IS NULL", params.path(field)),
        Filter::IsNull(field) => format!(
            "COALESCE({}, 'null'::jsonb) = 'null'::jsonb",
            params.path(field)
        ),
        Filter::NotNull(field) => format!(
            "COALESCE({}, 'null'::jsonb) <> 'null'::jsonb",
            params.path(field)
        ),
        Filter::And(filters) if filters.is_empty() => "TRUE".to_string(),
        Filter::Or(filters) if filters.is_empty() => "FALSE".to_string(),
        Filter::And(filters) => join_filters(filters, " AND ", params),
        Filter::Or(filters) => join_filters(filters, " OR ", params),
    }
}

fn join_filters(filters: &[Filter], op: &str, params: &mut SqlParams) -> String {
    let parts: Vec<String> = filters.iter().map(|f| filter_sql(f, params)).collect();
    format!("({})", parts.join(op))
}

fn parse_doc(text: &str) -> Result<Document> {
    match serde_json::from_str(text)? {
        Value::Object(map) => Ok(map),
        _ => Err(MigrateError::store("stored document is not an object", "find")),
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        projection: Option<&[&str]>,
    ) -> Result<Vec<Document>> {
        let table = self.table(collection).await?;
        let mut params = SqlParams::default();
        let sql = format!(
            "SELECT doc::text FROM {} WHERE {} ORDER BY seq",
            table,
            filter_sql(filter, &mut params)
        );
        let client = self.client().await?;
        let rows = client.query(&sql, &params.refs()).await?;

        rows.iter()
            .map(|row| {
                let doc = parse_doc(&row.get::<_, String>(0))?;
                Ok(match projection {
                    Some(fields) => project(doc, fields),
                    None => doc,
                })
            })
            .collect()
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<Vec<String>> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        let table = self.table(collection).await?;

        let mut ids = Vec::with_capacity(docs.len());
        let mut bodies = Vec::with_capacity(docs.len());
        for mut doc in docs {
            let id = match doc_id(&doc) {
                Some(id) => id.to_string(),
                None => {
                    let id = Uuid::new_v4().to_string();
                    doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                    id
                }
            };
            bodies.push(Value::Object(doc).to_string());
            ids.push(id);
        }

        let sql = format!(
            "INSERT INTO {} (id, doc) SELECT * FROM unnest($1::text[], $2::text[]::jsonb[])",
            table
        );
        let client = self.client().await?;
        client.execute(&sql, &[&ids, &bodies]).await?;
        Ok(ids)
    }

    async fn bulk_update(&self, collection: &str, ops: Vec<UpdateOp>) -> Result<u64> {
        let table = self.table(collection).await?;
        let mut client = self.client().await?;
        let tx = client.transaction().await?;

        let mut modified = 0;
        for op in ops.iter().filter(|op| !op.update.is_empty()) {
            let patch = Value::Object(op.update.set.clone());
            let mut params = SqlParams::default();
            let set_patch = params.jsonb(&patch);
            let set_unset = params.array(op.update.unset.clone());
            let matches = filter_sql(&op.filter, &mut params);
            // `@>` is exact for scalar values, which is all the passes write.
            let check_patch = params.jsonb(&patch);
            let check_unset = params.array(op.update.unset.clone());
            let sql = format!(
                "UPDATE {table} SET doc = (doc || {set_patch}) - {set_unset}
                 WHERE {matches} AND (NOT doc @> {check_patch} OR doc ?| {check_unset})"
            );
            modified += tx.execute(&sql, &params.refs()).await?;
        }

        tx.commit().await?;
        Ok(modified)
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let table = self.table(collection).await?;
        let mut params = SqlParams::default();
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            table,
            filter_sql(filter, &mut params)
        );
        let client = self.client().await?;
        Ok(client.execute(&sql, &params.refs()).await?)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let table = self.table(collection).await?;
        let mut params = SqlParams::default();
        let sql = format!(
            "SELECT count(*) FROM {} WHERE {}",
            table,
            filter_sql(filter, &mut params)
        );
        let client = self.client().await?;
        let row = client.query_one(&sql, &params.refs()).await?;
        let n: i64 = row.get(0);
        Ok(n.max(0) as u64)
    }

    async fn ping(&self) -> Result<()> {
        let client = self.client().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    fn store_type(&self) -> &str {
        "postgres"
    }

    async fn close(&self) {
        self.pool.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_quote_pg() {
        assert_eq!(quote_pg("doc_patients").unwrap(), "\"doc_patients\"");
        assert_eq!(quote_pg("doc_a\"b").unwrap(), "\"doc_a\"\"b\"");
        assert!(quote_pg("").is_err());
        assert!(quote_pg(&"x".repeat(64)).is_err());
    }

    #[test]
    fn test_filter_sql_eq_and_null() {
        let mut params = SqlParams::default();
        let sql = filter_sql(
            &Filter::And(vec![
                Filter::eq("legacyId", 7),
                Filter::is_null("patient"),
            ]),
            &mut params,
        );
        assert_eq!(
            sql,
            "((doc #> $1::text[]) = $2::text::jsonb AND \
             COALESCE((doc #> $3::text[]), 'null'::jsonb) = 'null'::jsonb)"
        );
        assert_eq!(params.params[0], Param::TextArray(vec!["legacyId".into()]));
        assert_eq!(params.params[1], Param::Text("7".into()));
        assert_eq!(params.refs().len(), 3);
    }

    #[test]
    fn test_filter_sql_in_and_nested_path() {
        let mut params = SqlParams::default();
        let sql = filter_sql(&Filter::is_in("address.city", [json!("Pune")]), &mut params);
        assert_eq!(sql, "(doc #> $1::text[]) = ANY($2::text[]::jsonb[])");
        assert_eq!(
            params.params[0],
            Param::TextArray(vec!["address".into(), "city".into()])
        );
        assert_eq!(params.params[1], Param::TextArray(vec!["\"Pune\"".into()]));
    }

    #[test]
    fn test_filter_sql_empty_combinators() {
        let mut params = SqlParams::default();
        assert_eq!(filter_sql(&Filter::Or(vec![]), &mut params), "FALSE");
        assert_eq!(filter_sql(&Filter::And(vec![]), &mut params), "TRUE");
        assert_eq!(filter_sql(&Filter::In("f".into(), vec![]), &mut params), "FALSE");
        assert!(params.params.is_empty());
    }
}
