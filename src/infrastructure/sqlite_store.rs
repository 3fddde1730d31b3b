// SqliteStore - SQLite-backed DocumentStore via sqlx
// One `documents` table keyed by (collection, id), fields stored as JSON
// text. Per-document update atomicity comes from running the read-modify-
// write inside a transaction. No change-stream capability.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::error::{AppError, AppResult};
use crate::infrastructure::document_store::{
    sort_documents, Document, DocumentStore, FieldDelta, Fields, Filter, OrderBy,
};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to an in-memory database (tests, throwaway demos).
    pub async fn new_in_memory() -> AppResult<Self> {
        Self::connect("sqlite::memory:").await
    }

    /// Connect to a database file, creating it when absent.
    pub async fn open(path: &str) -> AppResult<Self> {
        Self::connect(&format!("sqlite://{}?mode=rwc", path)).await
    }

    async fn connect(url: &str) -> AppResult<Self> {
        // One connection: in-memory databases are per-connection, and file
        // writes go through SQLite's single-writer lock anyway.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .map_err(|e| AppError::StoreUnavailable(format!("Failed to connect to SQLite: {}", e)))?;
        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    async fn initialize(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                fields TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::StoreUnavailable(format!("Failed to create documents table: {}", e))
        })?;
        Ok(())
    }

    fn decode_fields(raw: &str, collection: &str, id: &str) -> AppResult<Fields> {
        let value: Value = serde_json::from_str(raw).map_err(|e| {
            AppError::Internal(format!(
                "Corrupt field payload for {}/{}: {}",
                collection, id, e
            ))
        })?;
        match value {
            Value::Object(map) => Ok(map),
            _ => Err(AppError::Internal(format!(
                "Field payload for {}/{} is not an object",
                collection, id
            ))),
        }
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, collection: &str, id: &str) -> AppResult<Option<Document>> {
        let row = sqlx::query("SELECT fields FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::StoreUnavailable(format!("Failed to get {}/{}: {}", collection, id, e))
            })?;

        match row {
            Some(row) => {
                let raw: String = row.get("fields");
                Ok(Some(Document::new(
                    id,
                    Self::decode_fields(&raw, collection, id)?,
                )))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, collection: &str, id: &str, fields: Fields) -> AppResult<()> {
        let payload = serde_json::to_string(&Value::Object(fields))?;
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, fields) VALUES (?, ?, ?)
            ON CONFLICT (collection, id) DO UPDATE SET fields = excluded.fields
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::StoreUnavailable(format!("Failed to put {}/{}: {}", collection, id, e))
        })?;
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, deltas: Vec<FieldDelta>) -> AppResult<()> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::StoreUnavailable(format!("Failed to begin transaction: {}", e))
        })?;

        let row = sqlx::query("SELECT fields FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                AppError::StoreUnavailable(format!("Failed to read {}/{}: {}", collection, id, e))
            })?;

        let raw: String = match row {
            Some(row) => row.get("fields"),
            None => {
                return Err(AppError::NotFound(format!(
                    "document {}/{} does not exist",
                    collection, id
                )))
            }
        };
        let mut fields = Self::decode_fields(&raw, collection, id)?;

        for delta in deltas {
            match delta {
                FieldDelta::Set(name, value) => {
                    fields.insert(name, value);
                }
                FieldDelta::Increment(name, amount) => {
                    let current = fields.get(&name).and_then(Value::as_i64).unwrap_or(0);
                    fields.insert(name, Value::from(current + amount));
                }
            }
        }

        let payload = serde_json::to_string(&Value::Object(fields))?;
        sqlx::query("UPDATE documents SET fields = ? WHERE collection = ? AND id = ?")
            .bind(payload)
            .bind(collection)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::StoreUnavailable(format!("Failed to update {}/{}: {}", collection, id, e))
            })?;

        tx.commit().await.map_err(|e| {
            AppError::StoreUnavailable(format!("Failed to commit update: {}", e))
        })?;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::StoreUnavailable(format!("Failed to delete {}/{}: {}", collection, id, e))
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn query(
        &self,
        collection: &str,
        filter: Option<Filter>,
        order: Option<OrderBy>,
    ) -> AppResult<Vec<Document>> {
        let rows = sqlx::query("SELECT id, fields FROM documents WHERE collection = ?")
            .bind(collection)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::StoreUnavailable(format!("Failed to query {}: {}", collection, e))
            })?;

        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            let raw: String = row.get("fields");
            let doc = Document::new(id.clone(), Self::decode_fields(&raw, collection, &id)?);
            if filter.as_ref().map(|f| f.matches(&doc)).unwrap_or(true) {
                docs.push(doc);
            }
        }
        if let Some(order) = &order {
            sort_documents(&mut docs, order);
        }
        Ok(docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(pairs: &[(&str, Value)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn round_trips_documents() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        store
            .put("users", "u1", fields(&[("username", json!("alice"))]))
            .await
            .unwrap();
        let doc = store.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(doc.get_str("username"), Some("alice"));
    }

    #[tokio::test]
    async fn increments_inside_a_transaction() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        store
            .put("posts", "p1", fields(&[("likes", json!(0))]))
            .await
            .unwrap();
        for _ in 0..3 {
            store
                .update(
                    "posts",
                    "p1",
                    vec![FieldDelta::Increment("likes".to_string(), 1)],
                )
                .await
                .unwrap();
        }
        let doc = store.get("posts", "p1").await.unwrap().unwrap();
        assert_eq!(doc.get_i64("likes"), Some(3));
    }

    #[tokio::test]
    async fn update_of_missing_document_is_not_found() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        let result = store
            .update(
                "posts",
                "ghost",
                vec![FieldDelta::Set("caption".to_string(), json!("x"))],
            )
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn query_filters_and_orders_like_memory_store() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        for (id, owner, ts) in [("p1", "u1", 10), ("p2", "u2", 20), ("p3", "u1", 30)] {
            store
                .put(
                    "posts",
                    id,
                    fields(&[("owner_id", json!(owner)), ("timestamp", json!(ts))]),
                )
                .await
                .unwrap();
        }
        let docs = store
            .query(
                "posts",
                Some(Filter::eq("owner_id", "u1")),
                Some(OrderBy::desc("timestamp")),
            )
            .await
            .unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["p3", "p1"]);
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.db");
        let path = path.to_str().unwrap();

        {
            let store = SqliteStore::open(path).await.unwrap();
            store
                .put("users", "u1", fields(&[("username", json!("alice"))]))
                .await
                .unwrap();
        }

        let store = SqliteStore::open(path).await.unwrap();
        let doc = store.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(doc.get_str("username"), Some("alice"));
    }

    #[tokio::test]
    async fn change_streams_are_unsupported() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        let result = store.subscribe("comments", None).await;
        assert!(matches!(result, Err(AppError::Unsupported(_))));
    }
}
