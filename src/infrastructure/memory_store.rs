// MemoryStore - In-process DocumentStore for tests, demos, and the dev server
// Collections are plain maps behind one async RwLock; per-document update
// atomicity falls out of holding the write guard across the delta batch.
// The only store implementation that offers change streams.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::infrastructure::document_store::{
    sort_documents, ChangeEvent, ChangeStream, Document, DocumentStore, FieldDelta, Fields, Filter,
    OrderBy,
};

struct Subscriber {
    filter: Option<Filter>,
    sender: mpsc::UnboundedSender<ChangeEvent>,
}

#[derive(Default)]
struct Inner {
    // collection -> id -> fields; BTreeMap keeps enumeration deterministic
    collections: HashMap<String, BTreeMap<String, Fields>>,
    subscribers: HashMap<String, Vec<Subscriber>>,
}

impl Inner {
    fn notify(&mut self, collection: &str, event: &ChangeEvent) {
        let Some(subs) = self.subscribers.get_mut(collection) else {
            return;
        };
        subs.retain(|sub| {
            let relevant = match (&sub.filter, event) {
                (Some(filter), ChangeEvent::Added(doc) | ChangeEvent::Modified(doc)) => {
                    filter.matches(doc)
                }
                _ => true,
            };
            if !relevant {
                return true;
            }
            // A closed receiver drops the subscription.
            sub.sender.send(event.clone()).is_ok()
        });
    }
}

/// In-memory document store.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently held in a collection (test support).
    pub async fn document_count(&self, collection: &str) -> usize {
        self.inner
            .read()
            .await
            .collections
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> AppResult<Option<Document>> {
        let inner = self.inner.read().await;
        Ok(inner
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn put(&self, collection: &str, id: &str, fields: Fields) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let existed = inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields.clone())
            .is_some();
        let doc = Document::new(id, fields);
        let event = if existed {
            ChangeEvent::Modified(doc)
        } else {
            ChangeEvent::Added(doc)
        };
        inner.notify(collection, &event);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, deltas: Vec<FieldDelta>) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let fields = inner
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| {
                AppError::NotFound(format!("document {}/{} does not exist", collection, id))
            })?;

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

        let doc = Document::new(id, fields.clone());
        inner.notify(collection, &ChangeEvent::Modified(doc));
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        let removed = inner
            .collections
            .get_mut(collection)
            .map(|docs| docs.remove(id).is_some())
            .unwrap_or(false);
        if removed {
            inner.notify(collection, &ChangeEvent::Removed(id.to_string()));
        }
        Ok(removed)
    }

    async fn query(
        &self,
        collection: &str,
        filter: Option<Filter>,
        order: Option<OrderBy>,
    ) -> AppResult<Vec<Document>> {
        let inner = self.inner.read().await;
        let mut docs: Vec<Document> = inner
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .filter(|doc| filter.as_ref().map(|f| f.matches(doc)).unwrap_or(true))
                    .collect()
            })
            .unwrap_or_default();
        if let Some(order) = &order {
            sort_documents(&mut docs, order);
        }
        Ok(docs)
    }

    async fn subscribe(
        &self,
        collection: &str,
        filter: Option<Filter>,
    ) -> AppResult<ChangeStream> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut inner = self.inner.write().await;
        debug!("new change-stream subscriber on {}", collection);
        inner
            .subscribers
            .entry(collection.to_string())
            .or_default()
            .push(Subscriber { filter, sender });
        Ok(receiver)
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
    async fn put_get_delete_round_trip() {
        let store = MemoryStore::new();
        store
            .put("posts", "p1", fields(&[("caption", json!("hi"))]))
            .await
            .unwrap();
        let doc = store.get("posts", "p1").await.unwrap().unwrap();
        assert_eq!(doc.get_str("caption"), Some("hi"));
        assert!(store.delete("posts", "p1").await.unwrap());
        assert!(!store.delete("posts", "p1").await.unwrap());
        assert!(store.get("posts", "p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_increments_atomically_and_requires_existence() {
        let store = MemoryStore::new();
        store
            .put("posts", "p1", fields(&[("likes", json!(3))]))
            .await
            .unwrap();
        store
            .update(
                "posts",
                "p1",
                vec![FieldDelta::Increment("likes".to_string(), 1)],
            )
            .await
            .unwrap();
        let doc = store.get("posts", "p1").await.unwrap().unwrap();
        assert_eq!(doc.get_i64("likes"), Some(4));

        let missing = store
            .update(
                "posts",
                "nope",
                vec![FieldDelta::Increment("likes".to_string(), 1)],
            )
            .await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn query_filters_and_orders() {
        let store = MemoryStore::new();
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
    async fn subscribe_sees_matching_changes() {
        let store = MemoryStore::new();
        let mut stream = store
            .subscribe("comments", Some(Filter::eq("post_id", "p1")))
            .await
            .unwrap();

        store
            .put("comments", "c1", fields(&[("post_id", json!("p1"))]))
            .await
            .unwrap();
        store
            .put("comments", "c2", fields(&[("post_id", json!("p2"))]))
            .await
            .unwrap();

        match stream.recv().await.unwrap() {
            ChangeEvent::Added(doc) => assert_eq!(doc.id, "c1"),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(stream.try_recv().is_err());
    }
}
