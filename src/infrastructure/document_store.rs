// DocumentStore - Abstract document database interface
// Single seam the services talk through; implementations live alongside
// (in-memory and SQLite). Modeled as generic CRUD plus filtered/ordered
// snapshot queries and an optional change stream.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::error::{AppError, AppResult};

/// Collection names. These flatten the original per-document subcollections
/// into top-level collections with composite document ids (`"{a}:{b}"`).
pub mod collections {
    /// User profiles, keyed by user id.
    pub const USERS: &str = "users";
    /// Posts, keyed by post id.
    pub const POSTS: &str = "posts";
    /// Post-keyed half of a like edge, id `"{post_id}:{user_id}"`.
    pub const POST_LIKES: &str = "post-likes";
    /// User-keyed half of a like edge, id `"{user_id}:{post_id}"`.
    pub const USER_LIKES: &str = "user-likes";
    /// Per-user feed index, id `"{user_id}:{post_id}"`.
    pub const USER_FEED: &str = "user-feed";
    /// Follow index, follower side: id `"{followee_id}:{follower_id}"`.
    /// Consumed as given; maintained by the (external) follow surface.
    pub const FOLLOWERS: &str = "followers";
    /// Follow index, followee side: id `"{follower_id}:{followee_id}"`.
    pub const FOLLOWING: &str = "following";
    /// Notification events, keyed by event id, filtered by `recipient`.
    pub const NOTIFICATIONS: &str = "notifications";
    /// Comments, keyed by comment id, filtered by `post_id`.
    pub const COMMENTS: &str = "comments";
}

/// Composite id for the two-part index collections above.
pub fn composite_id(left: &str, right: &str) -> String {
    format!("{}:{}", left, right)
}

pub type Fields = Map<String, Value>;

/// A stored document: its id within the collection plus a JSON field map.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.fields.get(field).and_then(Value::as_i64)
    }
}

/// Single-field equality filter; all the feed/interaction queries need.
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub equals: Value,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            equals: value.into(),
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        doc.fields.get(&self.field) == Some(&self.equals)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Result ordering on a single (numeric or string) field.
#[derive(Debug, Clone)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Ascending,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Descending,
        }
    }
}

/// Partial atomic update of one document.
#[derive(Debug, Clone)]
pub enum FieldDelta {
    /// Overwrite one field.
    Set(String, Value),
    /// Add to a numeric field; the whole delta batch applies atomically
    /// with respect to other updates of the same document.
    Increment(String, i64),
}

/// One mutation observed on a subscribed collection.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Added(Document),
    Modified(Document),
    Removed(String),
}

pub type ChangeStream = mpsc::UnboundedReceiver<ChangeEvent>;

/// Generic document CRUD plus snapshot queries.
///
/// Implementations must provide per-document atomicity for `update`;
/// nothing here promises multi-document transactions, which is why the
/// interaction service orders its writes the way it does.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document, `None` when absent.
    async fn get(&self, collection: &str, id: &str) -> AppResult<Option<Document>>;

    /// Upsert: create or fully replace the document's fields.
    async fn put(&self, collection: &str, id: &str, fields: Fields) -> AppResult<()>;

    /// Apply field deltas atomically to an existing document.
    /// `NotFound` when the document does not exist.
    async fn update(&self, collection: &str, id: &str, deltas: Vec<FieldDelta>) -> AppResult<()>;

    /// Delete-if-exists; returns whether a document was removed.
    async fn delete(&self, collection: &str, id: &str) -> AppResult<bool>;

    /// Snapshot query: current matching documents, optionally ordered.
    async fn query(
        &self,
        collection: &str,
        filter: Option<Filter>,
        order: Option<OrderBy>,
    ) -> AppResult<Vec<Document>>;

    /// Existence check without materializing fields.
    async fn exists(&self, collection: &str, id: &str) -> AppResult<bool> {
        Ok(self.get(collection, id).await?.is_some())
    }

    /// Live change stream for a collection. Optional capability; stores
    /// without one return `Unsupported`.
    async fn subscribe(
        &self,
        _collection: &str,
        _filter: Option<Filter>,
    ) -> AppResult<ChangeStream> {
        Err(AppError::Unsupported(
            "this store does not provide change streams".to_string(),
        ))
    }
}

/// Sort a snapshot in place by one field. Missing fields order last in
/// either direction; numeric fields compare numerically, everything else
/// by string form.
pub fn sort_documents(docs: &mut [Document], order: &OrderBy) {
    use std::cmp::Ordering;

    let key = |doc: &Document| -> Option<Value> { doc.fields.get(&order.field).cloned() };

    docs.sort_by(|a, b| {
        let ordering = match (key(a), key(b)) {
            (Some(va), Some(vb)) => compare_values(&va, &vb),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        match order.direction {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        }
    });
}

fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    match (a.as_i64(), b.as_i64()) {
        (Some(na), Some(nb)) => na.cmp(&nb),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(fa), Some(fb)) => fa.partial_cmp(&fb).unwrap_or(std::cmp::Ordering::Equal),
            _ => a.to_string().cmp(&b.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, ts: i64) -> Document {
        let mut fields = Fields::new();
        fields.insert("timestamp".to_string(), json!(ts));
        Document::new(id, fields)
    }

    #[test]
    fn sorts_descending_by_numeric_field() {
        let mut docs = vec![doc("a", 10), doc("b", 30), doc("c", 20)];
        sort_documents(&mut docs, &OrderBy::desc("timestamp"));
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn filter_matches_on_equality() {
        let mut fields = Fields::new();
        fields.insert("owner_id".to_string(), json!("u1"));
        let d = Document::new("p1", fields);
        assert!(Filter::eq("owner_id", "u1").matches(&d));
        assert!(!Filter::eq("owner_id", "u2").matches(&d));
    }

    #[test]
    fn composite_ids_join_with_colon() {
        assert_eq!(composite_id("p1", "u2"), "p1:u2");
    }
}
