// Domain models - Users, posts, like edges, feed entries, notifications, comments
// Each model knows how to cross the Document boundary; the document's own id
// is authoritative and overwrites any `id` field found in the payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::types::{CommentId, NotificationId, PostId, UserId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::document_store::{composite_id, Document, Fields};

fn to_fields<T: Serialize>(model: &T) -> AppResult<Fields> {
    match serde_json::to_value(model)? {
        Value::Object(map) => Ok(map),
        _ => Err(AppError::Internal(
            "model did not serialize to an object".to_string(),
        )),
    }
}

fn from_document<T: for<'de> Deserialize<'de>>(doc: Document, what: &str) -> AppResult<T> {
    let mut fields = doc.fields;
    fields.insert("id".to_string(), Value::String(doc.id.clone()));
    serde_json::from_value(Value::Object(fields)).map_err(|e| {
        AppError::Internal(format!("Malformed {} document {}: {}", what, doc.id, e))
    })
}

/// A user profile. Stats are derived at read time, never stored here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub profile_image_url: Option<String>,
}

impl User {
    pub fn fields(&self) -> AppResult<Fields> {
        to_fields(self)
    }

    pub fn from_document(doc: Document) -> AppResult<Self> {
        from_document(doc, "user")
    }
}

/// Derived aggregate counters for a profile page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub posts: usize,
    pub followers: usize,
    pub following: usize,
}

/// A published post. Immutable after creation except `likes`, which only
/// the interaction service may touch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub owner_id: UserId,
    pub caption: String,
    pub image_url: String,
    /// Denormalized like counter.
    pub likes: i64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Owner snapshot for render-without-join, as the original stored it.
    #[serde(default)]
    pub owner_username: Option<String>,
    #[serde(default)]
    pub owner_image_url: Option<String>,
}

impl Post {
    pub fn fields(&self) -> AppResult<Fields> {
        to_fields(self)
    }

    pub fn from_document(doc: Document) -> AppResult<Self> {
        from_document(doc, "post")
    }
}

/// The relation "user likes post", materialized in two lookup directions.
/// Exists in both indices or in neither; a split edge is an invariant
/// violation the interaction service reports rather than repairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeEdge {
    pub user_id: UserId,
    pub post_id: PostId,
}

impl LikeEdge {
    pub fn new(user_id: UserId, post_id: PostId) -> Self {
        Self { user_id, post_id }
    }

    /// Id of the post-keyed index entry ("who liked this post").
    pub fn post_key(&self) -> String {
        composite_id(self.post_id.as_str(), self.user_id.as_str())
    }

    /// Id of the user-keyed index entry ("which posts did this user like").
    pub fn user_key(&self) -> String {
        composite_id(self.user_id.as_str(), self.post_id.as_str())
    }

    pub fn fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("user_id".to_string(), Value::String(self.user_id.0.clone()));
        fields.insert("post_id".to_string(), Value::String(self.post_id.0.clone()));
        fields
    }
}

/// One per-user feed index entry: "this post appears in this feed."
/// No payload beyond the pair itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub user_id: UserId,
    pub post_id: PostId,
}

impl FeedEntry {
    pub fn new(user_id: UserId, post_id: PostId) -> Self {
        Self { user_id, post_id }
    }

    pub fn key(&self) -> String {
        composite_id(self.user_id.as_str(), self.post_id.as_str())
    }

    pub fn fields(&self) -> AppResult<Fields> {
        to_fields(self)
    }

    pub fn from_document(doc: Document) -> AppResult<Self> {
        let mut fields = doc.fields;
        fields.remove("id");
        serde_json::from_value(Value::Object(fields)).map_err(|e| {
            AppError::Internal(format!("Malformed feed entry {}: {}", doc.id, e))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Like,
    Follow,
    Comment,
}

/// Append-only notification event. `id` equals the document id so the event
/// can reference itself in later reads and deletes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: NotificationId,
    pub recipient: UserId,
    pub actor_id: UserId,
    pub kind: NotificationKind,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Actor snapshot for rendering the row without a join.
    #[serde(default)]
    pub actor_username: Option<String>,
    #[serde(default)]
    pub actor_image_url: Option<String>,
    /// Present for like/comment events, absent for follows.
    #[serde(default)]
    pub post_id: Option<PostId>,
    #[serde(default)]
    pub post_image_url: Option<String>,
}

impl NotificationEvent {
    pub fn fields(&self) -> AppResult<Fields> {
        to_fields(self)
    }

    pub fn from_document(doc: Document) -> AppResult<Self> {
        from_document(doc, "notification")
    }
}

/// A comment on a post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub author_id: UserId,
    pub text: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub author_username: Option<String>,
    #[serde(default)]
    pub author_image_url: Option<String>,
}

impl Comment {
    pub fn fields(&self) -> AppResult<Fields> {
        to_fields(self)
    }

    pub fn from_document(doc: Document) -> AppResult<Self> {
        from_document(doc, "comment")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_post() -> Post {
        Post {
            id: PostId::new("p1"),
            owner_id: UserId::new("u1"),
            caption: "hi".to_string(),
            image_url: "mem://media/x".to_string(),
            likes: 3,
            timestamp: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
            owner_username: Some("alice".to_string()),
            owner_image_url: None,
        }
    }

    #[test]
    fn post_survives_the_document_boundary() {
        let post = sample_post();
        let fields = post.fields().unwrap();
        assert_eq!(fields.get("timestamp").unwrap(), 1_700_000_000_000i64);

        let doc = Document::new("p1", fields);
        let back = Post::from_document(doc).unwrap();
        assert_eq!(back.id, post.id);
        assert_eq!(back.likes, 3);
        assert_eq!(back.timestamp, post.timestamp);
    }

    #[test]
    fn document_id_wins_over_payload_id() {
        let post = sample_post();
        let fields = post.fields().unwrap();
        let doc = Document::new("renamed", fields);
        let back = Post::from_document(doc).unwrap();
        assert_eq!(back.id, PostId::new("renamed"));
    }

    #[test]
    fn like_edge_keys_are_mirrored() {
        let edge = LikeEdge::new(UserId::new("u2"), PostId::new("p1"));
        assert_eq!(edge.post_key(), "p1:u2");
        assert_eq!(edge.user_key(), "u2:p1");
    }

    #[test]
    fn notification_kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&NotificationKind::Follow).unwrap(),
            "\"follow\""
        );
    }
}
