// InteractionService - Like/unlike with two-sided index consistency
// Keeps the denormalized like counter and both like indices in step. The
// counter mutates first, then the post-keyed index, then the user-keyed
// index: a failure part-way leaves the count ahead of the visible edges,
// so the UI undercounts rather than overcounts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::core::context::ViewerContext;
use crate::core::types::{PostId, UserId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::document_store::{collections, DocumentStore, FieldDelta, Filter};
use crate::models::{LikeEdge, NotificationKind, Post, User};
use crate::services::notification::NotificationService;
use crate::services::user_directory::UserDirectory;

// Lock-table sweep threshold; stale entries are dropped once nothing holds them.
const LOCK_TABLE_SWEEP: usize = 1024;

pub struct InteractionService {
    store: Arc<dyn DocumentStore>,
    users: Arc<UserDirectory>,
    notifications: Arc<NotificationService>,
    // Serializes like/unlike per (user, post) so concurrent toggles of the
    // same pair cannot interleave between the edge check and the writes.
    locks: Mutex<HashMap<(UserId, PostId), Arc<tokio::sync::Mutex<()>>>>,
}

impl InteractionService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        users: Arc<UserDirectory>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            store,
            users,
            notifications,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn pair_lock(&self, user_id: &UserId, post_id: &PostId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock table poisoned");
        if locks.len() > LOCK_TABLE_SWEEP {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks
            .entry((user_id.clone(), post_id.clone()))
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn fetch_post(&self, post_id: &PostId) -> AppResult<Post> {
        let doc = self
            .store
            .get(collections::POSTS, post_id.as_str())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {} does not exist", post_id)))?;
        Post::from_document(doc)
    }

    async fn edge_state(&self, edge: &LikeEdge) -> AppResult<(bool, bool)> {
        let in_post_index = self
            .store
            .exists(collections::POST_LIKES, &edge.post_key())
            .await?;
        let in_user_index = self
            .store
            .exists(collections::USER_LIKES, &edge.user_key())
            .await?;
        Ok((in_post_index, in_user_index))
    }

    /// Record that the caller likes `post_id`. Idempotent: liking an already
    /// liked post changes nothing. An edge present in only one index is
    /// reported as `InvariantViolation`, not repaired.
    pub async fn like(&self, ctx: &ViewerContext, post_id: &PostId) -> AppResult<()> {
        ctx.run_with_deadline("like", self.like_inner(ctx, post_id)).await
    }

    async fn like_inner(&self, ctx: &ViewerContext, post_id: &PostId) -> AppResult<()> {
        let user_id = ctx.require_user()?.clone();
        let lock = self.pair_lock(&user_id, post_id);
        let _guard = lock.lock().await;

        let post = self.fetch_post(post_id).await?;
        let edge = LikeEdge::new(user_id.clone(), post_id.clone());

        match self.edge_state(&edge).await? {
            (true, true) => {
                debug!("{} already likes {}, no-op", user_id, post_id);
                return Ok(());
            }
            (true, false) | (false, true) => {
                return Err(AppError::InvariantViolation(format!(
                    "like edge ({}, {}) present in only one index",
                    user_id, post_id
                )));
            }
            (false, false) => {}
        }

        // Counter first, then both index halves.
        self.store
            .update(
                collections::POSTS,
                post_id.as_str(),
                vec![FieldDelta::Increment("likes".to_string(), 1)],
            )
            .await?;
        self.store
            .put(collections::POST_LIKES, &edge.post_key(), edge.fields())
            .await?;
        self.store
            .put(collections::USER_LIKES, &edge.user_key(), edge.fields())
            .await?;

        if let Err(e) = self
            .notifications
            .notify(ctx, &post.owner_id, NotificationKind::Like, Some(&post))
            .await
        {
            warn!("like notification for {} failed: {}", post_id, e);
        }
        Ok(())
    }

    /// Remove the caller's like. No-op when the counter is already zero or
    /// when no edge exists; never drives the counter negative.
    pub async fn unlike(&self, ctx: &ViewerContext, post_id: &PostId) -> AppResult<()> {
        ctx.run_with_deadline("unlike", self.unlike_inner(ctx, post_id))
            .await
    }

    async fn unlike_inner(&self, ctx: &ViewerContext, post_id: &PostId) -> AppResult<()> {
        let user_id = ctx.require_user()?.clone();
        let lock = self.pair_lock(&user_id, post_id);
        let _guard = lock.lock().await;

        let post = self.fetch_post(post_id).await?;
        if post.likes == 0 {
            debug!("unlike of {} with zero likes, no-op", post_id);
            return Ok(());
        }

        let edge = LikeEdge::new(user_id.clone(), post_id.clone());
        match self.edge_state(&edge).await? {
            (false, false) => {
                debug!("{} does not like {}, no-op", user_id, post_id);
                return Ok(());
            }
            (true, false) | (false, true) => {
                return Err(AppError::InvariantViolation(format!(
                    "like edge ({}, {}) present in only one index",
                    user_id, post_id
                )));
            }
            (true, true) => {}
        }

        self.store
            .update(
                collections::POSTS,
                post_id.as_str(),
                vec![FieldDelta::Increment("likes".to_string(), -1)],
            )
            .await?;
        self.store
            .delete(collections::POST_LIKES, &edge.post_key())
            .await?;
        self.store
            .delete(collections::USER_LIKES, &edge.user_key())
            .await?;
        Ok(())
    }

    /// Whether `user_id` likes `post_id`; reads the user-keyed index only.
    pub async fn has_liked(&self, user_id: &UserId, post_id: &PostId) -> AppResult<bool> {
        let edge = LikeEdge::new(user_id.clone(), post_id.clone());
        self.store
            .exists(collections::USER_LIKES, &edge.user_key())
            .await
    }

    /// The users who like a post, in no particular order. Identifiers that
    /// fail to resolve are skipped; one dangling id never fails the listing.
    pub async fn likers(&self, ctx: &ViewerContext, post_id: &PostId) -> AppResult<Vec<User>> {
        ctx.run_with_deadline("likers", self.likers_inner(post_id))
            .await
    }

    async fn likers_inner(&self, post_id: &PostId) -> AppResult<Vec<User>> {
        let entries = self
            .store
            .query(
                collections::POST_LIKES,
                Some(Filter::eq("post_id", post_id.as_str())),
                None,
            )
            .await?;

        let user_ids: Vec<UserId> = entries
            .iter()
            .filter_map(|doc| doc.get_str("user_id").map(UserId::from))
            .collect();

        // Unresolvable ids degrade to a shorter listing.
        Ok(self.users.fetch_many(user_ids).await)
    }
}
