// FeedAssembler - Materialize a user's feed from the feed index
// Read-only: resolves index entries into full posts, skips entries whose
// post has since vanished, and sorts by recency. Also carries the plain
// post read paths (single fetch, per-owner grid, global timeline).

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::context::ViewerContext;
use crate::core::types::{PostId, UserId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::document_store::{collections, DocumentStore, Filter, OrderBy};
use crate::models::Post;

pub struct FeedAssembler {
    store: Arc<dyn DocumentStore>,
    resolve_concurrency: usize,
}

impl FeedAssembler {
    pub fn new(store: Arc<dyn DocumentStore>, resolve_concurrency: usize) -> Self {
        Self {
            store,
            resolve_concurrency,
        }
    }

    /// The caller's feed, newest first. Dangling feed entries degrade to a
    /// shorter feed, never to a failed request.
    pub async fn assemble(&self, ctx: &ViewerContext) -> AppResult<Vec<Post>> {
        ctx.run_with_deadline("feed assembly", self.assemble_inner(ctx))
            .await
    }

    async fn assemble_inner(&self, ctx: &ViewerContext) -> AppResult<Vec<Post>> {
        let user_id = ctx.require_user()?;
        let entries = self
            .store
            .query(
                collections::USER_FEED,
                Some(Filter::eq("user_id", user_id.as_str())),
                None,
            )
            .await?;
        let post_ids: Vec<PostId> = entries
            .iter()
            .filter_map(|doc| doc.get_str("post_id").map(PostId::from))
            .collect();

        let resolved: Vec<Option<Post>> = stream::iter(post_ids)
            .map(|post_id| async move {
                match self.post(&post_id).await {
                    Ok(post) => Some(post),
                    Err(AppError::NotFound(_)) => {
                        debug!("feed entry for {} is dangling, skipping", post_id);
                        None
                    }
                    Err(e) => {
                        warn!("failed to resolve feed entry {}: {}", post_id, e);
                        None
                    }
                }
            })
            .buffer_unordered(self.resolve_concurrency.max(1))
            .collect()
            .await;

        let mut posts: Vec<Post> = resolved.into_iter().flatten().collect();
        posts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(posts)
    }

    /// Direct single-post fetch; `NotFound` propagates.
    pub async fn post(&self, post_id: &PostId) -> AppResult<Post> {
        let doc = self
            .store
            .get(collections::POSTS, post_id.as_str())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {} does not exist", post_id)))?;
        Post::from_document(doc)
    }

    /// All posts by one owner, newest first (the profile grid).
    pub async fn posts_by(&self, owner_id: &UserId) -> AppResult<Vec<Post>> {
        let docs = self
            .store
            .query(
                collections::POSTS,
                Some(Filter::eq("owner_id", owner_id.as_str())),
                Some(OrderBy::desc("timestamp")),
            )
            .await?;
        docs.into_iter().map(Post::from_document).collect()
    }

    /// Every post, newest first (the explore timeline).
    pub async fn timeline(&self) -> AppResult<Vec<Post>> {
        let docs = self
            .store
            .query(collections::POSTS, None, Some(OrderBy::desc("timestamp")))
            .await?;
        docs.into_iter().map(Post::from_document).collect()
    }
}
