// PostFanoutService - Publish a post and broadcast it into follower feeds
// Fan-out-on-write: the new post id lands in the author's own feed index and
// in the feed index of every follower known at publish time (a snapshot;
// followers who arrive mid-flight converge via follow-time reconciliation).

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::context::ViewerContext;
use crate::core::types::{fresh_id, PostId, UserId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::blob_store::BlobStore;
use crate::infrastructure::document_store::{collections, DocumentStore, Filter};
use crate::models::{FeedEntry, Post};
use crate::services::user_directory::UserDirectory;
use crate::services::{FanoutFailure, FanoutReport};

/// What the caller gets back from a publish: the new post plus the fan-out
/// outcome. A non-empty failure list is a defined partial state, not an
/// error; the post exists and undelivered feeds can be retried.
#[derive(Debug, Clone)]
pub struct PublishReceipt {
    pub post_id: PostId,
    pub fanout: FanoutReport,
}

pub struct PostFanoutService {
    store: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    users: Arc<UserDirectory>,
    fanout_concurrency: usize,
}

impl PostFanoutService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        users: Arc<UserDirectory>,
        fanout_concurrency: usize,
    ) -> Self {
        Self {
            store,
            blobs,
            users,
            fanout_concurrency,
        }
    }

    /// Upload the image, create the post, and broadcast the post id into the
    /// author's and every current follower's feed index. Publication never
    /// emits notifications.
    pub async fn publish(
        &self,
        ctx: &ViewerContext,
        caption: String,
        image: Vec<u8>,
    ) -> AppResult<PublishReceipt> {
        ctx.run_with_deadline("publish", self.publish_inner(ctx, caption, image))
            .await
    }

    async fn publish_inner(
        &self,
        ctx: &ViewerContext,
        caption: String,
        image: Vec<u8>,
    ) -> AppResult<PublishReceipt> {
        let author_id = ctx.require_user()?.clone();
        if caption.trim().is_empty() {
            return Err(AppError::Validation("caption must not be empty".to_string()));
        }

        let image_url = self.blobs.upload(image, "image/jpeg").await?;

        // Owner snapshot fields are best-effort; the post stands without them.
        let author = match self.users.fetch(&author_id).await {
            Ok(user) => Some(user),
            Err(e) => {
                warn!("could not snapshot author {}: {}", author_id, e);
                None
            }
        };

        let post = Post {
            id: PostId::new(fresh_id()),
            owner_id: author_id.clone(),
            caption,
            image_url,
            likes: 0,
            timestamp: Utc::now(),
            owner_username: author.as_ref().map(|u| u.username.clone()),
            owner_image_url: author.and_then(|u| u.profile_image_url),
        };
        self.store
            .put(collections::POSTS, post.id.as_str(), post.fields()?)
            .await?;

        let followers = self.follower_snapshot(&author_id).await?;
        let mut targets = Vec::with_capacity(followers.len() + 1);
        targets.push(author_id.clone());
        targets.extend(followers);

        let fanout = self.broadcast(&post.id, targets).await;
        info!(
            "published {} by {}: {}/{} feeds updated",
            post.id,
            author_id,
            fanout.delivered(),
            fanout.attempted
        );
        Ok(PublishReceipt {
            post_id: post.id,
            fanout,
        })
    }

    async fn follower_snapshot(&self, author_id: &UserId) -> AppResult<Vec<UserId>> {
        let docs = self
            .store
            .query(
                collections::FOLLOWERS,
                Some(Filter::eq("followee_id", author_id.as_str())),
                None,
            )
            .await?;
        Ok(docs
            .iter()
            .filter_map(|doc| doc.get_str("follower_id").map(UserId::from))
            .collect())
    }

    // Best-effort broadcast: each target's feed write is independent, and a
    // failure on one never aborts the others.
    async fn broadcast(&self, post_id: &PostId, targets: Vec<UserId>) -> FanoutReport {
        let attempted = targets.len();
        let failures: Vec<Option<FanoutFailure>> = stream::iter(targets)
            .map(|target| {
                let entry = FeedEntry::new(target.clone(), post_id.clone());
                async move {
                    let fields = match entry.fields() {
                        Ok(fields) => fields,
                        Err(e) => {
                            return Some(FanoutFailure {
                                target,
                                error: e.to_string(),
                            })
                        }
                    };
                    match self
                        .store
                        .put(collections::USER_FEED, &entry.key(), fields)
                        .await
                    {
                        Ok(()) => None,
                        Err(e) => {
                            warn!("feed fan-out to {} failed: {}", target, e);
                            Some(FanoutFailure {
                                target,
                                error: e.to_string(),
                            })
                        }
                    }
                }
            })
            .buffer_unordered(self.fanout_concurrency.max(1))
            .collect()
            .await;

        FanoutReport {
            attempted,
            failed: failures.into_iter().flatten().collect(),
        }
    }
}
