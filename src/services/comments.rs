// CommentService - Comments on posts
// Listing is a snapshot ordered oldest-first; `watch` exposes the store's
// change stream for UIs that render comments as they arrive.

use chrono::Utc;
use std::sync::Arc;
use tracing::warn;

use crate::core::context::ViewerContext;
use crate::core::types::{fresh_id, CommentId, PostId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::document_store::{
    collections, ChangeStream, DocumentStore, Filter, OrderBy,
};
use crate::models::{Comment, NotificationKind, Post};
use crate::services::notification::NotificationService;
use crate::services::user_directory::UserDirectory;

pub struct CommentService {
    store: Arc<dyn DocumentStore>,
    users: Arc<UserDirectory>,
    notifications: Arc<NotificationService>,
}

impl CommentService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        users: Arc<UserDirectory>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            store,
            users,
            notifications,
        }
    }

    /// Append a comment and notify the post owner (unless the owner is the
    /// one commenting).
    pub async fn add(
        &self,
        ctx: &ViewerContext,
        post_id: &PostId,
        text: String,
    ) -> AppResult<CommentId> {
        ctx.run_with_deadline("add comment", self.add_inner(ctx, post_id, text))
            .await
    }

    async fn add_inner(
        &self,
        ctx: &ViewerContext,
        post_id: &PostId,
        text: String,
    ) -> AppResult<CommentId> {
        let author_id = ctx.require_user()?.clone();
        if text.trim().is_empty() {
            return Err(AppError::Validation("comment must not be empty".to_string()));
        }

        let post_doc = self
            .store
            .get(collections::POSTS, post_id.as_str())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {} does not exist", post_id)))?;
        let post = Post::from_document(post_doc)?;

        let author = match self.users.fetch(&author_id).await {
            Ok(user) => Some(user),
            Err(e) => {
                warn!("could not snapshot commenter {}: {}", author_id, e);
                None
            }
        };

        let comment = Comment {
            id: CommentId::new(fresh_id()),
            post_id: post_id.clone(),
            author_id,
            text,
            timestamp: Utc::now(),
            author_username: author.as_ref().map(|u| u.username.clone()),
            author_image_url: author.and_then(|u| u.profile_image_url),
        };
        self.store
            .put(collections::COMMENTS, comment.id.as_str(), comment.fields()?)
            .await?;

        if let Err(e) = self
            .notifications
            .notify(ctx, &post.owner_id, NotificationKind::Comment, Some(&post))
            .await
        {
            warn!("comment notification for {} failed: {}", post_id, e);
        }
        Ok(comment.id)
    }

    /// Snapshot of a post's comments, oldest first.
    pub async fn list(&self, ctx: &ViewerContext, post_id: &PostId) -> AppResult<Vec<Comment>> {
        ctx.run_with_deadline("list comments", async {
            let docs = self
                .store
                .query(
                    collections::COMMENTS,
                    Some(Filter::eq("post_id", post_id.as_str())),
                    Some(OrderBy::asc("timestamp")),
                )
                .await?;
            let mut comments = Vec::with_capacity(docs.len());
            for doc in docs {
                match Comment::from_document(doc) {
                    Ok(comment) => comments.push(comment),
                    Err(e) => warn!("skipping malformed comment: {}", e),
                }
            }
            Ok(comments)
        })
        .await
    }

    /// Live comment changes for one post; `Unsupported` on stores without
    /// change streams.
    pub async fn watch(&self, post_id: &PostId) -> AppResult<ChangeStream> {
        self.store
            .subscribe(
                collections::COMMENTS,
                Some(Filter::eq("post_id", post_id.as_str())),
            )
            .await
    }
}
