// FollowFanoutService - Point-in-time feed reconciliation on follow changes
// Becoming a follower copies the followee's current posts into the
// follower's feed index; unfollowing removes them. Posts published after
// the change are the publish-time broadcast's job, not this service's.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::context::ViewerContext;
use crate::core::types::{PostId, UserId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::document_store::{
    collections, composite_id, DocumentStore, Fields, Filter,
};
use crate::models::{FeedEntry, NotificationKind};
use crate::services::notification::NotificationService;
use crate::services::{FanoutFailure, FanoutReport};

pub struct FollowFanoutService {
    store: Arc<dyn DocumentStore>,
    notifications: Arc<NotificationService>,
    fanout_concurrency: usize,
}

impl FollowFanoutService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        notifications: Arc<NotificationService>,
        fanout_concurrency: usize,
    ) -> Self {
        Self {
            store,
            notifications,
            fanout_concurrency,
        }
    }

    /// Full follow flow: write both halves of the follow index, reconcile
    /// the follower's feed, and notify the followee.
    pub async fn follow(&self, ctx: &ViewerContext, followee: &UserId) -> AppResult<FanoutReport> {
        let follower = ctx.require_user()?.clone();
        self.write_follow_edges(&follower, followee, true).await?;
        let report = self.on_follow_changed(ctx, followee, true).await?;
        if let Err(e) = self
            .notifications
            .notify(ctx, followee, NotificationKind::Follow, None)
            .await
        {
            warn!("follow notification for {} failed: {}", followee, e);
        }
        Ok(report)
    }

    /// Full unfollow flow: drop the follow index entries and sweep the
    /// followee's posts out of the follower's feed.
    pub async fn unfollow(&self, ctx: &ViewerContext, followee: &UserId) -> AppResult<FanoutReport> {
        let follower = ctx.require_user()?.clone();
        self.write_follow_edges(&follower, followee, false).await?;
        self.on_follow_changed(ctx, followee, false).await
    }

    /// Reconcile the caller's feed index against a snapshot of the
    /// followee's posts. Idempotent: re-adding present entries and
    /// re-removing absent ones are no-ops.
    pub async fn on_follow_changed(
        &self,
        ctx: &ViewerContext,
        followee: &UserId,
        is_now_following: bool,
    ) -> AppResult<FanoutReport> {
        ctx.run_with_deadline(
            "follow reconciliation",
            self.reconcile(ctx, followee, is_now_following),
        )
        .await
    }

    async fn reconcile(
        &self,
        ctx: &ViewerContext,
        followee: &UserId,
        is_now_following: bool,
    ) -> AppResult<FanoutReport> {
        let follower = ctx.require_user()?.clone();
        if &follower == followee {
            return Err(AppError::Validation(
                "users do not follow themselves".to_string(),
            ));
        }

        let posts = self
            .store
            .query(
                collections::POSTS,
                Some(Filter::eq("owner_id", followee.as_str())),
                None,
            )
            .await?;
        let post_ids: Vec<PostId> = posts.iter().map(|doc| PostId::from(doc.id.clone())).collect();

        let attempted = post_ids.len();
        let failures: Vec<Option<FanoutFailure>> = stream::iter(post_ids)
            .map(|post_id| {
                let entry = FeedEntry::new(follower.clone(), post_id);
                async move {
                    let result = if is_now_following {
                        match entry.fields() {
                            Ok(fields) => {
                                self.store
                                    .put(collections::USER_FEED, &entry.key(), fields)
                                    .await
                            }
                            Err(e) => Err(e),
                        }
                    } else {
                        self.store
                            .delete(collections::USER_FEED, &entry.key())
                            .await
                            .map(|_| ())
                    };
                    match result {
                        Ok(()) => None,
                        Err(e) => {
                            warn!("feed reconciliation for {} failed: {}", entry.post_id, e);
                            Some(FanoutFailure {
                                target: entry.user_id.clone(),
                                error: e.to_string(),
                            })
                        }
                    }
                }
            })
            .buffer_unordered(self.fanout_concurrency.max(1))
            .collect()
            .await;

        let report = FanoutReport {
            attempted,
            failed: failures.into_iter().flatten().collect(),
        };
        info!(
            "{} {} {}: {}/{} feed entries reconciled",
            follower,
            if is_now_following { "followed" } else { "unfollowed" },
            followee,
            report.delivered(),
            report.attempted
        );
        Ok(report)
    }

    async fn write_follow_edges(
        &self,
        follower: &UserId,
        followee: &UserId,
        present: bool,
    ) -> AppResult<()> {
        if follower == followee {
            return Err(AppError::Validation(
                "users do not follow themselves".to_string(),
            ));
        }
        let follower_key = composite_id(followee.as_str(), follower.as_str());
        let following_key = composite_id(follower.as_str(), followee.as_str());
        if present {
            let mut fields = Fields::new();
            fields.insert(
                "follower_id".to_string(),
                Value::String(follower.0.clone()),
            );
            fields.insert(
                "followee_id".to_string(),
                Value::String(followee.0.clone()),
            );
            fields.insert("since".to_string(), Value::from(Utc::now().timestamp_millis()));
            self.store
                .put(collections::FOLLOWERS, &follower_key, fields.clone())
                .await?;
            self.store
                .put(collections::FOLLOWING, &following_key, fields)
                .await?;
        } else {
            self.store
                .delete(collections::FOLLOWERS, &follower_key)
                .await?;
            self.store
                .delete(collections::FOLLOWING, &following_key)
                .await?;
        }
        Ok(())
    }
}
