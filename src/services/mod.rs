// Services - Feed fan-out and interaction consistency
// Stateless per-request orchestration over the DocumentStore; every method
// takes an explicit ViewerContext, no ambient caller state anywhere.

pub mod comments;
pub mod feed;
pub mod follow_fanout;
pub mod interaction;
pub mod notification;
pub mod post_fanout;
pub mod user_directory;

pub use comments::CommentService;
pub use feed::FeedAssembler;
pub use follow_fanout::FollowFanoutService;
pub use interaction::InteractionService;
pub use notification::NotificationService;
pub use post_fanout::{PostFanoutService, PublishReceipt};
pub use user_directory::{NewProfile, UserDirectory};

use crate::core::types::UserId;
use crate::infrastructure::blob_store::BlobStore;
use crate::infrastructure::document_store::DocumentStore;
use std::sync::Arc;

/// Tunables shared by the services.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Concurrent feed-index writes during a fan-out.
    pub fanout_concurrency: usize,
    /// Concurrent document resolutions in likers/assemble joins.
    pub resolve_concurrency: usize,
    /// Profile cache capacity in the user directory.
    pub user_cache_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            fanout_concurrency: 16,
            resolve_concurrency: 8,
            user_cache_capacity: 1024,
        }
    }
}

/// One fan-out target that could not be written.
#[derive(Debug, Clone)]
pub struct FanoutFailure {
    pub target: UserId,
    pub error: String,
}

/// Aggregate result of a best-effort broadcast. Individual target failures
/// never abort the loop; they are collected here for the caller to retry or
/// surface.
#[derive(Debug, Clone, Default)]
pub struct FanoutReport {
    pub attempted: usize,
    pub failed: Vec<FanoutFailure>,
}

impl FanoutReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn delivered(&self) -> usize {
        self.attempted - self.failed.len()
    }
}

/// The wired-up service graph over one store and one blob store.
pub struct Services {
    pub users: Arc<UserDirectory>,
    pub notifications: Arc<NotificationService>,
    pub interactions: Arc<InteractionService>,
    pub post_fanout: Arc<PostFanoutService>,
    pub follow_fanout: Arc<FollowFanoutService>,
    pub feed: Arc<FeedAssembler>,
    pub comments: Arc<CommentService>,
}

impl Services {
    pub fn build(
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        config: ServiceConfig,
    ) -> Self {
        let users = Arc::new(UserDirectory::new(
            store.clone(),
            config.user_cache_capacity,
            config.resolve_concurrency,
        ));
        let notifications = Arc::new(NotificationService::new(store.clone(), users.clone()));
        let interactions = Arc::new(InteractionService::new(
            store.clone(),
            users.clone(),
            notifications.clone(),
        ));
        let post_fanout = Arc::new(PostFanoutService::new(
            store.clone(),
            blobs,
            users.clone(),
            config.fanout_concurrency,
        ));
        let follow_fanout = Arc::new(FollowFanoutService::new(
            store.clone(),
            notifications.clone(),
            config.fanout_concurrency,
        ));
        let feed = Arc::new(FeedAssembler::new(store.clone(), config.resolve_concurrency));
        let comments = Arc::new(CommentService::new(
            store,
            users.clone(),
            notifications.clone(),
        ));
        Services {
            users,
            notifications,
            interactions,
            post_fanout,
            follow_fanout,
            feed,
            comments,
        }
    }
}
