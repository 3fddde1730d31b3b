// gramfeed - Feed fan-out and interaction-consistency core
// Stateless services over an abstract document store: publish fan-out,
// follow-time feed reconciliation, like-edge consistency, notifications,
// and feed assembly.

// Core types and request context
pub mod core;

// External-collaborator seams (document store, blob store, identity)
pub mod infrastructure;

// Domain models crossing the document boundary
pub mod models;

// The services themselves
pub mod services;

// Common utilities
pub mod error;

// Re-exports for convenience
pub use crate::core::{Principal, ViewerContext};
pub use error::{AppError, AppResult};
pub use services::{
    CommentService, FanoutReport, FeedAssembler, FollowFanoutService, InteractionService,
    NotificationService, PostFanoutService, PublishReceipt, ServiceConfig, Services,
    UserDirectory,
};
