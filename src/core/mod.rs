// Core types and request context

pub mod context;
pub mod types;

pub use context::{Principal, ViewerContext};
pub use types::{fresh_id, CommentId, NotificationId, PostId, UserId};
