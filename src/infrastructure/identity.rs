// IdentityProvider - Caller authentication seam
// Credential verification, password hashing, and session issuance all live
// behind this trait in an external provider; this crate only ever asks
// "who does this token belong to".

use async_trait::async_trait;
use std::collections::HashMap;

use crate::core::types::UserId;
use crate::error::{AppError, AppResult};

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a bearer token to a stable user id, or `Unauthenticated`.
    async fn authenticate(&self, token: &str) -> AppResult<UserId>;
}

/// Fixed token -> user mapping for tests and the dev server.
#[derive(Default)]
pub struct StaticIdentity {
    tokens: HashMap<String, UserId>,
}

impl StaticIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, user_id: impl Into<UserId>) -> Self {
        self.tokens.insert(token.into(), user_id.into());
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn authenticate(&self, token: &str) -> AppResult<UserId> {
        self.tokens.get(token).cloned().ok_or_else(|| {
            AppError::Unauthenticated("token does not map to a known user".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_token_resolves() {
        let identity = StaticIdentity::new().with_token("t1", "u1");
        assert_eq!(identity.authenticate("t1").await.unwrap(), UserId::new("u1"));
    }

    #[tokio::test]
    async fn unknown_token_is_unauthenticated() {
        let identity = StaticIdentity::new();
        assert!(matches!(
            identity.authenticate("nope").await,
            Err(AppError::Unauthenticated(_))
        ));
    }
}
