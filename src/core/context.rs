// Viewer Context - Explicit request-scoped caller identity and deadline
// Passed as a parameter to every service method; there is no ambient
// "current user" lookup anywhere in the crate.

use crate::core::types::UserId;
use crate::error::{AppError, AppResult};
use std::future::Future;
use tokio::time::Instant;

/// Who is making the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// A signed-in user, identity vouched for by the identity provider.
    Authenticated(UserId),
    /// No identity; read-only paths may still serve these callers.
    Anonymous,
}

/// Request-scoped context: caller principal plus an optional deadline that
/// bounds every store round-trip made on the request's behalf.
#[derive(Debug, Clone)]
pub struct ViewerContext {
    principal: Principal,
    deadline: Option<Instant>,
}

impl ViewerContext {
    pub fn authenticated(user_id: impl Into<UserId>) -> Self {
        Self {
            principal: Principal::Authenticated(user_id.into()),
            deadline: None,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            principal: Principal::Anonymous,
            deadline: None,
        }
    }

    /// Attach an absolute deadline to this request.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// The authenticated caller, or `Unauthenticated` for anonymous requests.
    pub fn require_user(&self) -> AppResult<&UserId> {
        match &self.principal {
            Principal::Authenticated(user_id) => Ok(user_id),
            Principal::Anonymous => Err(AppError::Unauthenticated(
                "operation requires a signed-in user".to_string(),
            )),
        }
    }

    pub fn user_id(&self) -> Option<&UserId> {
        match &self.principal {
            Principal::Authenticated(user_id) => Some(user_id),
            Principal::Anonymous => None,
        }
    }

    /// Run `fut` under this context's deadline, if one is set. Elapsing maps
    /// to `AppError::Timeout`; work already performed stays performed (a
    /// partially fanned-out publish is a defined state, see the fan-out
    /// services).
    pub async fn run_with_deadline<T, F>(&self, operation: &str, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        match self.deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, fut).await {
                Ok(result) => result,
                Err(_) => Err(AppError::Timeout(format!(
                    "deadline elapsed during {}",
                    operation
                ))),
            },
            None => fut.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn anonymous_context_has_no_user() {
        let ctx = ViewerContext::anonymous();
        assert!(ctx.require_user().is_err());
        assert!(ctx.user_id().is_none());
    }

    #[test]
    fn authenticated_context_yields_user() {
        let ctx = ViewerContext::authenticated("u1");
        assert_eq!(ctx.require_user().unwrap(), &UserId::new("u1"));
    }

    #[tokio::test]
    async fn elapsed_deadline_maps_to_timeout() {
        let ctx = ViewerContext::authenticated("u1")
            .with_deadline(Instant::now() - Duration::from_millis(1));
        let result = ctx
            .run_with_deadline("test", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(AppError::Timeout(_))));
    }
}
