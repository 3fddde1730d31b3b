// UserDirectory - Profile resolution and derived aggregate stats
// Fronted by a small LRU cache; stats are counted from the indices at read
// time, never stored on the profile.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::types::UserId;
use crate::error::{AppError, AppResult};
use crate::infrastructure::cache::SharedCache;
use crate::infrastructure::document_store::{collections, composite_id, DocumentStore, Filter};
use crate::models::{User, UserStats};

/// Input for creating a profile document. The id comes from the identity
/// provider at registration time; this service never mints user ids.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub id: UserId,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub profile_image_url: Option<String>,
}

pub struct UserDirectory {
    store: Arc<dyn DocumentStore>,
    cache: SharedCache<UserId, User>,
    resolve_concurrency: usize,
}

impl UserDirectory {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cache_capacity: usize,
        resolve_concurrency: usize,
    ) -> Self {
        Self {
            store,
            cache: SharedCache::new(cache_capacity),
            resolve_concurrency,
        }
    }

    /// Create (or replace) the profile document for a freshly registered user.
    pub async fn create_profile(&self, profile: NewProfile) -> AppResult<User> {
        if profile.username.trim().is_empty() {
            return Err(AppError::Validation("username must not be empty".to_string()));
        }
        let user = User {
            id: profile.id,
            username: profile.username,
            full_name: profile.full_name,
            email: profile.email,
            profile_image_url: profile.profile_image_url,
        };
        self.store
            .put(collections::USERS, user.id.as_str(), user.fields()?)
            .await?;
        info!("created profile for {} ({})", user.username, user.id);
        self.cache.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    /// Resolve one profile; `NotFound` when no such user exists.
    pub async fn fetch(&self, user_id: &UserId) -> AppResult<User> {
        if let Some(user) = self.cache.get(user_id) {
            return Ok(user);
        }
        let doc = self
            .store
            .get(collections::USERS, user_id.as_str())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {} does not exist", user_id)))?;
        let user = User::from_document(doc)?;
        self.cache.insert(user_id.clone(), user.clone());
        Ok(user)
    }

    /// Resolve many profiles in parallel; unresolvable ids are skipped.
    pub async fn fetch_many(&self, user_ids: Vec<UserId>) -> Vec<User> {
        let resolved: Vec<Option<User>> = stream::iter(user_ids)
            .map(|user_id| async move {
                match self.fetch(&user_id).await {
                    Ok(user) => Some(user),
                    Err(AppError::NotFound(_)) => {
                        debug!("user {} no longer resolvable, skipping", user_id);
                        None
                    }
                    Err(e) => {
                        warn!("failed to resolve user {}: {}", user_id, e);
                        None
                    }
                }
            })
            .buffer_unordered(self.resolve_concurrency.max(1))
            .collect()
            .await;
        resolved.into_iter().flatten().collect()
    }

    /// Derived post/follower/following counts, three snapshot queries.
    pub async fn stats(&self, user_id: &UserId) -> AppResult<UserStats> {
        let posts = self.store.query(
            collections::POSTS,
            Some(Filter::eq("owner_id", user_id.as_str())),
            None,
        );
        let followers = self.store.query(
            collections::FOLLOWERS,
            Some(Filter::eq("followee_id", user_id.as_str())),
            None,
        );
        let following = self.store.query(
            collections::FOLLOWING,
            Some(Filter::eq("follower_id", user_id.as_str())),
            None,
        );
        let (posts, followers, following) = tokio::try_join!(posts, followers, following)?;
        Ok(UserStats {
            posts: posts.len(),
            followers: followers.len(),
            following: following.len(),
        })
    }

    /// Whether `follower` currently follows `followee`.
    pub async fn is_following(&self, follower: &UserId, followee: &UserId) -> AppResult<bool> {
        self.store
            .exists(
                collections::FOLLOWING,
                &composite_id(follower.as_str(), followee.as_str()),
            )
            .await
    }
}
