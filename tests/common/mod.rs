// Shared test harness: in-memory wiring plus a fault-injecting store wrapper.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use gramfeed::core::types::UserId;
use gramfeed::core::ViewerContext;
use gramfeed::error::AppError;
use gramfeed::infrastructure::{
    BlobStore, ChangeStream, Document, DocumentStore, FieldDelta, Fields, Filter, MemoryBlobStore,
    MemoryStore, OrderBy,
};
use gramfeed::services::user_directory::NewProfile;
use gramfeed::{AppResult, ServiceConfig, Services};

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub services: Services,
}

pub fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let blobs: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
    let services = Services::build(store.clone(), blobs, ServiceConfig::default());
    Harness { store, services }
}

pub fn ctx(user_id: &str) -> ViewerContext {
    ViewerContext::authenticated(user_id)
}

pub async fn seed_user(services: &Services, id: &str, username: &str) {
    services
        .users
        .create_profile(NewProfile {
            id: UserId::new(id),
            username: username.to_string(),
            full_name: username.to_string(),
            email: format!("{}@example.com", username),
            profile_image_url: None,
        })
        .await
        .unwrap();
}

/// Delegating store that fails `put` for configured (collection, id-prefix)
/// targets; everything else passes through untouched.
pub struct FailingStore {
    inner: Arc<dyn DocumentStore>,
    fail_put_prefixes: Mutex<HashSet<(String, String)>>,
}

impl FailingStore {
    pub fn wrap(inner: Arc<dyn DocumentStore>) -> Self {
        Self {
            inner,
            fail_put_prefixes: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_puts_with_prefix(&self, collection: &str, id_prefix: &str) {
        self.fail_put_prefixes
            .lock()
            .unwrap()
            .insert((collection.to_string(), id_prefix.to_string()));
    }

    fn should_fail(&self, collection: &str, id: &str) -> bool {
        self.fail_put_prefixes
            .lock()
            .unwrap()
            .iter()
            .any(|(c, prefix)| c == collection && id.starts_with(prefix))
    }
}

#[async_trait]
impl DocumentStore for FailingStore {
    async fn get(&self, collection: &str, id: &str) -> AppResult<Option<Document>> {
        self.inner.get(collection, id).await
    }

    async fn put(&self, collection: &str, id: &str, fields: Fields) -> AppResult<()> {
        if self.should_fail(collection, id) {
            return Err(AppError::StoreUnavailable(format!(
                "injected put failure for {}/{}",
                collection, id
            )));
        }
        self.inner.put(collection, id, fields).await
    }

    async fn update(&self, collection: &str, id: &str, deltas: Vec<FieldDelta>) -> AppResult<()> {
        self.inner.update(collection, id, deltas).await
    }

    async fn delete(&self, collection: &str, id: &str) -> AppResult<bool> {
        self.inner.delete(collection, id).await
    }

    async fn query(
        &self,
        collection: &str,
        filter: Option<Filter>,
        order: Option<OrderBy>,
    ) -> AppResult<Vec<Document>> {
        self.inner.query(collection, filter, order).await
    }

    async fn subscribe(
        &self,
        collection: &str,
        filter: Option<Filter>,
    ) -> AppResult<ChangeStream> {
        self.inner.subscribe(collection, filter).await
    }
}
