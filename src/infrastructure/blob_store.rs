// BlobStore - Binary content upload seam
// The real deployment points this at an object-storage bucket; the bundled
// implementation keeps bytes in memory and hands back synthetic URLs, which
// is all the services need (they only ever store the returned URL).

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::core::types::fresh_id;
use crate::error::{AppError, AppResult};

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload content, returning a URL the uploaded bytes can be fetched at.
    async fn upload(&self, bytes: Vec<u8>, content_type: &str) -> AppResult<String>;
}

/// In-memory blob store; URLs are `mem://media/{uuid}`.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch previously uploaded bytes (test support).
    pub async fn fetch(&self, url: &str) -> Option<Vec<u8>> {
        self.blobs.read().await.get(url).cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, bytes: Vec<u8>, content_type: &str) -> AppResult<String> {
        if bytes.is_empty() {
            return Err(AppError::Validation("empty blob upload".to_string()));
        }
        let url = format!("mem://media/{}", fresh_id());
        debug!(
            "stored {} byte {} blob at {}",
            bytes.len(),
            content_type,
            url
        );
        self.blobs.write().await.insert(url.clone(), bytes);
        Ok(url)
    }
}
