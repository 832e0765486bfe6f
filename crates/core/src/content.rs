//! [`ContentStore`] backed by the local content-addressed file store.

use crate::error::{RemoteError, RemoteResult};
use crate::remote::ContentStore;
use async_trait::async_trait;
use medrec_files::ContentStoreService;

#[async_trait]
impl ContentStore for ContentStoreService {
    async fn put(&self, bytes: Vec<u8>) -> RemoteResult<String> {
        let store = self.clone();
        let stored = tokio::task::spawn_blocking(move || store.put(&bytes))
            .await
            .map_err(|e| RemoteError::unavailable(format!("content store task failed: {}", e)))?
            .map_err(|e| RemoteError::unavailable(e.to_string()))?;

        tracing::debug!(
            "stored {} bytes as {}",
            stored.size_bytes,
            stored.hash
        );
        Ok(stored.hash.to_string())
    }
}
