//! BlobStore port - 巨大データ（prompt）の一時保存
//!
//! Queue entries only carry blob ids. The content is taken exactly once by the
//! consumer: `take` deletes what it returns.

use async_trait::async_trait;

use crate::domain::errors::BlobError;
use crate::domain::ids::BlobId;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `content` and return a fresh id for it.
    async fn store(&self, content: Vec<u8>) -> BlobId;

    /// Remove and return the content. A second call for the same id is `NotFound`.
    async fn take(&self, id: BlobId) -> Result<Vec<u8>, BlobError>;

    /// Delete expired blobs, returning how many were removed.
    async fn reap_expired(&self) -> usize {
        0
    }

    async fn store_text(&self, content: &str) -> BlobId {
        self.store(content.as_bytes().to_vec()).await
    }

    async fn take_text(&self, id: BlobId) -> Result<String, BlobError> {
        let bytes = self.take(id).await?;
        String::from_utf8(bytes).map_err(|_| BlobError::InvalidUtf8(id))
    }
}
