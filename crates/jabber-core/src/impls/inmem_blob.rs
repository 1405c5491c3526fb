//! InMemoryBlobStore - プロセス内の Blob storage
//!
//! - `take` は destructive（一度読んだら消える）
//! - TTL を設定すると、期限切れの blob は `take` でも NotFound になり、
//!   `reap_expired` で物理的に削除される

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::errors::BlobError;
use crate::domain::ids::BlobId;
use crate::ports::{BlobStore, Clock, IdGenerator};

struct StoredBlob {
    content: Vec<u8>,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredBlob {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

pub struct InMemoryBlobStore {
    blobs: Mutex<HashMap<BlobId, StoredBlob>>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    ttl: Option<Duration>,
}

impl InMemoryBlobStore {
    pub fn new(ids: Arc<dyn IdGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self {
            blobs: Mutex::new(HashMap::new()),
            ids,
            clock,
            ttl: None,
        }
    }

    /// Blobs not taken within `ttl` of being stored are considered gone.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub async fn len(&self) -> usize {
        self.blobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.lock().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn store(&self, content: Vec<u8>) -> BlobId {
        let id = self.ids.generate_blob_id();
        let expires_at = self
            .ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .and_then(|ttl| self.clock.now().checked_add_signed(ttl));

        self.blobs
            .lock()
            .await
            .insert(id, StoredBlob { content, expires_at });
        id
    }

    async fn take(&self, id: BlobId) -> Result<Vec<u8>, BlobError> {
        let blob = self
            .blobs
            .lock()
            .await
            .remove(&id)
            .ok_or(BlobError::NotFound(id))?;

        if blob.is_expired(self.clock.now()) {
            return Err(BlobError::NotFound(id));
        }
        Ok(blob.content)
    }

    async fn reap_expired(&self) -> usize {
        let now = self.clock.now();
        let mut blobs = self.blobs.lock().await;
        let before = blobs.len();
        blobs.retain(|_, blob| !blob.is_expired(now));
        before - blobs.len()
    }
}
