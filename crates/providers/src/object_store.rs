use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Default lifetime of signed retrieval URLs.
pub const DEFAULT_SIGNED_URL_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Opaque, durable reference into the store.
    pub object_id: String,
    /// Temporary retrieval URL usable right after upload.
    pub url: String,
}

/// Store bytes, return a reference.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, data: Arc<[u8]>, folder: &str) -> Result<StoredObject>;

    /// Deleting an absent object succeeds.
    async fn delete(&self, object_id: &str) -> Result<()>;

    fn signed_url(&self, object_id: &str, ttl: Duration) -> String;

    fn public_url(&self, object_id: &str) -> String;
}
