use crate::error::{ProviderError, Result};
use crate::object_store::{ObjectStore, StoredObject};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// In-process object store for local runs and tests.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, object_id: &str) -> Option<Arc<[u8]>> {
        self.objects.read().await.get(object_id).cloned()
    }

    pub async fn contains(&self, object_id: &str) -> bool {
        self.objects.read().await.contains_key(object_id)
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, data: Arc<[u8]>, folder: &str) -> Result<StoredObject> {
        if data.is_empty() {
            return Err(ProviderError::InvalidInput("refusing to upload an empty file".to_string()));
        }
        let object_id = format!("{}/{}", folder.trim_matches('/'), uuid::Uuid::new_v4().simple());
        self.objects.write().await.insert(object_id.clone(), data);
        Ok(StoredObject {
            url: self.public_url(&object_id),
            object_id,
        })
    }

    async fn delete(&self, object_id: &str) -> Result<()> {
        self.objects.write().await.remove(object_id);
        Ok(())
    }

    fn signed_url(&self, object_id: &str, ttl: Duration) -> String {
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX / 2);
        let expires_at = chrono::Utc::now().timestamp().saturating_add(ttl);
        format!("memory://{object_id}?expires={expires_at}")
    }

    fn public_url(&self, object_id: &str) -> String {
        format!("memory://{object_id}")
    }
}
