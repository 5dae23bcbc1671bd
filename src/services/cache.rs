//! In-process external cache

use crate::common::{ContentId, Result};
use crate::services::ExternalCache;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<ContentId, Bytes>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ExternalCache for MemoryCache {
    async fn get(&self, content_id: &ContentId) -> Result<Option<Bytes>> {
        Ok(self.entries.read().await.get(content_id).cloned())
    }

    async fn set(&self, content_id: &ContentId, data: Bytes) -> Result<()> {
        self.entries.write().await.insert(content_id.clone(), data);
        Ok(())
    }

    async fn delete(&self, content_id: &ContentId) -> Result<()> {
        self.entries.write().await.remove(content_id);
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
