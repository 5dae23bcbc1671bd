//! Durable key index
//!
//! Stores one [`IndexRecord`] per live content item:
//! - content id → name, owner, size, creation time
//!
//! [`SledKeyIndex`] persists records (bincode) in a sled tree and survives
//! restarts. [`MemoryKeyIndex`] keeps them in a map and can simulate an
//! outage for failure testing.

use crate::common::{ContentId, Error, Result};
use crate::services::KeyIndex;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

const TREE_RECORDS: &str = "records";

/// Index entry for one content item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub content_id: ContentId,
    pub name: String,
    pub owner: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// In-memory index
pub struct MemoryKeyIndex {
    records: RwLock<BTreeMap<ContentId, IndexRecord>>,
    available: AtomicBool,
}

impl MemoryKeyIndex {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the index going away (or coming back)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::dependency("key-index", "connection refused"))
        }
    }
}

impl Default for MemoryKeyIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyIndex for MemoryKeyIndex {
    async fn put(&self, record: &IndexRecord) -> Result<()> {
        self.check()?;
        self.records
            .write()
            .await
            .insert(record.content_id.clone(), record.clone());
        Ok(())
    }

    async fn remove(&self, content_id: &ContentId) -> Result<Option<IndexRecord>> {
        self.check()?;
        Ok(self.records.write().await.remove(content_id))
    }

    async fn get(&self, content_id: &ContentId) -> Result<Option<IndexRecord>> {
        self.check()?;
        Ok(self.records.read().await.get(content_id).cloned())
    }

    async fn records(&self) -> Result<Vec<IndexRecord>> {
        self.check()?;
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn health_check(&self) -> Result<()> {
        self.check()
    }
}

/// Sled-backed durable index
pub struct SledKeyIndex {
    db: sled::Db,
    records: sled::Tree,
}

impl SledKeyIndex {
    /// Open or create the index database
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path.as_ref())?;
        let records = db.open_tree(TREE_RECORDS)?;
        Ok(Self { db, records })
    }

    fn decode(bytes: &[u8]) -> Result<IndexRecord> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Flush to disk
    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await?;
        Ok(())
    }
}

#[async_trait]
impl KeyIndex for SledKeyIndex {
    async fn put(&self, record: &IndexRecord) -> Result<()> {
        let value = bincode::serialize(record)?;
        self.records
            .insert(record.content_id.as_str().as_bytes(), value)?;
        Ok(())
    }

    async fn remove(&self, content_id: &ContentId) -> Result<Option<IndexRecord>> {
        match self.records.remove(content_id.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn get(&self, content_id: &ContentId) -> Result<Option<IndexRecord>> {
        match self.records.get(content_id.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn records(&self) -> Result<Vec<IndexRecord>> {
        let mut records = Vec::new();
        for item in self.records.iter() {
            let (_, value) = item?;
            records.push(Self::decode(&value)?);
        }
        Ok(records)
    }

    async fn health_check(&self) -> Result<()> {
        self.db.size_on_disk()?;
        Ok(())
    }
}
