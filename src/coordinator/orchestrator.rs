//! Orchestrator
//!
//! Entry point for every client operation. It assigns content ids, keeps the
//! ownership index and the durable key index in step, fronts reads with the
//! FIFO cache and drives replication into both worker groups.
//!
//! Write path:
//! 1. derive content id
//! 2. durable key index, then ownership index
//! 3. cache (evicting the oldest entry when full)
//! 4. replicate to primary and replica concurrently
//! 5. commit a log entry in each group
//!
//! A write that fails to replicate is rolled back out of the indices and the
//! cache before the error is returned, and a best-effort delete is published
//! to every live member so partial copies are discarded.

use crate::common::{
    connect_with_retry, retry_with_backoff, validate_name, Config, ContentId, Error, Result,
    RetryPolicy,
};
use crate::coordinator::cache::FifoCache;
use crate::coordinator::index::{FileEntry, OwnershipIndex};
use crate::group::{Group, GroupStatus, LogPayload, OpKind, ReplicationReport};
use crate::services::{AuthService, ExternalCache, IndexRecord, KeyIndex, MessageBus};
use crate::worker::{Worker, WorkerCommand, WorkerRunner};
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

const KEY_INDEX: &str = "key-index";

/// External collaborators injected into the orchestrator
#[derive(Clone)]
pub struct Services {
    pub auth: Arc<dyn AuthService>,
    pub key_index: Arc<dyn KeyIndex>,
    pub bus: Arc<dyn MessageBus>,
    pub external_cache: Option<Arc<dyn ExternalCache>>,
}

struct Roles {
    primary: Arc<Group>,
    replica: Arc<Group>,
}

/// Which of the two groups a joining worker is placed in. Resolved against
/// the current roles, so after a failover `Primary` means the promoted group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    Primary,
    Replica,
}

impl FromStr for GroupKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "primary" => Ok(GroupKind::Primary),
            "replica" => Ok(GroupKind::Replica),
            other => Err(Error::InvalidInput(format!(
                "unknown group kind '{}', expected primary or replica",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub len: usize,
    pub capacity: usize,
}

/// Serializable snapshot of the whole cluster
#[derive(Debug, Clone, Serialize)]
pub struct ClusterStatus {
    pub primary: GroupStatus,
    pub replica: GroupStatus,
    pub cache: CacheStatus,
    pub indexed_items: usize,
    pub indexed_users: usize,
}

pub struct Orchestrator {
    roles: RwLock<Roles>,
    cache: Mutex<FifoCache>,
    index: RwLock<OwnershipIndex>,
    auth: Arc<dyn AuthService>,
    key_index: Arc<dyn KeyIndex>,
    bus: Arc<dyn MessageBus>,
    external_cache: Option<Arc<dyn ExternalCache>>,
    retry: RetryPolicy,
}

impl Orchestrator {
    pub fn new(
        primary: Arc<Group>,
        replica: Arc<Group>,
        services: Services,
        cache_capacity: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            roles: RwLock::new(Roles { primary, replica }),
            cache: Mutex::new(FifoCache::new(cache_capacity)),
            index: RwLock::new(OwnershipIndex::new()),
            auth: services.auth,
            key_index: services.key_index,
            bus: services.bus,
            external_cache: services.external_cache,
            retry,
        }
    }

    /// Check every dependency under the startup retry policy, rebuild the
    /// ownership index and elect the primary group.
    pub async fn connect(
        primary: Arc<Group>,
        replica: Arc<Group>,
        services: Services,
        config: &Config,
    ) -> Result<Self> {
        let startup = &config.retry.startup;
        connect_with_retry("auth", startup, || services.auth.health_check()).await?;
        connect_with_retry(KEY_INDEX, startup, || services.key_index.health_check()).await?;
        connect_with_retry("message-bus", startup, || services.bus.health_check()).await?;
        if let Some(cache) = &services.external_cache {
            connect_with_retry("external-cache", startup, || cache.health_check()).await?;
        }

        let orchestrator = Self::new(
            primary.clone(),
            replica,
            services,
            config.orchestrator.cache_capacity,
            config.retry.steady_state.clone(),
        );
        let restored = orchestrator.restore().await?;
        primary.request_vote(primary.id()).await;

        tracing::info!(
            "✓ Orchestrator ready: primary={}, {} items restored",
            primary.id(),
            restored
        );
        Ok(orchestrator)
    }

    /// Rebuild the ownership index from the durable key index
    pub async fn restore(&self) -> Result<usize> {
        let records =
            retry_with_backoff(KEY_INDEX, &self.retry, || self.key_index.records()).await?;
        let index = OwnershipIndex::from_records(records);
        let restored = index.len();
        *self.index.write().await = index;
        Ok(restored)
    }

    pub async fn primary(&self) -> Arc<Group> {
        self.roles.read().await.primary.clone()
    }

    pub async fn replica(&self) -> Arc<Group> {
        self.roles.read().await.replica.clone()
    }

    // === Authentication ===

    /// Resolve a token to the user id it was issued for
    pub async fn authenticate(&self, token: &str) -> Result<String> {
        self.auth
            .verify(token)
            .await?
            .ok_or_else(|| Error::Unauthorized("invalid or expired token".into()))
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<String> {
        self.auth.register(username, password).await
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        self.auth
            .login(username, password)
            .await?
            .ok_or_else(|| Error::Unauthorized("invalid credentials".into()))
    }

    // === Client operations ===

    pub async fn upload(&self, data: Bytes, name: &str, user_id: &str) -> Result<ContentId> {
        validate_name(name)?;

        let created_at = Utc::now();
        let content_id = ContentId::derive(&data, user_id, name, created_at);
        let record = IndexRecord {
            content_id: content_id.clone(),
            name: name.to_string(),
            owner: user_id.to_string(),
            size: data.len() as u64,
            created_at,
        };

        retry_with_backoff(KEY_INDEX, &self.retry, || self.key_index.put(&record)).await?;
        self.index.write().await.insert(record);
        self.cache_insert(&content_id, data.clone()).await;

        let command = WorkerCommand::Store {
            content_id: content_id.clone(),
            data: data.clone(),
            owner: user_id.to_string(),
            name: name.to_string(),
        };
        let (primary, replica) = match self.replicate_both(&command).await {
            Ok(groups) => groups,
            Err(e) => {
                tracing::error!("Upload of {} failed, rolling back: {}", content_id.short(), e);
                self.forget(&content_id).await;
                if let Err(rollback) =
                    retry_with_backoff(KEY_INDEX, &self.retry, || self.key_index.remove(&content_id))
                        .await
                {
                    tracing::error!(
                        "Could not remove {} from the key index: {}",
                        content_id.short(),
                        rollback
                    );
                }
                self.discard(&content_id).await;
                return Err(e);
            }
        };

        let payload = LogPayload::Data(data);
        tokio::join!(
            primary.commit(OpKind::Store, content_id.clone(), payload.clone()),
            replica.commit(OpKind::Store, content_id.clone(), payload),
        );

        tracing::info!("Uploaded {} ({}) for {}", content_id.short(), name, user_id);
        Ok(content_id)
    }

    /// Fetch content and its display name. Items the user does not own are
    /// reported as missing.
    pub async fn download(&self, content_id: &ContentId, user_id: &str) -> Result<(Bytes, String)> {
        let name = {
            let index = self.index.read().await;
            match index.get(content_id) {
                Some(record) if record.owner == user_id => record.name.clone(),
                _ => return Err(Error::NotFound(content_id.to_string())),
            }
        };

        if let Some(data) = self.cache.lock().await.get(content_id) {
            tracing::debug!("Cache hit for {}", content_id.short());
            return Ok((data, name));
        }

        if let Some(cache) = &self.external_cache {
            match cache.get(content_id).await {
                Ok(Some(data)) => {
                    self.cache_insert(content_id, data.clone()).await;
                    return Ok((data, name));
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("External cache lookup failed: {}", e),
            }
        }

        let groups = {
            let roles = self.roles.read().await;
            [roles.primary.clone(), roles.replica.clone()]
        };
        for group in groups {
            if let Some((worker_id, blob)) = group.find(content_id).await {
                tracing::debug!(
                    "Served {} from {}/{}",
                    content_id.short(),
                    group.id(),
                    worker_id
                );
                self.cache_insert(content_id, blob.data.clone()).await;
                return Ok((blob.data, name));
            }
        }

        Err(Error::NotFound(content_id.to_string()))
    }

    /// Owned items whose name contains `query` (case-sensitive)
    pub async fn search(&self, query: &str, user_id: &str) -> Vec<FileEntry> {
        self.index.read().await.search(user_id, query)
    }

    pub async fn list(&self, user_id: &str) -> Vec<FileEntry> {
        self.index.read().await.list(user_id)
    }

    /// Returns `false` when the user does not own `content_id`
    pub async fn delete(&self, content_id: &ContentId, user_id: &str) -> Result<bool> {
        Ok(self.remove_owned(content_id, user_id).await?.is_some())
    }

    /// Replace content. The item is re-created under the same name with a
    /// new id; the old id stops resolving.
    pub async fn update(
        &self,
        content_id: &ContentId,
        data: Bytes,
        user_id: &str,
    ) -> Result<ContentId> {
        let Some(old) = self.remove_owned(content_id, user_id).await? else {
            return Err(Error::NotFound(content_id.to_string()));
        };
        let new_id = self.upload(data, &old.name, user_id).await?;
        tracing::info!("Updated {} -> {}", content_id.short(), new_id.short());
        Ok(new_id)
    }

    // === Failover ===

    /// Promote the replica when the primary has lost leadership. Returns
    /// whether the roles were swapped.
    pub async fn failover(&self) -> bool {
        let mut roles = self.roles.write().await;
        if roles.primary.is_leader().await {
            return false;
        }

        let candidate = roles.replica.id().to_string();
        if !roles.replica.request_vote(&candidate).await {
            tracing::error!("Group {} refused promotion", candidate);
            return false;
        }

        let roles = &mut *roles;
        std::mem::swap(&mut roles.primary, &mut roles.replica);
        tracing::warn!(
            "Failover: {} promoted to primary (term {}), {} demoted",
            roles.primary.id(),
            roles.primary.term().await,
            roles.replica.id()
        );
        true
    }

    pub async fn status(&self) -> ClusterStatus {
        let (primary, replica) = {
            let roles = self.roles.read().await;
            (roles.primary.clone(), roles.replica.clone())
        };
        let cache = {
            let cache = self.cache.lock().await;
            CacheStatus {
                len: cache.len(),
                capacity: cache.capacity(),
            }
        };
        let primary = primary.status().await;
        let replica = replica.status().await;
        let index = self.index.read().await;
        ClusterStatus {
            primary,
            replica,
            cache,
            indexed_items: index.len(),
            indexed_users: index.users(),
        }
    }

    /// Every indexed item, ordered by content id
    pub async fn records(&self) -> Vec<IndexRecord> {
        let mut records: Vec<IndexRecord> =
            self.index.read().await.records().cloned().collect();
        records.sort_by(|a, b| a.content_id.cmp(&b.content_id));
        records
    }

    /// The key index's copy of one record
    pub async fn durable_record(&self, content_id: &ContentId) -> Result<Option<IndexRecord>> {
        retry_with_backoff(KEY_INDEX, &self.retry, || self.key_index.get(content_id)).await
    }

    /// Ids currently held by the local cache, oldest first
    pub async fn cached_ids(&self) -> Vec<ContentId> {
        self.cache.lock().await.ids()
    }

    // === Membership ===

    /// Attach a worker to the group currently serving as `kind` and start
    /// its runner. Worker ids are unique across both groups. A worker joining
    /// a group that already has history starts degraded until repaired.
    pub async fn add_worker(
        &self,
        worker: Arc<Worker>,
        kind: GroupKind,
    ) -> Result<JoinHandle<()>> {
        let roles = self.roles.read().await;
        let (group, other) = match kind {
            GroupKind::Primary => (&roles.primary, &roles.replica),
            GroupKind::Replica => (&roles.replica, &roles.primary),
        };
        if group.member(worker.id()).await.is_some()
            || other.member(worker.id()).await.is_some()
        {
            return Err(Error::DuplicateRegistration(format!(
                "worker {}",
                worker.id()
            )));
        }

        let topic = group.topic_for(worker.id());
        let handle = WorkerRunner::attach(worker.clone(), self.bus.as_ref(), topic.clone())
            .await?
            .spawn();
        if let Err(e) = group.add_worker(worker.clone()).await {
            if let Err(unsubscribe) = self.bus.unsubscribe(&topic).await {
                tracing::warn!("Could not release {}: {}", topic, unsubscribe);
            }
            return Err(e);
        }

        if group.commit_index().await > 0 {
            group.mark_degraded(worker.id()).await?;
        }
        tracing::info!("Worker {} joined {} ({:?})", worker.id(), group.id(), kind);
        Ok(handle)
    }

    // === Internals ===

    /// Take an owned item out of the indices, the caches and both groups.
    /// The ownership check and the index removal share one write lock, so of
    /// two concurrent callers only one gets the record back.
    async fn remove_owned(
        &self,
        content_id: &ContentId,
        user_id: &str,
    ) -> Result<Option<IndexRecord>> {
        let record = {
            let mut index = self.index.write().await;
            if !index.owns(user_id, content_id) {
                return Ok(None);
            }
            match index.remove(content_id) {
                Some(record) => record,
                None => return Ok(None),
            }
        };

        if let Err(e) =
            retry_with_backoff(KEY_INDEX, &self.retry, || self.key_index.remove(content_id)).await
        {
            self.index.write().await.insert(record);
            return Err(e);
        }
        self.evict(content_id).await;

        let command = WorkerCommand::Delete {
            content_id: content_id.clone(),
        };
        let (primary, replica) = self.replicate_both(&command).await?;
        tokio::join!(
            primary.commit(OpKind::Delete, content_id.clone(), LogPayload::Tombstone),
            replica.commit(OpKind::Delete, content_id.clone(), LogPayload::Tombstone),
        );

        tracing::info!("Deleted {} for {}", content_id.short(), user_id);
        Ok(Some(record))
    }

    async fn replicate_both(
        &self,
        command: &WorkerCommand,
    ) -> Result<(Arc<Group>, Arc<Group>)> {
        let (primary, replica) = {
            let roles = self.roles.read().await;
            (roles.primary.clone(), roles.replica.clone())
        };

        let (primary_report, replica_report) =
            tokio::join!(primary.replicate(command), replica.replicate(command));
        log_degraded(&primary_report?);
        log_degraded(&replica_report?);

        Ok((primary, replica))
    }

    async fn cache_insert(&self, content_id: &ContentId, data: Bytes) {
        let evicted = self.cache.lock().await.put(content_id.clone(), data.clone());

        let Some(cache) = &self.external_cache else {
            return;
        };
        if let Err(e) = cache.set(content_id, data).await {
            tracing::warn!("External cache set failed for {}: {}", content_id.short(), e);
        }
        if let Some(evicted) = evicted {
            if let Err(e) = cache.delete(&evicted).await {
                tracing::warn!("External cache evict failed for {}: {}", evicted.short(), e);
            }
        }
    }

    /// Drop an item from the ownership index and both caches
    async fn forget(&self, content_id: &ContentId) {
        self.index.write().await.remove(content_id);
        self.evict(content_id).await;
    }

    async fn evict(&self, content_id: &ContentId) {
        self.cache.lock().await.remove(content_id);
        if let Some(cache) = &self.external_cache {
            if let Err(e) = cache.delete(content_id).await {
                tracing::warn!("External cache delete failed for {}: {}", content_id.short(), e);
            }
        }
    }

    /// Publish a delete to every live member of both groups without waiting
    async fn discard(&self, content_id: &ContentId) {
        let (primary, replica) = {
            let roles = self.roles.read().await;
            (roles.primary.clone(), roles.replica.clone())
        };
        let command = WorkerCommand::Delete {
            content_id: content_id.clone(),
        };
        let (p, r) = tokio::join!(primary.broadcast(&command), replica.broadcast(&command));
        tracing::debug!("Discard of {} published to {} members", content_id.short(), p + r);
    }
}

fn log_degraded(report: &ReplicationReport) {
    if report.is_degraded() {
        tracing::warn!(
            "Group {} degraded: {}/{} acknowledged, failed: {:?}",
            report.group,
            report.acked.len(),
            report.live,
            report.failed
        );
    }
}
