//! Storage worker
//!
//! Holds `content_id → (bytes, owner, name)` in memory and applies the
//! commands delivered to it. Content is immutable, so a second `store` of an
//! id is a no-op, and a `store` arriving after that id was deleted is
//! dropped: deleted ids are remembered as tombstones.

use crate::common::{ContentId, Error, NodeState, Result};
use crate::worker::command::{CommandAck, WorkerCommand};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// One stored content item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlob {
    pub data: Bytes,
    pub owner: String,
    pub name: String,
}

/// Full worker state, used for `sync` transfers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub blobs: Vec<(ContentId, StoredBlob)>,
    pub tombstones: Vec<ContentId>,
}

impl WorkerSnapshot {
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[derive(Debug, Default)]
struct WorkerState {
    blobs: HashMap<ContentId, StoredBlob>,
    tombstones: HashSet<ContentId>,
}

pub struct Worker {
    worker_id: String,
    alive: AtomicBool,
    state: RwLock<WorkerState>,
}

impl Worker {
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            alive: AtomicBool::new(true),
            state: RwLock::new(WorkerState::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.worker_id
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn node_state(&self) -> NodeState {
        if self.is_alive() {
            NodeState::Alive
        } else {
            NodeState::Dead
        }
    }

    /// Mark dead; the worker stops serving and rejects commands
    pub fn kill(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            tracing::warn!("Worker {} marked dead", self.worker_id);
        }
    }

    /// Bring a dead worker back. Nothing missed while dead is replayed.
    pub fn revive(&self) {
        if !self.alive.swap(true, Ordering::SeqCst) {
            tracing::info!("Worker {} revived", self.worker_id);
        }
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(Error::WorkerUnavailable(self.worker_id.clone()))
        }
    }

    /// Persist an item. Returns whether this call wrote it.
    pub async fn store(&self, content_id: ContentId, blob: StoredBlob) -> Result<bool> {
        self.ensure_alive()?;
        let mut state = self.state.write().await;
        if state.tombstones.contains(&content_id) {
            tracing::debug!(
                "Worker {} ignoring store for deleted {}",
                self.worker_id,
                content_id.short()
            );
            return Ok(false);
        }
        if state.blobs.contains_key(&content_id) {
            return Ok(false);
        }
        state.blobs.insert(content_id, blob);
        Ok(true)
    }

    /// Read an item; dead workers serve nothing
    pub async fn retrieve(&self, content_id: &ContentId) -> Option<StoredBlob> {
        if !self.is_alive() {
            return None;
        }
        self.state.read().await.blobs.get(content_id).cloned()
    }

    /// Remove an item. Returns whether it was present.
    pub async fn delete(&self, content_id: &ContentId) -> Result<bool> {
        self.ensure_alive()?;
        let mut state = self.state.write().await;
        state.tombstones.insert(content_id.clone());
        Ok(state.blobs.remove(content_id).is_some())
    }

    /// Whether the item is held locally, regardless of liveness
    pub async fn holds(&self, content_id: &ContentId) -> bool {
        self.state.read().await.blobs.contains_key(content_id)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.blobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Export the complete local state
    pub async fn snapshot(&self) -> Result<WorkerSnapshot> {
        self.ensure_alive()?;
        let state = self.state.read().await;
        let mut blobs: Vec<_> = state
            .blobs
            .iter()
            .map(|(id, blob)| (id.clone(), blob.clone()))
            .collect();
        blobs.sort_by(|a, b| a.0.cmp(&b.0));
        let mut tombstones: Vec<_> = state.tombstones.iter().cloned().collect();
        tombstones.sort();
        Ok(WorkerSnapshot { blobs, tombstones })
    }

    /// Replace the local state with a snapshot. Returns the item count.
    pub async fn restore(&self, snapshot: WorkerSnapshot) -> Result<usize> {
        self.ensure_alive()?;
        let tombstones: HashSet<ContentId> = snapshot.tombstones.into_iter().collect();
        let blobs: HashMap<ContentId, StoredBlob> = snapshot
            .blobs
            .into_iter()
            .filter(|(id, _)| !tombstones.contains(id))
            .collect();
        let entries = blobs.len();
        *self.state.write().await = WorkerState { blobs, tombstones };
        Ok(entries)
    }

    /// Apply one delivered command
    pub async fn handle(&self, command: WorkerCommand) -> Result<CommandAck> {
        match command {
            WorkerCommand::Store {
                content_id,
                data,
                owner,
                name,
            } => {
                let fresh = self
                    .store(content_id, StoredBlob { data, owner, name })
                    .await?;
                Ok(CommandAck::Stored { fresh })
            }
            WorkerCommand::Delete { content_id } => {
                let was_present = self.delete(&content_id).await?;
                Ok(CommandAck::Deleted { was_present })
            }
            WorkerCommand::Sync { snapshot } => {
                let entries = self.restore(snapshot).await?;
                tracing::info!("Worker {} synced {} entries", self.worker_id, entries);
                Ok(CommandAck::Synced { entries })
            }
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("worker_id", &self.worker_id)
            .field("alive", &self.is_alive())
            .finish()
    }
}
