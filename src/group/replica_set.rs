//! Replica set of workers
//!
//! A group fans each write out to its live members over the message bus and
//! waits for every dispatched call to settle. The write stands when the
//! acknowledgements reach the configured quorum of live members; members that
//! failed or timed out are flagged degraded until they are resynced.

use crate::common::{ContentId, Error, NodeState, QuorumPolicy, Result};
use crate::group::election::{ElectionState, GroupRole};
use crate::group::log::{CommitLog, LogEntry, LogPayload, OpKind};
use crate::services::{MessageBus, Topic};
use crate::worker::{CommandAck, StoredBlob, Worker, WorkerCommand};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// Outcome of one fan-out
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicationReport {
    pub group: String,
    pub live: usize,
    pub required: usize,
    pub acked: Vec<String>,
    pub failed: Vec<String>,
}

impl ReplicationReport {
    pub fn is_degraded(&self) -> bool {
        !self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberStatus {
    pub worker_id: String,
    pub state: NodeState,
    pub entries: usize,
    pub degraded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupStatus {
    pub group_id: String,
    pub role: GroupRole,
    pub term: u64,
    pub voted_for: Option<String>,
    pub commit_index: u64,
    pub members: Vec<MemberStatus>,
}

pub struct Group {
    group_id: String,
    bus: Arc<dyn MessageBus>,
    quorum: QuorumPolicy,
    worker_timeout: Duration,
    members: RwLock<Vec<Arc<Worker>>>,
    election: Mutex<ElectionState>,
    log: Mutex<CommitLog>,
    degraded: Mutex<BTreeSet<String>>,
}

impl Group {
    pub fn new(
        group_id: impl Into<String>,
        bus: Arc<dyn MessageBus>,
        quorum: QuorumPolicy,
        worker_timeout: Duration,
    ) -> Self {
        let group_id = group_id.into();
        Self {
            election: Mutex::new(ElectionState::new(group_id.clone())),
            group_id,
            bus,
            quorum,
            worker_timeout,
            members: RwLock::new(Vec::new()),
            log: Mutex::new(CommitLog::new()),
            degraded: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.group_id
    }

    /// Channel a member of this group listens on
    pub fn topic_for(&self, worker_id: &str) -> Topic {
        Topic::new(self.group_id.clone(), worker_id)
    }

    // === Membership ===

    /// Register a member. Registering the same worker id twice is an error.
    pub async fn add_worker(&self, worker: Arc<Worker>) -> Result<()> {
        let mut members = self.members.write().await;
        if members.iter().any(|w| w.id() == worker.id()) {
            return Err(Error::DuplicateRegistration(format!(
                "worker {} in group {}",
                worker.id(),
                self.group_id
            )));
        }
        tracing::info!("Group {}: added worker {}", self.group_id, worker.id());
        members.push(worker);
        Ok(())
    }

    pub async fn members(&self) -> Vec<Arc<Worker>> {
        self.members.read().await.clone()
    }

    pub async fn member(&self, worker_id: &str) -> Option<Arc<Worker>> {
        self.members
            .read()
            .await
            .iter()
            .find(|w| w.id() == worker_id)
            .cloned()
    }

    pub async fn live_members(&self) -> Vec<Arc<Worker>> {
        self.members
            .read()
            .await
            .iter()
            .filter(|w| w.is_alive())
            .cloned()
            .collect()
    }

    async fn require_member(&self, worker_id: &str) -> Result<Arc<Worker>> {
        self.member(worker_id).await.ok_or_else(|| {
            Error::NotFound(format!("worker {} in group {}", worker_id, self.group_id))
        })
    }

    pub async fn kill_member(&self, worker_id: &str) -> Result<()> {
        self.require_member(worker_id).await?.kill();
        Ok(())
    }

    /// Revive a member. It missed every write while dead, so it stays
    /// degraded until resynced.
    pub async fn revive_member(&self, worker_id: &str) -> Result<()> {
        let worker = self.require_member(worker_id).await?;
        if !worker.is_alive() {
            worker.revive();
            self.degraded.lock().await.insert(worker_id.to_string());
        }
        Ok(())
    }

    /// Flag a member as missing writes until it is resynced
    pub async fn mark_degraded(&self, worker_id: &str) -> Result<()> {
        self.require_member(worker_id).await?;
        self.degraded.lock().await.insert(worker_id.to_string());
        Ok(())
    }

    pub async fn degraded_members(&self) -> Vec<String> {
        self.degraded.lock().await.iter().cloned().collect()
    }

    // === Replication ===

    /// Fan a command out to every live member and wait for all calls to settle
    pub async fn replicate(&self, command: &WorkerCommand) -> Result<ReplicationReport> {
        let live = self.live_members().await;
        if live.is_empty() {
            return Err(Error::replication(&self.group_id, "no live members"));
        }
        let required = self.quorum.required(live.len());

        let calls = live.iter().map(|worker| {
            let topic = self.topic_for(worker.id());
            let command = command.clone();
            async move {
                let outcome =
                    match tokio::time::timeout(self.worker_timeout, self.bus.request(&topic, command))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(Error::Timeout(format!(
                            "{} after {:?}",
                            topic, self.worker_timeout
                        ))),
                    };
                (topic.worker_id, outcome)
            }
        });

        let mut acked = Vec::new();
        let mut failed = Vec::new();
        for (worker_id, outcome) in join_all(calls).await {
            match outcome {
                Ok(_) => acked.push(worker_id),
                Err(e) => {
                    tracing::warn!(
                        "Group {}: {} on {} failed: {}",
                        self.group_id,
                        command.name(),
                        worker_id,
                        e
                    );
                    failed.push(worker_id);
                }
            }
        }

        if !failed.is_empty() {
            self.degraded.lock().await.extend(failed.iter().cloned());
        }

        if acked.len() < required {
            return Err(Error::replication(
                &self.group_id,
                format!(
                    "{}/{} acknowledgements, need {}",
                    acked.len(),
                    live.len(),
                    required
                ),
            ));
        }

        tracing::debug!(
            "Group {}: {} acknowledged by {}/{}",
            self.group_id,
            command.name(),
            acked.len(),
            live.len()
        );

        Ok(ReplicationReport {
            group: self.group_id.clone(),
            live: live.len(),
            required,
            acked,
            failed,
        })
    }

    /// Hand a command to every live member without waiting for any of them.
    /// Returns how many members it was delivered to.
    pub async fn broadcast(&self, command: &WorkerCommand) -> usize {
        let mut delivered = 0;
        for worker in self.live_members().await {
            let topic = self.topic_for(worker.id());
            match self.bus.publish(&topic, command.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!(
                    "Group {}: {} not delivered to {}: {}",
                    self.group_id,
                    command.name(),
                    worker.id(),
                    e
                ),
            }
        }
        delivered
    }

    /// Record a replicated operation in the commit log
    pub async fn commit(
        &self,
        op: OpKind,
        content_id: ContentId,
        payload: LogPayload,
    ) -> LogEntry {
        let term = self.term().await;
        let mut log = self.log.lock().await;
        log.append(term, op, content_id, payload).clone()
    }

    pub async fn commit_index(&self) -> u64 {
        self.log.lock().await.commit_index()
    }

    pub async fn log_entries(&self) -> Vec<LogEntry> {
        self.log.lock().await.entries().to_vec()
    }

    // === Reads ===

    /// First live member, in registration order, holding the item
    pub async fn find(&self, content_id: &ContentId) -> Option<(String, StoredBlob)> {
        for worker in self.members().await {
            if !worker.is_alive() {
                continue;
            }
            if let Some(blob) = worker.retrieve(content_id).await {
                return Some((worker.id().to_string(), blob));
            }
        }
        None
    }

    // === Leadership ===

    pub async fn request_vote(&self, candidate_id: &str) -> bool {
        let mut election = self.election.lock().await;
        let granted = election.request_vote(candidate_id);
        tracing::info!(
            "Group {}: vote for {} in term {} {}",
            self.group_id,
            candidate_id,
            election.term(),
            if granted { "granted" } else { "refused" }
        );
        granted
    }

    pub async fn set_leader(&self, leader: bool) {
        self.election.lock().await.set_leader(leader);
    }

    pub async fn is_leader(&self) -> bool {
        self.election.lock().await.is_leader()
    }

    pub async fn term(&self) -> u64 {
        self.election.lock().await.term()
    }

    // === Repair ===

    /// Overwrite a member's state with a snapshot from a healthy peer
    pub async fn resync_member(&self, worker_id: &str) -> Result<usize> {
        let target = self.require_member(worker_id).await?;
        if !target.is_alive() {
            return Err(Error::WorkerUnavailable(worker_id.to_string()));
        }

        let degraded = self.degraded.lock().await.clone();
        let donor = self
            .members()
            .await
            .into_iter()
            .find(|w| w.id() != worker_id && w.is_alive() && !degraded.contains(w.id()))
            .ok_or_else(|| Error::replication(&self.group_id, "no healthy donor for resync"))?;

        let snapshot = donor.snapshot().await?;
        let topic = self.topic_for(worker_id);
        let ack = tokio::time::timeout(
            self.worker_timeout,
            self.bus.request(&topic, WorkerCommand::Sync { snapshot }),
        )
        .await
        .map_err(|_| Error::Timeout(format!("sync of {}", topic)))??;

        let entries = match ack {
            CommandAck::Synced { entries } => entries,
            other => {
                return Err(Error::Internal(format!(
                    "unexpected acknowledgement to sync: {:?}",
                    other
                )))
            }
        };

        self.degraded.lock().await.remove(worker_id);
        tracing::info!(
            "Group {}: resynced {} from {} ({} entries)",
            self.group_id,
            worker_id,
            donor.id(),
            entries
        );
        Ok(entries)
    }

    pub async fn status(&self) -> GroupStatus {
        let degraded = self.degraded.lock().await.clone();
        let mut members = Vec::new();
        for worker in self.members().await {
            members.push(MemberStatus {
                worker_id: worker.id().to_string(),
                state: worker.node_state(),
                entries: worker.len().await,
                degraded: degraded.contains(worker.id()),
            });
        }
        let election = self.election.lock().await.clone();
        GroupStatus {
            group_id: self.group_id.clone(),
            role: election.role(),
            term: election.term(),
            voted_for: election.voted_for().map(str::to_string),
            commit_index: self.commit_index().await,
            members,
        }
    }
}
