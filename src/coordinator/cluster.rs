//! In-process cluster
//!
//! Wires the reference services, both worker groups and their runner tasks
//! into a ready [`Orchestrator`]. Workers are named `{group}-w{n}`, including
//! the ones that join later.

use crate::common::{Config, Error, IndexBackend, Result};
use crate::coordinator::orchestrator::{GroupKind, Orchestrator, Services};
use crate::group::Group;
use crate::services::{
    KeyIndex, LocalAuth, LocalBus, MemoryCache, MemoryKeyIndex, MessageBus, SledKeyIndex,
};
use crate::worker::{Worker, WorkerRunner};
use std::sync::Arc;
use tokio::task::JoinHandle;

pub struct LocalCluster {
    pub orchestrator: Arc<Orchestrator>,
    bus: Arc<LocalBus>,
    workers: Vec<Arc<Worker>>,
    runners: Vec<JoinHandle<()>>,
}

impl LocalCluster {
    pub async fn bootstrap(config: &Config) -> Result<Self> {
        config.validate()?;

        let key_index: Arc<dyn KeyIndex> = match config.index.backend {
            IndexBackend::Memory => Arc::new(MemoryKeyIndex::new()),
            IndexBackend::Sled => Arc::new(SledKeyIndex::open(&config.index.path)?),
        };
        Self::bootstrap_with_index(config, key_index).await
    }

    /// Same as [`LocalCluster::bootstrap`] with a caller-supplied key index
    pub async fn bootstrap_with_index(config: &Config, key_index: Arc<dyn KeyIndex>) -> Result<Self> {
        let bus = Arc::new(LocalBus::new(config.cluster.channel_capacity));
        let mut workers = Vec::new();
        let mut runners = Vec::new();

        let mut groups = Vec::with_capacity(2);
        for name in [&config.cluster.primary_group, &config.cluster.replica_group] {
            let group = Arc::new(Group::new(
                name.clone(),
                bus.clone(),
                config.orchestrator.quorum,
                config.orchestrator.worker_timeout(),
            ));
            for i in 0..config.cluster.workers_per_group {
                let worker = Arc::new(Worker::new(format!("{}-w{}", name, i)));
                let runner =
                    WorkerRunner::attach(worker.clone(), bus.as_ref(), group.topic_for(worker.id()))
                        .await?;
                runners.push(runner.spawn());
                group.add_worker(worker.clone()).await?;
                workers.push(worker);
            }
            groups.push(group);
        }
        let replica = groups
            .pop()
            .ok_or_else(|| Error::Internal("replica group missing".into()))?;
        let primary = groups
            .pop()
            .ok_or_else(|| Error::Internal("primary group missing".into()))?;

        let services = Services {
            auth: Arc::new(LocalAuth::new(&config.auth)),
            key_index,
            bus: bus.clone(),
            external_cache: Some(Arc::new(MemoryCache::new())),
        };
        let orchestrator = Orchestrator::connect(primary, replica, services, config).await?;

        tracing::info!(
            "Local cluster up: {} workers in groups {} / {}",
            workers.len(),
            config.cluster.primary_group,
            config.cluster.replica_group
        );

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            bus,
            workers,
            runners,
        })
    }

    /// Look a worker up by id across both groups
    pub fn worker(&self, worker_id: &str) -> Option<Arc<Worker>> {
        self.workers.iter().find(|w| w.id() == worker_id).cloned()
    }

    pub fn workers(&self) -> &[Arc<Worker>] {
        &self.workers
    }

    /// Start a fresh worker in the group currently serving as `kind`
    pub async fn add_worker(&mut self, kind: GroupKind) -> Result<Arc<Worker>> {
        let group = match kind {
            GroupKind::Primary => self.orchestrator.primary().await,
            GroupKind::Replica => self.orchestrator.replica().await,
        };
        let mut n = group.members().await.len();
        while self.worker(&format!("{}-w{}", group.id(), n)).is_some() {
            n += 1;
        }

        let worker = Arc::new(Worker::new(format!("{}-w{}", group.id(), n)));
        let runner = self.orchestrator.add_worker(worker.clone(), kind).await?;
        self.runners.push(runner);
        self.workers.push(worker.clone());
        Ok(worker)
    }

    /// Close every worker channel and wait for the runners to drain
    pub async fn shutdown(self) -> Result<()> {
        for topic in self.bus.topics().await {
            self.bus.unsubscribe(&topic).await?;
        }
        for runner in self.runners {
            if let Err(e) = runner.await {
                tracing::warn!("Worker runner ended abnormally: {}", e);
            }
        }
        tracing::info!("Local cluster stopped");
        Ok(())
    }
}
