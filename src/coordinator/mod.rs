//! Coordination layer
//!
//! The coordinator is responsible for:
//! - Content identity and per-user ownership
//! - Bounded FIFO caching of hot content
//! - Write orchestration (replication into primary and replica groups)
//! - Group failover / leader promotion
//! - Runtime membership (workers joining either group)

pub mod cache;
pub mod cluster;
pub mod index;
pub mod orchestrator;

pub use cache::FifoCache;
pub use cluster::LocalCluster;
pub use index::{FileEntry, OwnershipIndex};
pub use orchestrator::{CacheStatus, ClusterStatus, GroupKind, Orchestrator, Services};
