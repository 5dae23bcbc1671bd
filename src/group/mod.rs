//! Worker groups (primary / replica)
//!
//! A group is a named replica set with:
//! - ordered membership and liveness-aware fan-out
//! - quorum accounting and degraded-member tracking
//! - an append-only commit log
//! - leadership state used by failover

pub mod election;
pub mod log;
pub mod replica_set;

pub use election::{ElectionState, GroupRole};
pub use log::{CommitLog, LogEntry, LogPayload, OpKind};
pub use replica_set::{Group, GroupStatus, MemberStatus, ReplicationReport};
