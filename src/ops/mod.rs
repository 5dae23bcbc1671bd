//! Ops commands for cluster maintenance

pub mod repair;
pub mod verify;

pub use repair::{repair_cluster, RepairReport};
pub use verify::{verify_cluster, VerifyIssue, VerifyReport};
