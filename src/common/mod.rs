//! Common utilities and types shared across replistore

pub mod config;
pub mod error;
pub mod hash;
pub mod retry;
pub mod utils;

pub use config::{
    AuthConfig, ClusterConfig, Config, IndexBackend, IndexConfig, OrchestratorConfig,
    QuorumPolicy, RetryConfig,
};
pub use error::{Error, Result};
pub use hash::{blake3_hash, ContentId};
pub use retry::{connect_with_retry, retry_with_backoff, RetryPolicy};
pub use utils::{format_bytes, validate_name, NodeState};
