//! External collaborators of the orchestrator
//!
//! Each service is consumed through a trait so deployments can plug in real
//! backends. The crate ships in-process implementations:
//! - [`LocalAuth`]: argon2 password hashes, HS256 tokens
//! - [`MemoryKeyIndex`] / [`SledKeyIndex`]: content id → name and owner records
//! - [`LocalBus`]: per-worker tokio channels with acknowledgements
//! - [`MemoryCache`]: shared content cache

pub mod auth;
pub mod bus;
pub mod cache;
pub mod key_index;

pub use auth::LocalAuth;
pub use bus::{LocalBus, Subscription};
pub use cache::MemoryCache;
pub use key_index::{IndexRecord, MemoryKeyIndex, SledKeyIndex};

use crate::common::{ContentId, Result};
use crate::worker::{CommandAck, WorkerCommand};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Credential storage and token issuance
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Resolve a token to its user id
    async fn verify(&self, token: &str) -> Result<Option<String>>;

    /// Create an account and return a token; existing usernames yield
    /// [`crate::Error::DuplicateRegistration`]
    async fn register(&self, username: &str, password: &str) -> Result<String>;

    /// Exchange credentials for a token
    async fn login(&self, username: &str, password: &str) -> Result<Option<String>>;

    async fn health_check(&self) -> Result<()>;
}

/// Durable record of every live item, keyed by content id
#[async_trait]
pub trait KeyIndex: Send + Sync {
    async fn put(&self, record: &IndexRecord) -> Result<()>;

    async fn remove(&self, content_id: &ContentId) -> Result<Option<IndexRecord>>;

    async fn get(&self, content_id: &ContentId) -> Result<Option<IndexRecord>>;

    /// Every record, ordered by content id
    async fn records(&self) -> Result<Vec<IndexRecord>>;

    async fn health_check(&self) -> Result<()>;
}

/// Address of one worker channel: the group it serves plus its identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Topic {
    pub group: String,
    pub worker_id: String,
}

impl Topic {
    pub fn new(group: impl Into<String>, worker_id: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            worker_id: worker_id.into(),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.worker_id)
    }
}

/// Per-worker command delivery (at-least-once)
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Open the receiving side of a topic; one subscriber per topic
    async fn subscribe(&self, topic: &Topic) -> Result<Subscription>;

    async fn unsubscribe(&self, topic: &Topic) -> Result<()>;

    /// Deliver without waiting for the worker
    async fn publish(&self, topic: &Topic, command: WorkerCommand) -> Result<()>;

    /// Deliver and wait for the worker's acknowledgement
    async fn request(&self, topic: &Topic, command: WorkerCommand) -> Result<CommandAck>;

    async fn health_check(&self) -> Result<()>;
}

/// Optional shared cache in front of the workers
#[async_trait]
pub trait ExternalCache: Send + Sync {
    async fn get(&self, content_id: &ContentId) -> Result<Option<Bytes>>;

    async fn set(&self, content_id: &ContentId, data: Bytes) -> Result<()>;

    async fn delete(&self, content_id: &ContentId) -> Result<()>;

    async fn health_check(&self) -> Result<()>;
}
