//! Configuration for replistore components
//!
//! Values come from serde defaults, then an optional TOML file, then
//! `REPLISTORE__*` environment variables (double underscore separates
//! nesting, e.g. `REPLISTORE__ORCHESTRATOR__CACHE_CAPACITY=500`).

use crate::common::retry::RetryPolicy;
use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "REPLISTORE";

/// Global configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Orchestrator tuning (cache, timeouts, quorum)
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Worker group layout
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Durable key-index backend
    #[serde(default)]
    pub index: IndexConfig,

    /// Authentication service settings
    #[serde(default)]
    pub auth: AuthConfig,

    /// Reconnect policies for external dependencies
    #[serde(default)]
    pub retry: RetryConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// How many acknowledgements a group needs before a write counts as durable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuorumPolicy {
    /// More than half of the live members
    #[default]
    Majority,
    /// Every live member
    AllLive,
}

impl QuorumPolicy {
    /// Acknowledgements required out of `live` members
    pub fn required(&self, live: usize) -> usize {
        match self {
            QuorumPolicy::Majority => live / 2 + 1,
            QuorumPolicy::AllLive => live,
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum number of payloads held by the FIFO cache
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Upper bound on a single worker command round-trip
    #[serde(default = "default_worker_timeout")]
    pub worker_timeout_ms: u64,

    /// Acknowledgement threshold per group
    #[serde(default)]
    pub quorum: QuorumPolicy,
}

fn default_cache_capacity() -> usize {
    100
}
fn default_worker_timeout() -> u64 {
    2_000
}

impl OrchestratorConfig {
    pub fn worker_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_timeout_ms)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            worker_timeout_ms: default_worker_timeout(),
            quorum: QuorumPolicy::default(),
        }
    }
}

/// Worker group layout for an in-process cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default = "default_primary_group")]
    pub primary_group: String,

    #[serde(default = "default_replica_group")]
    pub replica_group: String,

    /// Workers started in each group
    #[serde(default = "default_workers_per_group")]
    pub workers_per_group: usize,

    /// Capacity of each worker's command channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_primary_group() -> String {
    "primary".to_string()
}
fn default_replica_group() -> String {
    "replica".to_string()
}
fn default_workers_per_group() -> usize {
    3
}
fn default_channel_capacity() -> usize {
    256
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            primary_group: default_primary_group(),
            replica_group: default_replica_group(),
            workers_per_group: default_workers_per_group(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    #[default]
    Memory,
    Sled,
}

/// Durable key-index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub backend: IndexBackend,

    /// Database directory (sled backend only)
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./replistore-index")
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::default(),
            path: default_index_path(),
        }
    }
}

/// Authentication service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for issued tokens
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    /// Token lifetime
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
}

fn default_jwt_secret() -> String {
    "replistore-default-secret-change-in-production".to_string()
}
fn default_token_ttl() -> u64 {
    24 * 3600
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            token_ttl_secs: default_token_ttl(),
        }
    }
}

/// Retry policies for startup connections and steady-state calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "RetryPolicy::startup")]
    pub startup: RetryPolicy,

    #[serde(default = "RetryPolicy::steady_state")]
    pub steady_state: RetryPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            startup: RetryPolicy::startup(),
            steady_state: RetryPolicy::steady_state(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the orchestrator cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.orchestrator.cache_capacity == 0 {
            return Err(Error::InvalidConfig(
                "orchestrator.cache_capacity must be at least 1".into(),
            ));
        }
        if self.orchestrator.worker_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "orchestrator.worker_timeout_ms must be positive".into(),
            ));
        }
        if self.cluster.primary_group == self.cluster.replica_group {
            return Err(Error::InvalidConfig(format!(
                "primary and replica groups share the name {}",
                self.cluster.primary_group
            )));
        }
        if self.cluster.channel_capacity == 0 {
            return Err(Error::InvalidConfig(
                "cluster.channel_capacity must be at least 1".into(),
            ));
        }
        self.retry.startup.validate("retry.startup")?;
        self.retry.steady_state.validate("retry.steady_state")?;
        Ok(())
    }
}
