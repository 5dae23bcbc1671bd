//! Error types for replistore

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Lookup Errors ===
    /// Unknown and unauthorized identifiers are reported the same way.
    #[error("Content not found: {0}")]
    NotFound(String),

    // === Replication Errors ===
    #[error("Replication failed in group {group}: {reason}")]
    Replication { group: String, reason: String },

    #[error("Worker unavailable: {0}")]
    WorkerUnavailable(String),

    // === Membership / Identity Errors ===
    #[error("Already registered: {0}")]
    DuplicateRegistration(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // === Dependency Errors ===
    #[error("Dependency {dependency} unavailable: {reason}")]
    DependencyUnavailable { dependency: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // === Generic ===
    #[error("Operation timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_)
                | Error::DependencyUnavailable { .. }
                | Error::Storage(_)
                | Error::Io(_)
        )
    }

    /// Shorthand for a group-level replication failure
    pub fn replication(group: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Replication {
            group: group.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for an unreachable external service
    pub fn dependency(dependency: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::DependencyUnavailable {
            dependency: dependency.into(),
            reason: reason.into(),
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}
