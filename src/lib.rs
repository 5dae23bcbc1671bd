//! # replistore
//!
//! A replicated file-storage coordinator with:
//! - Content-addressed items (BLAKE3) with per-user ownership
//! - Replication into primary and replica worker groups with quorum acks
//! - Bounded FIFO content cache in front of the workers
//! - Manual failover with group leader promotion
//! - Workers joining either group at runtime
//! - Durable key index (sled) restored at startup
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              Orchestrator               │
//! │  ownership index · FIFO cache · auth    │
//! └──────┬──────────────────────┬───────────┘
//!        │ key index            │ message bus
//!   ┌────▼─────┐      ┌─────────┴──────────┐
//!   │  sled    │      │                    │
//!   └──────────┘ ┌────▼────────┐   ┌───────▼──────┐
//!                │ Primary     │   │ Replica      │
//!                │ w0 w1 w2    │   │ w0 w1 w2     │
//!                │ + commit log│   │ + commit log │
//!                └─────────────┘   └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start an in-process cluster with a console
//! ```bash
//! replistore-coord serve \
//!   --config ./replistore.toml \
//!   --workers 3 \
//!   --cache-capacity 100
//! ```
//!
//! ### Console
//! ```text
//! > register alice secret-pw
//! > upload <token> ./report.pdf
//! > search <token> report
//! > kill primary-w1
//! > join replica
//! > repair
//! > failover
//! > verify
//! ```

#![allow(clippy::result_large_err)]
#![deny(unused_must_use)]

pub mod common;
pub mod coordinator;
pub mod group;
pub mod ops;
pub mod services;
pub mod worker;

// Re-export commonly used types
pub use common::{Config, ContentId, Error, Result};
pub use coordinator::{FileEntry, GroupKind, LocalCluster, Orchestrator, Services};
pub use group::Group;
pub use worker::Worker;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
