//! Storage workers
//!
//! A worker keeps content in a local map and applies `store` / `delete` /
//! `sync` commands delivered over the message bus:
//! - commands are idempotent (at-least-once delivery)
//! - dead workers neither serve reads nor accept commands
//! - `sync` is a full state transfer from a healthy peer

pub mod command;
pub mod node;
pub mod runner;

pub use command::{CommandAck, Envelope, WorkerCommand};
pub use node::{StoredBlob, Worker, WorkerSnapshot};
pub use runner::WorkerRunner;
