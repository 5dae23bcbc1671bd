//! Commands delivered to workers and their acknowledgements

use crate::common::{ContentId, Result};
use crate::worker::node::WorkerSnapshot;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerCommand {
    Store {
        content_id: ContentId,
        data: Bytes,
        owner: String,
        name: String,
    },
    Delete {
        content_id: ContentId,
    },
    /// Full state transfer from a healthy member
    Sync {
        snapshot: WorkerSnapshot,
    },
}

impl WorkerCommand {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerCommand::Store { .. } => "store",
            WorkerCommand::Delete { .. } => "delete",
            WorkerCommand::Sync { .. } => "sync",
        }
    }

    pub fn content_id(&self) -> Option<&ContentId> {
        match self {
            WorkerCommand::Store { content_id, .. } | WorkerCommand::Delete { content_id } => {
                Some(content_id)
            }
            WorkerCommand::Sync { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandAck {
    /// `fresh` is false when the item was already present or tombstoned
    Stored { fresh: bool },
    Deleted { was_present: bool },
    Synced { entries: usize },
}

/// Unit of delivery on a worker channel
#[derive(Debug)]
pub struct Envelope {
    pub command: WorkerCommand,
    /// Present when the publisher waits for the acknowledgement
    pub reply: Option<oneshot::Sender<Result<CommandAck>>>,
}

impl Envelope {
    pub fn fire_and_forget(command: WorkerCommand) -> Self {
        Self {
            command,
            reply: None,
        }
    }

    pub fn with_reply(command: WorkerCommand) -> (Self, oneshot::Receiver<Result<CommandAck>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                command,
                reply: Some(tx),
            },
            rx,
        )
    }
}
