//! Append-only commit log of a group
//!
//! An entry is appended only after the group's fan-out for that command
//! reached quorum; `commit_index` is the 1-based index of the newest entry.

use crate::common::ContentId;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Store,
    Delete,
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Store => write!(f, "store"),
            OpKind::Delete => write!(f, "delete"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogPayload {
    Data(Bytes),
    Tombstone,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub index: u64,
    pub term: u64,
    pub op: OpKind,
    pub content_id: ContentId,
    pub payload: LogPayload,
    pub committed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct CommitLog {
    entries: Vec<LogEntry>,
    commit_index: u64,
}

impl CommitLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a committed operation and advance the commit index
    pub fn append(
        &mut self,
        term: u64,
        op: OpKind,
        content_id: ContentId,
        payload: LogPayload,
    ) -> &LogEntry {
        self.commit_index += 1;
        self.entries.push(LogEntry {
            index: self.commit_index,
            term,
            op,
            content_id,
            payload,
            committed_at: Utc::now(),
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn commit_index(&self) -> u64 {
        self.commit_index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Every entry touching `content_id`, oldest first
    pub fn history(&self, content_id: &ContentId) -> Vec<&LogEntry> {
        self.entries
            .iter()
            .filter(|e| &e.content_id == content_id)
            .collect()
    }
}
