//! Group leadership state
//!
//! This is a single-candidate promotion primitive used by failover: a vote
//! always increments the term and is granted only when the candidate is the
//! group itself. It is not a quorum election between independent processes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupRole {
    Follower,
    Leader,
}

impl std::fmt::Display for GroupRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupRole::Follower => write!(f, "follower"),
            GroupRole::Leader => write!(f, "leader"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ElectionState {
    group_id: String,
    term: u64,
    role: GroupRole,
    voted_for: Option<String>,
}

impl ElectionState {
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            term: 0,
            role: GroupRole::Follower,
            voted_for: None,
        }
    }

    /// Start a new term and grant leadership iff `candidate_id` is this group
    pub fn request_vote(&mut self, candidate_id: &str) -> bool {
        self.term += 1;
        self.voted_for = Some(candidate_id.to_string());
        self.role = if candidate_id == self.group_id {
            GroupRole::Leader
        } else {
            GroupRole::Follower
        };
        self.is_leader()
    }

    /// Health-driven override, term unchanged
    pub fn set_leader(&mut self, leader: bool) {
        self.role = if leader {
            GroupRole::Leader
        } else {
            GroupRole::Follower
        };
    }

    pub fn is_leader(&self) -> bool {
        matches!(self.role, GroupRole::Leader)
    }

    pub fn role(&self) -> GroupRole {
        self.role
    }

    pub fn term(&self) -> u64 {
        self.term
    }

    pub fn voted_for(&self) -> Option<&str> {
        self.voted_for.as_deref()
    }
}
