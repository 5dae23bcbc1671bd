//! Ownership and name index
//!
//! In-memory view of the durable key index:
//! - user id → owned content ids
//! - display name → content ids (one name may map to many ids)
//! - content id → record
//!
//! Rebuilt from the key index at startup.

use crate::common::ContentId;
use crate::services::IndexRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// What search and list return for one item
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileEntry {
    pub content_id: ContentId,
    pub name: String,
}

#[derive(Debug, Default)]
pub struct OwnershipIndex {
    owners: HashMap<String, BTreeSet<ContentId>>,
    names: BTreeMap<String, BTreeSet<ContentId>>,
    records: HashMap<ContentId, IndexRecord>,
}

impl OwnershipIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = IndexRecord>) -> Self {
        let mut index = Self::new();
        for record in records {
            index.insert(record);
        }
        index
    }

    pub fn insert(&mut self, record: IndexRecord) {
        if self.records.contains_key(&record.content_id) {
            self.remove(&record.content_id);
        }
        self.owners
            .entry(record.owner.clone())
            .or_default()
            .insert(record.content_id.clone());
        self.names
            .entry(record.name.clone())
            .or_default()
            .insert(record.content_id.clone());
        self.records.insert(record.content_id.clone(), record);
    }

    pub fn remove(&mut self, content_id: &ContentId) -> Option<IndexRecord> {
        let record = self.records.remove(content_id)?;

        if let Some(owned) = self.owners.get_mut(&record.owner) {
            owned.remove(content_id);
            if owned.is_empty() {
                self.owners.remove(&record.owner);
            }
        }
        if let Some(ids) = self.names.get_mut(&record.name) {
            ids.remove(content_id);
            if ids.is_empty() {
                self.names.remove(&record.name);
            }
        }
        Some(record)
    }

    pub fn owns(&self, user_id: &str, content_id: &ContentId) -> bool {
        self.owners
            .get(user_id)
            .is_some_and(|owned| owned.contains(content_id))
    }

    pub fn get(&self, content_id: &ContentId) -> Option<&IndexRecord> {
        self.records.get(content_id)
    }

    /// Owned items whose name contains `query` (case-sensitive), by name then id
    pub fn search(&self, user_id: &str, query: &str) -> Vec<FileEntry> {
        let Some(owned) = self.owners.get(user_id) else {
            return Vec::new();
        };
        self.names
            .iter()
            .filter(|(name, _)| name.contains(query))
            .flat_map(|(name, ids)| {
                ids.intersection(owned).map(move |id| FileEntry {
                    content_id: id.clone(),
                    name: name.clone(),
                })
            })
            .collect()
    }

    /// Every owned item, by name then id
    pub fn list(&self, user_id: &str) -> Vec<FileEntry> {
        let Some(owned) = self.owners.get(user_id) else {
            return Vec::new();
        };
        let mut entries: Vec<FileEntry> = owned
            .iter()
            .filter_map(|id| self.records.get(id))
            .map(|record| FileEntry {
                content_id: record.content_id.clone(),
                name: record.name.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.content_id.cmp(&b.content_id)));
        entries
    }

    pub fn records(&self) -> impl Iterator<Item = &IndexRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn users(&self) -> usize {
        self.owners.len()
    }
}
