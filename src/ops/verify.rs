//! Verify replica consistency
//!
//! Every indexed item should be present, byte-identical, on every live member
//! of both groups. Copies are compared by BLAKE3 digest against the most
//! common digest for that item. Items held by workers but absent from the
//! index are reported as orphans (a rolled-back upload whose discard did not
//! reach every member). Indexed items the durable key index no longer knows
//! are reported as unindexed: they would not survive a restart.

use crate::common::{blake3_hash, ContentId, Result};
use crate::coordinator::Orchestrator;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerifyIssue {
    Missing {
        group: String,
        worker_id: String,
        content_id: ContentId,
    },
    Divergent {
        group: String,
        worker_id: String,
        content_id: ContentId,
        expected: String,
        actual: String,
    },
    Orphaned {
        group: String,
        worker_id: String,
        content_id: ContentId,
    },
    Unindexed {
        content_id: ContentId,
    },
}

#[derive(Debug, Default, Serialize)]
pub struct VerifyReport {
    pub total_items: usize,
    pub healthy: usize,
    pub under_replicated: usize,
    pub divergent: usize,
    pub orphaned: usize,
    pub unindexed: usize,
    pub members_checked: usize,
    pub members_skipped: usize,
    pub issues: Vec<VerifyIssue>,
}

impl VerifyReport {
    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }
}

struct MemberView {
    group: String,
    worker_id: String,
    digests: HashMap<ContentId, String>,
}

pub async fn verify_cluster(orchestrator: &Orchestrator) -> Result<VerifyReport> {
    tracing::info!("Starting cluster verification");

    let records = orchestrator.records().await;
    let mut report = VerifyReport {
        total_items: records.len(),
        ..Default::default()
    };

    let mut views = Vec::new();
    for group in [orchestrator.primary().await, orchestrator.replica().await] {
        for worker in group.members().await {
            if !worker.is_alive() {
                report.members_skipped += 1;
                continue;
            }
            let snapshot = match worker.snapshot().await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", worker.id(), e);
                    report.members_skipped += 1;
                    continue;
                }
            };
            views.push(MemberView {
                group: group.id().to_string(),
                worker_id: worker.id().to_string(),
                digests: snapshot
                    .blobs
                    .iter()
                    .map(|(id, blob)| (id.clone(), blake3_hash(&blob.data)))
                    .collect(),
            });
            report.members_checked += 1;
        }
    }

    for record in &records {
        let id = &record.content_id;

        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for view in &views {
            if let Some(digest) = view.digests.get(id) {
                *counts.entry(digest.as_str()).or_default() += 1;
            }
        }
        // ties resolve to the smallest digest
        let expected = counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(digest, _)| digest.to_string());

        let mut missing = false;
        let mut diverged = false;
        for view in &views {
            match (view.digests.get(id), &expected) {
                (None, _) => {
                    missing = true;
                    report.issues.push(VerifyIssue::Missing {
                        group: view.group.clone(),
                        worker_id: view.worker_id.clone(),
                        content_id: id.clone(),
                    });
                }
                (Some(actual), Some(expected)) if actual != expected => {
                    diverged = true;
                    report.issues.push(VerifyIssue::Divergent {
                        group: view.group.clone(),
                        worker_id: view.worker_id.clone(),
                        content_id: id.clone(),
                        expected: expected.clone(),
                        actual: actual.clone(),
                    });
                }
                _ => {}
            }
        }

        if orchestrator.durable_record(id).await?.is_none() {
            report.unindexed += 1;
            report.issues.push(VerifyIssue::Unindexed {
                content_id: id.clone(),
            });
        }

        if missing {
            report.under_replicated += 1;
        }
        if diverged {
            report.divergent += 1;
        }
        if !missing && !diverged {
            report.healthy += 1;
        }
    }

    let indexed: BTreeSet<&ContentId> = records.iter().map(|r| &r.content_id).collect();
    let mut orphans = BTreeSet::new();
    for view in &views {
        let mut held: Vec<&ContentId> = view
            .digests
            .keys()
            .filter(|id| !indexed.contains(id))
            .collect();
        held.sort();
        for id in held {
            orphans.insert(id.clone());
            report.issues.push(VerifyIssue::Orphaned {
                group: view.group.clone(),
                worker_id: view.worker_id.clone(),
                content_id: id.clone(),
            });
        }
    }
    report.orphaned = orphans.len();

    tracing::info!(
        "Verification done: {} items, {} healthy, {} under-replicated, {} divergent, {} orphaned, {} unindexed",
        report.total_items,
        report.healthy,
        report.under_replicated,
        report.divergent,
        report.orphaned,
        report.unindexed
    );
    Ok(report)
}
