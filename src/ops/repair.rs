//! Repair degraded group members
//!
//! A member is degraded when it missed a write (failed call, timeout, or it
//! was dead and has been revived). Repair resyncs each degraded live member
//! from a healthy peer in its group.

use crate::common::Result;
use crate::coordinator::Orchestrator;
use serde::Serialize;

#[derive(Debug, Default, Serialize)]
pub struct RepairReport {
    pub members_checked: usize,
    pub members_repaired: usize,
    pub entries_copied: usize,
    /// `group/worker` pairs that would be resynced (dry run)
    pub planned: Vec<String>,
    pub failed: Vec<String>,
}

pub async fn repair_cluster(orchestrator: &Orchestrator, dry_run: bool) -> Result<RepairReport> {
    tracing::info!("Starting cluster repair (dry_run={})", dry_run);

    let mut report = RepairReport::default();
    for group in [orchestrator.primary().await, orchestrator.replica().await] {
        for worker_id in group.degraded_members().await {
            report.members_checked += 1;

            let alive = group
                .member(&worker_id)
                .await
                .is_some_and(|worker| worker.is_alive());
            if !alive {
                tracing::debug!("Skipping dead member {}/{}", group.id(), worker_id);
                continue;
            }

            let label = format!("{}/{}", group.id(), worker_id);
            if dry_run {
                report.planned.push(label);
                continue;
            }

            match group.resync_member(&worker_id).await {
                Ok(entries) => {
                    report.members_repaired += 1;
                    report.entries_copied += entries;
                }
                Err(e) => {
                    tracing::warn!("Repair of {} failed: {}", label, e);
                    report.failed.push(label);
                }
            }
        }
    }

    tracing::info!(
        "Repair done: {} checked, {} repaired, {} entries copied",
        report.members_checked,
        report.members_repaired,
        report.entries_copied
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Config, RetryPolicy};
    use crate::coordinator::LocalCluster;
    use crate::ops::verify_cluster;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_repair_resyncs_revived_member() {
        let mut config = Config::default();
        config.retry.startup = RetryPolicy::none();
        let cluster = LocalCluster::bootstrap(&config).await.unwrap();
        let orchestrator = &cluster.orchestrator;
        let replica = orchestrator.replica().await;

        replica.kill_member("replica-w0").await.unwrap();
        let id = orchestrator
            .upload(Bytes::from_static(b"data"), "a.txt", "alice")
            .await
            .unwrap();
        replica.revive_member("replica-w0").await.unwrap();
        assert!(!cluster.worker("replica-w0").unwrap().holds(&id).await);

        let plan = repair_cluster(orchestrator, true).await.unwrap();
        assert_eq!(plan.planned, vec!["replica/replica-w0".to_string()]);
        assert_eq!(plan.members_repaired, 0);

        let report = repair_cluster(orchestrator, false).await.unwrap();
        assert_eq!(report.members_repaired, 1);
        assert_eq!(report.entries_copied, 1);
        assert!(report.failed.is_empty());
        assert!(cluster.worker("replica-w0").unwrap().holds(&id).await);

        assert!(verify_cluster(orchestrator).await.unwrap().is_consistent());
        assert_eq!(repair_cluster(orchestrator, false).await.unwrap().members_checked, 0);
    }
}
