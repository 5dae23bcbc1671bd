//! Recovery: the ownership index is rebuilt from the durable key index

#![deny(unused_must_use)]

use bytes::Bytes;
use replistore::common::{Config, IndexBackend, RetryPolicy};
use replistore::services::{KeyIndex, SledKeyIndex};
use replistore::LocalCluster;
use std::sync::Arc;
use tempfile::TempDir;

fn config() -> Config {
    let mut config = Config::default();
    config.retry.startup = RetryPolicy::none();
    config
}

#[tokio::test]
async fn test_restart_restores_ownership_and_search() {
    let dir = TempDir::new().unwrap();
    let index = Arc::new(SledKeyIndex::open(dir.path().join("index")).unwrap());

    let (kept, dropped) = {
        let cluster = LocalCluster::bootstrap_with_index(&config(), index.clone())
            .await
            .unwrap();
        let orch = &cluster.orchestrator;
        let kept = orch
            .upload(Bytes::from_static(b"keep"), "keep.txt", "alice")
            .await
            .unwrap();
        let dropped = orch
            .upload(Bytes::from_static(b"drop"), "drop.txt", "alice")
            .await
            .unwrap();
        assert!(orch.delete(&dropped, "alice").await.unwrap());
        cluster.shutdown().await.unwrap();
        (kept, dropped)
    };
    index.flush().await.unwrap();

    // workers are in-memory, so only the index survives
    let cluster = LocalCluster::bootstrap_with_index(&config(), index.clone())
        .await
        .unwrap();
    let orch = &cluster.orchestrator;

    let listed = orch.list("alice").await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].content_id, kept);
    assert_eq!(listed[0].name, "keep.txt");
    assert_eq!(orch.search("keep", "alice").await.len(), 1);
    assert!(orch.search("drop", "alice").await.is_empty());
    assert!(!orch.delete(&dropped, "alice").await.unwrap());
    assert!(orch.list("bob").await.is_empty());
    assert_eq!(orch.status().await.indexed_items, 1);
}

#[tokio::test]
async fn test_sled_backend_from_config() {
    let dir = TempDir::new().unwrap();
    let mut config = config();
    config.index.backend = IndexBackend::Sled;
    config.index.path = dir.path().join("index");

    let cluster = LocalCluster::bootstrap(&config).await.unwrap();
    let id = cluster
        .orchestrator
        .upload(Bytes::from_static(b"x"), "x", "alice")
        .await
        .unwrap();
    cluster.shutdown().await.unwrap();

    let index = SledKeyIndex::open(&config.index.path).unwrap();
    let record = index.get(&id).await.unwrap().unwrap();
    assert_eq!(record.owner, "alice");
    assert_eq!(record.size, 1);
}

#[tokio::test]
async fn test_restore_replaces_in_memory_view() {
    let dir = TempDir::new().unwrap();
    let index = Arc::new(SledKeyIndex::open(dir.path().join("index")).unwrap());
    let cluster = LocalCluster::bootstrap_with_index(&config(), index.clone())
        .await
        .unwrap();
    let orch = &cluster.orchestrator;

    let id = orch
        .upload(Bytes::from_static(b"x"), "x", "alice")
        .await
        .unwrap();
    index.remove(&id).await.unwrap();

    assert_eq!(orch.list("alice").await.len(), 1);
    assert_eq!(orch.restore().await.unwrap(), 0);
    assert!(orch.list("alice").await.is_empty());
}
