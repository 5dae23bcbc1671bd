//! Integration tests for replistore: client operations end to end

#![deny(unused_must_use)]

use bytes::Bytes;
use replistore::common::{Config, RetryPolicy};
use replistore::{ContentId, Error, LocalCluster};
use tokio_test::{assert_err, assert_ok};

async fn cluster() -> LocalCluster {
    let mut config = Config::default();
    config.retry.startup = RetryPolicy::none();
    LocalCluster::bootstrap(&config).await.unwrap()
}

#[tokio::test]
async fn test_hello_lifecycle() {
    let cluster = cluster().await;
    let orch = &cluster.orchestrator;

    let h1 = orch
        .upload(Bytes::from_static(b"hello"), "a.txt", "alice")
        .await
        .unwrap();
    assert_eq!(
        orch.download(&h1, "alice").await.unwrap(),
        (Bytes::from_static(b"hello"), "a.txt".to_string())
    );
    assert!(matches!(
        orch.download(&h1, "bob").await,
        Err(Error::NotFound(_))
    ));
    assert!(orch.delete(&h1, "alice").await.unwrap());
    assert!(matches!(
        orch.download(&h1, "alice").await,
        Err(Error::NotFound(_))
    ));

    cluster.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_roundtrip_various_payloads() {
    let cluster = cluster().await;
    let orch = &cluster.orchestrator;

    let payloads: Vec<(Vec<u8>, &str)> = vec![
        (Vec::new(), "empty.bin"),
        (vec![0u8; 1], "one byte"),
        ((0..=255u8).collect(), "all-bytes.bin"),
        (vec![7u8; 256 * 1024], "big.dat"),
        ("ünïcødé".as_bytes().to_vec(), "名前.txt"),
    ];
    for (data, name) in payloads {
        let id = orch
            .upload(Bytes::from(data.clone()), name, "alice")
            .await
            .unwrap();
        let (got, got_name) = orch.download(&id, "alice").await.unwrap();
        assert_eq!(got.as_ref(), data.as_slice());
        assert_eq!(got_name, name);
    }
}

#[tokio::test]
async fn test_same_content_gets_distinct_ids() {
    let cluster = cluster().await;
    let orch = &cluster.orchestrator;

    let a = orch
        .upload(Bytes::from_static(b"same"), "same.txt", "alice")
        .await
        .unwrap();
    let b = orch
        .upload(Bytes::from_static(b"same"), "same.txt", "alice")
        .await
        .unwrap();
    assert_ne!(a, b);
    assert_eq!(orch.list("alice").await.len(), 2);
}

#[tokio::test]
async fn test_unknown_and_foreign_ids() {
    let cluster = cluster().await;
    let orch = &cluster.orchestrator;

    let id = orch
        .upload(Bytes::from_static(b"x"), "x", "alice")
        .await
        .unwrap();
    let unknown = ContentId::from("0".repeat(64));

    assert!(!assert_ok!(orch.delete(&unknown, "alice").await));
    assert!(!assert_ok!(orch.delete(&id, "bob").await));
    assert_err!(orch.download(&unknown, "alice").await);
    assert!(matches!(
        orch.update(&id, Bytes::new(), "bob").await,
        Err(Error::NotFound(_))
    ));

    // still intact for the owner
    assert!(orch.download(&id, "alice").await.is_ok());
}

#[tokio::test]
async fn test_update_replaces_identity() {
    let cluster = cluster().await;
    let orch = &cluster.orchestrator;

    let old = orch
        .upload(Bytes::from_static(b"draft"), "essay.md", "alice")
        .await
        .unwrap();
    let new = orch
        .update(&old, Bytes::from_static(b"final"), "alice")
        .await
        .unwrap();

    assert_ne!(old, new);
    assert!(orch.download(&old, "alice").await.is_err());
    assert!(!orch.delete(&old, "alice").await.unwrap());
    assert_eq!(
        orch.download(&new, "alice").await.unwrap(),
        (Bytes::from_static(b"final"), "essay.md".to_string())
    );

    for worker in cluster.workers() {
        assert!(!worker.holds(&old).await);
        assert!(worker.holds(&new).await);
    }
}

#[tokio::test]
async fn test_search_and_list_are_scoped_to_owner() {
    let cluster = cluster().await;
    let orch = &cluster.orchestrator;

    for (name, user) in [
        ("report-2023.pdf", "alice"),
        ("report-2024.pdf", "alice"),
        ("Report-final.pdf", "alice"),
        ("notes.txt", "alice"),
        ("report-secret.pdf", "bob"),
    ] {
        orch.upload(Bytes::from(name.as_bytes().to_vec()), name, user)
            .await
            .unwrap();
    }

    let hits: Vec<String> = orch
        .search("report", "alice")
        .await
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(hits, vec!["report-2023.pdf", "report-2024.pdf"]);

    assert_eq!(orch.search("", "alice").await.len(), 4);
    assert_eq!(orch.list("alice").await, orch.search("", "alice").await);
    assert_eq!(orch.list("bob").await.len(), 1);
    assert!(orch.search("notes", "bob").await.is_empty());
    assert!(orch.list("carol").await.is_empty());
}

#[tokio::test]
async fn test_every_live_worker_holds_identical_copy() {
    let cluster = cluster().await;
    let orch = &cluster.orchestrator;

    let id = orch
        .upload(Bytes::from_static(b"replicated"), "r.bin", "alice")
        .await
        .unwrap();

    for group in [orch.primary().await, orch.replica().await] {
        for worker in group.members().await {
            let blob = worker.retrieve(&id).await.unwrap();
            assert_eq!(blob.data, Bytes::from_static(b"replicated"));
            assert_eq!(blob.owner, "alice");
            assert_eq!(blob.name, "r.bin");
        }
        assert_eq!(group.commit_index().await, 1);
    }
}

#[tokio::test]
async fn test_cache_bound_with_worker_fallback() {
    let mut config = Config::default();
    config.retry.startup = RetryPolicy::none();
    config.orchestrator.cache_capacity = 4;
    let cluster = LocalCluster::bootstrap(&config).await.unwrap();
    let orch = &cluster.orchestrator;

    let mut ids = Vec::new();
    for n in 0..5u8 {
        ids.push(
            orch.upload(Bytes::from(vec![n; 4]), &format!("f{}", n), "alice")
                .await
                .unwrap(),
        );
    }

    let cached = orch.cached_ids().await;
    assert_eq!(cached.len(), 4);
    assert!(!cached.contains(&ids[0]));
    assert_eq!(cached, ids[1..].to_vec());

    let (data, name) = orch.download(&ids[0], "alice").await.unwrap();
    assert_eq!(data, Bytes::from(vec![0u8; 4]));
    assert_eq!(name, "f0");
    assert_eq!(orch.status().await.cache.len, 4);
}

#[tokio::test]
async fn test_status_serializes() {
    let cluster = cluster().await;
    let orch = &cluster.orchestrator;
    orch.upload(Bytes::from_static(b"x"), "x", "alice")
        .await
        .unwrap();

    let status = orch.status().await;
    assert_eq!(status.indexed_items, 1);
    assert_eq!(status.indexed_users, 1);
    assert_eq!(status.primary.members.len(), 3);

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["primary"]["group_id"], "primary");
    assert_eq!(json["primary"]["role"], "leader");
    assert_eq!(json["primary"]["voted_for"], "primary");
    assert!(json["replica"]["voted_for"].is_null());
    assert_eq!(json["replica"]["role"], "follower");
    assert_eq!(json["primary"]["members"][0]["state"], "alive");
    assert_eq!(json["cache"]["capacity"], 100);
}

mod slow_index {
    use async_trait::async_trait;
    use bytes::Bytes;
    use replistore::common::{Config, ContentId, Result, RetryPolicy};
    use replistore::services::{IndexRecord, KeyIndex, MemoryKeyIndex};
    use replistore::{Error, LocalCluster};
    use std::sync::Arc;
    use std::time::Duration;

    /// Memory index whose removals take a while, as a remote store would
    struct SlowKeyIndex {
        inner: MemoryKeyIndex,
        delay: Duration,
    }

    #[async_trait]
    impl KeyIndex for SlowKeyIndex {
        async fn put(&self, record: &IndexRecord) -> Result<()> {
            self.inner.put(record).await
        }

        async fn remove(&self, content_id: &ContentId) -> Result<Option<IndexRecord>> {
            tokio::time::sleep(self.delay).await;
            self.inner.remove(content_id).await
        }

        async fn get(&self, content_id: &ContentId) -> Result<Option<IndexRecord>> {
            self.inner.get(content_id).await
        }

        async fn records(&self) -> Result<Vec<IndexRecord>> {
            self.inner.records().await
        }

        async fn health_check(&self) -> Result<()> {
            self.inner.health_check().await
        }
    }

    async fn cluster() -> LocalCluster {
        let mut config = Config::default();
        config.retry.startup = RetryPolicy::none();
        let index = Arc::new(SlowKeyIndex {
            inner: MemoryKeyIndex::new(),
            delay: Duration::from_millis(50),
        });
        LocalCluster::bootstrap_with_index(&config, index).await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_deletes_report_one_success() {
        let cluster = cluster().await;
        let orch = cluster.orchestrator.clone();
        let id = orch
            .upload(Bytes::from_static(b"contested"), "c.txt", "alice")
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            tokio::spawn({
                let orch = orch.clone();
                let id = id.clone();
                async move { orch.delete(&id, "alice").await.unwrap() }
            }),
            tokio::spawn({
                let orch = orch.clone();
                let id = id.clone();
                async move { orch.delete(&id, "alice").await.unwrap() }
            }),
        );
        assert!(a.unwrap() ^ b.unwrap());
        assert!(orch.list("alice").await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_updates_create_one_replacement() {
        let cluster = cluster().await;
        let orch = cluster.orchestrator.clone();
        let id = orch
            .upload(Bytes::from_static(b"v1"), "doc.md", "alice")
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            tokio::spawn({
                let orch = orch.clone();
                let id = id.clone();
                async move { orch.update(&id, Bytes::from_static(b"v2a"), "alice").await }
            }),
            tokio::spawn({
                let orch = orch.clone();
                let id = id.clone();
                async move { orch.update(&id, Bytes::from_static(b"v2b"), "alice").await }
            }),
        );
        let results = [a.unwrap(), b.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(Error::NotFound(_)))));

        let owned = orch.list("alice").await;
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].name, "doc.md");
        assert_ne!(owned[0].content_id, id);
    }
}
