//! Integration tests for the sync engine against in-memory and etcd stores.

use cfgwatch_store::{
    ChangeAction, EtcdConfig, EtcdStore, HttpClient, HttpRequest, HttpResponse, MemoryStore,
    RemoteStore, StoreError, TransportError,
};
use cfgwatch_sync::{
    build_key, Snapshot, SyncConfig, SyncEngine, SyncError, SyncOutcome, SyncState, CONFIG_ROOT,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

fn key(variable: &str) -> String {
    build_key(CONFIG_ROOT, "web1", variable)
}

fn settings(snapshot: &Snapshot) -> Vec<(String, String)> {
    snapshot
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

#[tokio::test]
async fn walkthrough_then_cancel() {
    let store = MemoryStore::with_entries([(key("timeout"), "30"), (key("retries"), "3")]);
    store.write(&build_key(CONFIG_ROOT, "db1", "pool"), "8").await.unwrap();

    let mut engine = SyncEngine::new(SyncConfig::new("web1"), store.clone());
    let handle = engine.cancel_handle();
    let mut snapshots = engine.subscribe();

    let driver = async move {
        snapshots.changed().await.unwrap();
        assert_eq!(
            settings(&snapshots.borrow_and_update()),
            pairs(&[("retries", "3"), ("timeout", "30")])
        );

        store.write(&key("timeout"), "60").await.unwrap();
        snapshots.changed().await.unwrap();
        assert_eq!(
            settings(&snapshots.borrow_and_update()),
            pairs(&[("retries", "3"), ("timeout", "60")])
        );

        store.delete(&key("retries")).unwrap();
        snapshots.changed().await.unwrap();
        assert_eq!(
            settings(&snapshots.borrow_and_update()),
            pairs(&[("timeout", "60")])
        );

        // Removal of a name the mirror never had.
        store.commit(ChangeAction::Expire, &key("missing"), None);
        snapshots.changed().await.unwrap();
        assert_eq!(
            settings(&snapshots.borrow_and_update()),
            pairs(&[("timeout", "60")])
        );

        handle.cancel();
    };

    let (outcome, _) = tokio::join!(engine.run(), driver);
    assert_eq!(outcome.unwrap(), SyncOutcome::Cancelled);
    assert_eq!(engine.state(), SyncState::Terminated);

    let stats = engine.stats();
    assert_eq!(stats.entries_loaded, 2);
    assert_eq!(stats.events_applied, 3);
    assert_eq!(stats.snapshots_published, 4);
    assert_eq!(settings(&engine.snapshot()), pairs(&[("timeout", "60")]));
}

#[tokio::test]
async fn fatal_fault_freezes_mirror() {
    let store = MemoryStore::with_entries([(key("timeout"), "30")]);
    let mut engine = SyncEngine::new(SyncConfig::new("web1"), store.clone());
    let mut snapshots = engine.subscribe();

    let driver = async {
        snapshots.changed().await.unwrap();
        store.write(&key("timeout"), "45").await.unwrap();
        snapshots.changed().await.unwrap();
        store.inject_watch_fault(StoreError::Unavailable {
            endpoints: 2,
            last_error: "connection refused".into(),
        });
    };

    let (result, _) = tokio::join!(engine.run(), driver);
    let err = result.unwrap_err();
    assert!(matches!(err, SyncError::Stream { ref server, .. } if server == "web1"));
    assert!(err.to_string().contains("web1"));
    assert_eq!(engine.state(), SyncState::Faulted);

    // Later commits never reach the mirror.
    store.write(&key("timeout"), "90").await.unwrap();
    assert_eq!(engine.mirror().get("timeout"), Some("45"));
    assert_eq!(engine.snapshot().get("timeout"), Some("45"));
}

#[tokio::test]
async fn missing_subtree_fails_initial_load() {
    let store = MemoryStore::with_entries([(build_key(CONFIG_ROOT, "db1", "pool"), "8")]);
    let mut engine = SyncEngine::new(SyncConfig::new("web1"), store);

    let err = engine.run().await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::InitialLoad {
            source: StoreError::NotFound { .. },
            ..
        }
    ));
    assert_eq!(engine.state(), SyncState::Faulted);
    assert!(engine.snapshot().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_reader_observes_final_state() {
    let store = MemoryStore::with_entries([(key("counter"), "0")]);
    let mut engine = SyncEngine::new(SyncConfig::new("web1"), store.clone());
    let handle = engine.cancel_handle();
    let mut snapshots = engine.subscribe();

    let reader = tokio::spawn(async move {
        let mut last = String::new();
        while snapshots.changed().await.is_ok() {
            let value = snapshots
                .borrow_and_update()
                .get("counter")
                .map(str::to_string)
                .unwrap_or_default();
            last = value.clone();
            if value == "5" {
                handle.cancel();
                break;
            }
        }
        last
    });

    let writer = tokio::spawn(async move {
        for i in 1..=5 {
            tokio::time::sleep(Duration::from_millis(2)).await;
            store.write(&key("counter"), &i.to_string()).await.unwrap();
        }
    });

    let outcome = tokio::time::timeout(Duration::from_secs(10), engine.run())
        .await
        .expect("session should be cancelled by the reader");
    assert_eq!(outcome.unwrap(), SyncOutcome::Cancelled);
    writer.await.unwrap();
    assert_eq!(reader.await.unwrap(), "5");
    assert_eq!(engine.mirror().get("counter"), Some("5"));
}

/// Serves canned etcd responses in order.
#[derive(Default)]
struct CannedEtcd {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl CannedEtcd {
    fn push(&self, status: u16, body: &str) {
        self.responses
            .lock()
            .push_back(HttpResponse::new(status, body.as_bytes()));
    }
}

impl HttpClient for CannedEtcd {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(request);
        let next = self.responses.lock().pop_front();
        match next {
            Some(response) => Ok(response),
            None => Err(TransportError::new("connection refused")),
        }
    }
}

#[tokio::test]
async fn etcd_session_retries_leader_election_and_ends_when_unreachable() {
    let etcd = Arc::new(CannedEtcd::default());
    etcd.responses.lock().push_back(
        HttpResponse::new(
            200,
            r#"{"action":"get","node":{"key":"/config/web1","dir":true,"nodes":[
                {"key":"/config/web1/timeout","value":"30","modifiedIndex":7},
                {"key":"/config/web1/retries","value":"3","modifiedIndex":8}
            ]}}"#
                .as_bytes(),
        )
        .with_header("X-Etcd-Index", "10"),
    );
    etcd.push(
        200,
        r#"{"action":"set","node":{"key":"/config/web1/timeout","value":"60","modifiedIndex":11}}"#,
    );
    etcd.push(
        500,
        r#"{"errorCode":301,"message":"During Leader Election","index":11}"#,
    );
    etcd.push(
        200,
        r#"{"action":"delete","node":{"key":"/config/web1/retries","modifiedIndex":14}}"#,
    );
    // Script exhausted: every endpoint is unreachable from here on.

    let store = EtcdStore::new(EtcdConfig::new(["http://127.0.0.1:2379"]), Arc::clone(&etcd));
    let mut engine = SyncEngine::new(SyncConfig::new("web1"), store);

    let err = engine.run().await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::Stream {
            source: StoreError::Unavailable { .. },
            ..
        }
    ));
    assert_eq!(settings(&engine.snapshot()), pairs(&[("timeout", "60")]));
    assert_eq!(engine.stats().transient_retries, 1);

    let wait_indexes: Vec<Option<String>> = etcd
        .requests
        .lock()
        .iter()
        .skip(1)
        .map(|request| request.query_param("waitIndex").map(str::to_string))
        .collect();
    assert_eq!(
        wait_indexes,
        vec![
            Some("11".to_string()),
            Some("12".to_string()),
            Some("12".to_string()),
            Some("15".to_string()),
        ]
    );
}
