// Integration tests for staleness-driven refetching at subscribe time.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use querycore::prelude::*;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Profile {
    id: u32,
    name: String,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

fn seed_entry(dir: &TempDir, key: &str, data: serde_json::Value, last_updated: u64) {
    let entry = serde_json::json!({"data": data, "lastUpdated": last_updated});
    std::fs::write(
        dir.path().join(format!("QueryCore_{key}")),
        entry.to_string(),
    )
    .unwrap();
}

async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

#[tokio::test]
async fn test_stale_data_refetches_on_subscribe() {
    let dir = TempDir::new().unwrap();
    let seeded_at = now_millis() - 1_000;
    seed_entry(
        &dir,
        "p",
        serde_json::json!({"id": 1, "name": "old"}),
        seeded_at,
    );

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in_producer = Arc::clone(&calls);
    let core = QueryCore::new(
        CoreConfig::new()
            .with_cache_provider(ProviderKind::LocalKv)
            .with_data_dir(dir.path()),
    );
    core.define_endpoint(
        "p",
        move || {
            let calls = Arc::clone(&calls_in_producer);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Profile {
                    id: 1,
                    name: "new".to_string(),
                })
            }
        },
        EndpointOptions::new().with_refetch_after(Duration::from_millis(100)),
    )
    .await
    .unwrap();

    let seen: Arc<Mutex<Vec<EndpointState<Profile>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _handle = core
        .subscribe("p", move |state: EndpointState<Profile>| {
            sink.lock().unwrap().push(state);
        })
        .unwrap();

    let seen_for_wait = Arc::clone(&seen);
    wait_until("the refresh to settle", move || {
        seen_for_wait.lock().unwrap().len() >= 3
    })
    .await;

    // Stale snapshot first, then loading, then the fresh value.
    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].data.as_ref().unwrap().name, "old");
    assert!(!seen[0].is_loading);
    assert_eq!(seen[0].last_updated, Some(seeded_at));
    assert!(seen[1].is_loading);
    assert_eq!(seen[1].data.as_ref().unwrap().name, "old");
    assert!(!seen[2].is_loading);
    assert_eq!(seen[2].data.as_ref().unwrap().name, "new");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fresh_data_does_not_refetch_on_subscribe() {
    let dir = TempDir::new().unwrap();
    seed_entry(
        &dir,
        "p",
        serde_json::json!({"id": 1, "name": "cached"}),
        now_millis(),
    );

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in_producer = Arc::clone(&calls);
    let core = QueryCore::new(
        CoreConfig::new()
            .with_cache_provider(ProviderKind::LocalKv)
            .with_data_dir(dir.path()),
    );
    core.define_endpoint(
        "p",
        move || {
            let calls = Arc::clone(&calls_in_producer);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Profile {
                    id: 1,
                    name: "network".to_string(),
                })
            }
        },
        EndpointOptions::new().with_refetch_after(Duration::from_millis(60_000)),
    )
    .await
    .unwrap();

    let seen: Arc<Mutex<Vec<EndpointState<Profile>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _handle = core
        .subscribe("p", move |state: EndpointState<Profile>| {
            sink.lock().unwrap().push(state);
        })
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].data.as_ref().unwrap().name, "cached");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_data_refetches_even_without_window() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in_producer = Arc::clone(&calls);
    let core = QueryCore::new(CoreConfig::default());
    core.define_endpoint(
        "p",
        move || {
            let calls = Arc::clone(&calls_in_producer);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Profile {
                    id: 1,
                    name: "first".to_string(),
                })
            }
        },
        EndpointOptions::default(),
    )
    .await
    .unwrap();

    let _handle = core
        .subscribe("p", |_: EndpointState<Profile>| {})
        .unwrap();

    let core_calls = Arc::clone(&calls);
    wait_until("the initial fetch", move || {
        core_calls.load(Ordering::SeqCst) == 1
    })
    .await;
}

#[tokio::test]
async fn test_default_window_comes_from_core_config() {
    let dir = TempDir::new().unwrap();
    seed_entry(
        &dir,
        "p",
        serde_json::json!({"id": 1, "name": "old"}),
        now_millis() - 1_000,
    );

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in_producer = Arc::clone(&calls);
    let core = QueryCore::new(
        CoreConfig::new()
            .with_cache_provider(ProviderKind::LocalKv)
            .with_data_dir(dir.path())
            .with_default_refetch_after(Duration::from_millis(100)),
    );
    core.define_endpoint(
        "p",
        move || {
            let calls = Arc::clone(&calls_in_producer);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Profile {
                    id: 1,
                    name: "new".to_string(),
                })
            }
        },
        EndpointOptions::default(),
    )
    .await
    .unwrap();

    let _handle = core
        .subscribe("p", |_: EndpointState<Profile>| {})
        .unwrap();

    let core_calls = Arc::clone(&calls);
    wait_until("the staleness refresh", move || {
        core_calls.load(Ordering::SeqCst) == 1
    })
    .await;
}
