//! Integration tests for how a single NVIDIADriver converges
//!
//! Each story runs reconcile and error_policy under kube-runtime's scheduler
//! on a paused clock and checks how many sync passes happened, and when.

use std::time::Duration;

use nvidia_driver_operator::state::SyncOutcome;

use super::fakes::{cluster_policy, driver, request, FakeStore, Harness, ScriptedState};

// =============================================================================
// Not ready, then ready
// =============================================================================

/// A driver that rolls out over two checks is polled every five seconds and
/// left alone once it reports ready.
#[tokio::test(start_paused = true)]
async fn story_converging_driver_is_polled_until_ready() {
    let h = Harness::new(
        FakeStore::with(vec![driver("default")], vec![cluster_policy("cluster-policy")]),
        ScriptedState::new(
            vec![SyncOutcome::NotReady, SyncOutcome::NotReady],
            SyncOutcome::Ready,
        ),
    );
    let running = h.spawn();
    running.add(request("default"));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.state.calls(), 1, "first pass runs immediately");

    tokio::time::sleep(Duration::from_millis(4_800)).await;
    assert_eq!(h.state.calls(), 1, "no recheck before the five second delay");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.state.calls(), 2);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.state.calls(), 3);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.state.calls(), 3, "ready driver is not requeued");

    running.stop().await;
}

/// Not-ready passes never grow the delay, however many happen in a row.
#[tokio::test(start_paused = true)]
async fn story_not_ready_delay_does_not_grow() {
    let h = Harness::new(
        FakeStore::with(vec![driver("default")], vec![cluster_policy("cluster-policy")]),
        ScriptedState::new(vec![], SyncOutcome::NotReady),
    );
    let running = h.spawn();
    running.add(request("default"));

    tokio::time::sleep(Duration::from_millis(30_100)).await;
    assert_eq!(h.state.calls(), 7, "passes at 0, 5, 10, 15, 20, 25 and 30s");
    assert_eq!(h.failures("default"), 0);

    running.stop().await;
}

// =============================================================================
// Failure and recovery
// =============================================================================

/// Failed syncs back off 100ms, 200ms, 400ms; the next success stops retries
/// and clears the failure count.
#[tokio::test(start_paused = true)]
async fn story_failing_sync_backs_off_and_recovers() {
    let failure = SyncOutcome::Error("failed to apply DaemonSet".to_string());
    let h = Harness::new(
        FakeStore::with(vec![driver("default")], vec![cluster_policy("cluster-policy")]),
        ScriptedState::new(
            vec![failure.clone(), failure.clone(), failure],
            SyncOutcome::Ready,
        ),
    );
    let running = h.spawn();
    running.add(request("default"));

    // Passes at 0, 100, 300 and 700ms
    tokio::time::sleep(Duration::from_millis(650)).await;
    assert_eq!(h.state.calls(), 3);
    assert_eq!(h.failures("default"), 3);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.state.calls(), 4);
    assert_eq!(h.failures("default"), 0);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.state.calls(), 4);

    running.stop().await;
}

/// A driver that keeps failing is retried at most every three seconds.
#[tokio::test(start_paused = true)]
async fn story_persistent_failure_is_capped() {
    let h = Harness::new(
        FakeStore::with(vec![driver("default")], vec![cluster_policy("cluster-policy")]),
        ScriptedState::new(vec![], SyncOutcome::Error("image pull failed".to_string())),
    );
    let running = h.spawn();
    running.add(request("default"));

    // 0, .1, .3, .7, 1.5, 3.1, 6.1, 9.1
    tokio::time::sleep(Duration::from_millis(9_500)).await;
    assert_eq!(h.state.calls(), 8);

    running.stop().await;
}

// =============================================================================
// Missing inputs
// =============================================================================

/// Without a ClusterPolicy no sync happens; the request backs off like any
/// other failure and syncs once a ClusterPolicy appears.
#[tokio::test(start_paused = true)]
async fn story_cluster_policy_created_after_driver() {
    let store = FakeStore::with(vec![driver("default")], vec![]);
    let h = Harness::new(store.clone(), ScriptedState::new(vec![], SyncOutcome::Ready));
    let running = h.spawn();
    running.add(request("default"));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(h.state.calls(), 0);
    assert!(h.failures("default") >= 2);

    store.put_policy(cluster_policy("cluster-policy"));
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(h.state.calls(), 1);
    assert_eq!(h.failures("default"), 0);

    running.stop().await;
}

/// Failing to list ClusterPolicies is an ordinary failure, not a crash.
#[tokio::test(start_paused = true)]
async fn story_policy_list_failure_is_retried() {
    let store = FakeStore::with(vec![driver("default")], vec![cluster_policy("cluster-policy")]);
    store.fail_policy_list(true);
    let h = Harness::new(store.clone(), ScriptedState::new(vec![], SyncOutcome::Ready));
    let running = h.spawn();
    running.add(request("default"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.state.calls(), 0);
    assert_eq!(h.failures("default"), 1);

    store.fail_policy_list(false);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.state.calls(), 1);

    running.stop().await;
}

/// A driver deleted after the cache saw it finishes quietly without a sync.
#[tokio::test(start_paused = true)]
async fn story_deleted_driver_is_not_synced() {
    let store = FakeStore::with(vec![driver("default")], vec![cluster_policy("cluster-policy")]);
    let h = Harness::new(store.clone(), ScriptedState::new(vec![], SyncOutcome::Ready));
    store.delete_driver("default");

    let running = h.spawn();
    running.add(request("default"));
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(h.state.calls(), 0);
    assert_eq!(h.failures("default"), 0);
    running.stop().await;
}

/// With several ClusterPolicies the first one listed is handed to the sync.
#[tokio::test(start_paused = true)]
async fn story_first_cluster_policy_wins() {
    let h = Harness::new(
        FakeStore::with(
            vec![driver("default")],
            vec![cluster_policy("primary"), cluster_policy("stale")],
        ),
        ScriptedState::new(vec![], SyncOutcome::Ready),
    );
    let running = h.spawn();

    running.add(request("default"));
    tokio::time::sleep(Duration::from_secs(1)).await;
    running.add(request("default"));
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(h.state.policies_seen(), vec!["primary", "primary"]);
    running.stop().await;
}
