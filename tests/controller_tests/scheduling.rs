//! Integration tests for request coalescing, superseded requeues and the
//! one-pass-at-a-time guarantee

use std::time::Duration;

use nvidia_driver_operator::state::SyncOutcome;

use super::fakes::{cluster_policy, driver, request, FakeStore, Harness, ScriptedState};

// =============================================================================
// Coalescing
// =============================================================================

/// Two requests for one driver queued together run as a single pass.
#[tokio::test(start_paused = true)]
async fn story_duplicate_requests_run_once() {
    let h = Harness::new(
        FakeStore::with(vec![driver("default")], vec![cluster_policy("cluster-policy")]),
        ScriptedState::new(vec![], SyncOutcome::Ready),
    );
    let running = h.spawn();
    running.add(request("default"));
    running.add(request("default"));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.state.calls(), 1);

    running.stop().await;
}

/// Requests arriving while their driver is being synced are held back and
/// run exactly once after the current pass.
#[tokio::test(start_paused = true)]
async fn story_request_during_pass_runs_after_it() {
    let h = Harness::new(
        FakeStore::with(vec![driver("default")], vec![cluster_policy("cluster-policy")]),
        ScriptedState::slow(vec![], SyncOutcome::Ready, Duration::from_secs(1)),
    );
    let running = h.spawn();
    running.add(request("default"));

    tokio::time::sleep(Duration::from_millis(100)).await;
    running.add(request("default"));
    running.add(request("default"));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(h.state.calls(), 1, "held until the first pass finishes");

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.state.calls(), 2);
    assert_eq!(h.state.max_in_flight(), 1);

    running.stop().await;
}

// =============================================================================
// Superseded requeues
// =============================================================================

/// A watch event for a driver with a pending not-ready requeue takes that
/// requeue's place. Once the event's pass reports ready, the old five second
/// deadline does not fire.
#[tokio::test(start_paused = true)]
async fn story_new_event_supersedes_pending_requeue() {
    let h = Harness::new(
        FakeStore::with(vec![driver("default")], vec![cluster_policy("cluster-policy")]),
        ScriptedState::new(vec![SyncOutcome::NotReady], SyncOutcome::Ready),
    );
    let running = h.spawn();
    running.add(request("default"));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.state.calls(), 1);

    // A watch event lands while the five second requeue is pending
    running.add(request("default"));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.state.calls(), 2);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.state.calls(), 2, "converged driver is not synced again");

    running.stop().await;
}

/// A driver that is still not ready after the event keeps being polled on the
/// five second cadence counted from the event's pass.
#[tokio::test(start_paused = true)]
async fn story_event_restarts_not_ready_cadence() {
    let h = Harness::new(
        FakeStore::with(vec![driver("default")], vec![cluster_policy("cluster-policy")]),
        ScriptedState::new(vec![], SyncOutcome::NotReady),
    );
    let running = h.spawn();
    running.add(request("default"));

    tokio::time::sleep(Duration::from_secs(2)).await;
    running.add(request("default"));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.state.calls(), 2);

    // Nothing at the original five second mark, next poll at 2s + 5s
    tokio::time::sleep(Duration::from_millis(4_800)).await;
    assert_eq!(h.state.calls(), 2);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.state.calls(), 3);

    running.stop().await;
}

// =============================================================================
// One pass at a time
// =============================================================================

/// Requests for different drivers run one after another, never together.
#[tokio::test(start_paused = true)]
async fn story_drivers_are_synced_one_at_a_time() {
    let h = Harness::new(
        FakeStore::with(
            vec![driver("a100"), driver("h100"), driver("t4")],
            vec![cluster_policy("cluster-policy")],
        ),
        ScriptedState::slow(vec![], SyncOutcome::Ready, Duration::from_secs(2)),
    );
    let running = h.spawn();
    for name in ["a100", "h100", "t4"] {
        running.add(request(name));
    }

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(h.state.calls(), 2, "second pass starts only after the first");

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.state.calls(), 3);
    assert_eq!(h.state.max_in_flight(), 1);

    let mut synced = h.state.synced();
    synced.sort();
    assert_eq!(synced, vec!["a100", "h100", "t4"]);

    running.stop().await;
}

/// Shutting down mid-pass aborts the pass; it counts as a failure and the
/// retry it schedules is dropped with the controller.
#[tokio::test(start_paused = true)]
async fn story_shutdown_aborts_pass_in_flight() {
    let h = Harness::new(
        FakeStore::with(vec![driver("default")], vec![cluster_policy("cluster-policy")]),
        ScriptedState::slow(vec![], SyncOutcome::Ready, Duration::from_secs(60)),
    );
    let running = h.spawn();
    running.add(request("default"));

    tokio::time::sleep(Duration::from_secs(1)).await;
    h.shutdown(running).await;

    assert_eq!(h.state.calls(), 1);
    assert_eq!(h.failures("default"), 1);
}
