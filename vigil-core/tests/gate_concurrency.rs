//! The budget counter is the one shared mutable resource in the system;
//! these tests hammer it from many tasks at once.

mod support;

use std::sync::Arc;

use chrono::NaiveDate;
use vigil_core::gate::{GateDecision, ReplacementGate};
use vigil_core::state::StateStore;
use vigil_model::{ActionReason, ItemKey, ReplacementAction, Verdict};

fn action(id: i64) -> ReplacementAction {
    ReplacementAction::new(
        ItemKey::new("radarr-main", id),
        ActionReason::Verdict(Verdict::Corrupt),
    )
}

fn day(s: &str) -> NaiveDate {
    s.parse().expect("valid date")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_admissions_never_exceed_the_limit() {
    const LIMIT: u32 = 10;
    const ATTEMPTS: i64 = 50;

    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(StateStore::open(dir.path().join("state.json")));
    let gate = Arc::new(ReplacementGate::new(LIMIT, store));
    let today = day("2024-06-01");

    let mut handles = Vec::new();
    for id in 0..ATTEMPTS {
        let gate = gate.clone();
        handles.push(tokio::spawn(async move {
            gate.admit_at(action(id), today).await.decision
        }));
    }

    let mut approved = 0usize;
    let mut queued = 0usize;
    for handle in handles {
        match handle.await.expect("admission task") {
            GateDecision::Approved => approved += 1,
            GateDecision::Queued => queued += 1,
        }
    }

    assert_eq!(approved, LIMIT as usize);
    assert_eq!(queued, (ATTEMPTS as usize) - LIMIT as usize);

    let budget = gate.budget().await;
    assert_eq!(budget.used, LIMIT);
    assert!(budget.used <= budget.limit);
    assert_eq!(gate.queued_len().await, queued);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_rollover_and_admissions_stay_within_limit() {
    const LIMIT: u32 = 5;

    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(StateStore::open(dir.path().join("state.json")));
    let gate = Arc::new(ReplacementGate::new(LIMIT, store));

    // Fill yesterday's budget and queue a backlog.
    let yesterday = day("2024-06-01");
    for id in 0..12 {
        gate.admit_at(action(id), yesterday).await;
    }
    assert_eq!(gate.queued_len().await, 7);

    // Today: rollovers race with fresh admissions.
    let today = day("2024-06-02");
    let mut handles = Vec::new();
    for id in 100..110 {
        let gate = gate.clone();
        handles.push(tokio::spawn(async move {
            gate.admit_at(action(id), today).await;
        }));
    }
    for _ in 0..4 {
        let gate = gate.clone();
        handles.push(tokio::spawn(async move {
            gate.rollover_at(today).await;
        }));
    }
    for handle in handles {
        handle.await.expect("task");
    }

    let budget = gate.budget().await;
    assert_eq!(budget.used, LIMIT);
    // Exactly one rollover drained; the backlog kept its priority.
    assert_eq!(gate.queued_len().await, 7 - LIMIT as usize + 10);
}
