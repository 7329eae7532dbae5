//! Replacement gate: the sole authority on whether a corrective action may
//! run now, later today, or must wait for the next budget reset.
//!
//! One tokio mutex serializes every admission, rollover, and reset, so two
//! workers can never both observe a free budget slot and jointly exceed
//! the limit. Budget and FIFO write through to the state store on every
//! mutation; a restart resumes exactly where the gate left off.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tokio::sync::Mutex;
use tracing::{debug, info};
use vigil_model::{DailyBudget, ItemKey, ReplacementAction};

use crate::state::StateStore;

/// Where an admitted action ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Approved,
    Queued,
}

/// Result of offering one action to the gate. `drained` holds actions
/// released from the FIFO by a day rollover observed during this call;
/// they were queued first and must be dispatched first.
#[derive(Debug)]
pub struct Admission {
    pub action: ReplacementAction,
    pub decision: GateDecision,
    pub drained: Vec<ReplacementAction>,
}

#[derive(Debug)]
struct GateState {
    budget: DailyBudget,
    queue: VecDeque<ReplacementAction>,
}

#[derive(Debug)]
pub struct ReplacementGate {
    store: Arc<StateStore>,
    inner: Mutex<GateState>,
}

impl ReplacementGate {
    /// Restore budget and FIFO from the store. The configured limit always
    /// wins over whatever limit the snapshot carried.
    pub fn new(limit: u32, store: Arc<StateStore>) -> Self {
        let (mut budget, queue) = store.read(|s| (s.budget, s.queued.clone()));
        budget.limit = limit;
        budget.used = budget.used.min(limit);
        ReplacementGate {
            store,
            inner: Mutex::new(GateState {
                budget,
                queue: queue.into(),
            }),
        }
    }

    /// Offer an action. Rolls the budget over first if the local day
    /// changed since the last gate access, so replayed queue entries are
    /// considered before this new action.
    pub async fn admit(&self, action: ReplacementAction) -> Admission {
        self.admit_at(action, Local::now().date_naive()).await
    }

    pub async fn admit_at(&self, mut action: ReplacementAction, today: NaiveDate) -> Admission {
        let mut state = self.inner.lock().await;
        let drained = rollover_locked(&mut state, today);

        let decision = if state.budget.used < state.budget.limit {
            state.budget.used += 1;
            action.approve();
            GateDecision::Approved
        } else {
            action.queue();
            state.queue.push_back(action.clone());
            debug!(key = %action.target, queued = state.queue.len(), "budget exhausted, action queued");
            GateDecision::Queued
        };

        self.persist_locked(&state);
        Admission {
            action,
            decision,
            drained,
        }
    }

    /// Scheduled midnight rollover. Idempotent: a second call on the same
    /// day is a no-op and cannot double-drain the FIFO.
    pub async fn rollover(&self) -> Vec<ReplacementAction> {
        self.rollover_at(Local::now().date_naive()).await
    }

    pub async fn rollover_at(&self, today: NaiveDate) -> Vec<ReplacementAction> {
        let mut state = self.inner.lock().await;
        let drained = rollover_locked(&mut state, today);
        self.persist_locked(&state);
        drained
    }

    /// Manual reset: same reset-and-drain as midnight, without waiting for
    /// the date to change. Touches nothing but the budget and FIFO.
    pub async fn reset(&self) -> Vec<ReplacementAction> {
        self.reset_at(Local::now().date_naive()).await
    }

    pub async fn reset_at(&self, today: NaiveDate) -> Vec<ReplacementAction> {
        let mut state = self.inner.lock().await;
        state.budget.date = today;
        state.budget.used = 0;
        let drained = drain_locked(&mut state);
        info!(
            drained = drained.len(),
            still_queued = state.queue.len(),
            "replacement budget reset"
        );
        self.persist_locked(&state);
        drained
    }

    /// Full clear: drop the FIFO and reset the budget. Part of the
    /// facade's clear-state operation.
    pub async fn clear(&self) {
        let mut state = self.inner.lock().await;
        state.queue.clear();
        state.budget.used = 0;
        state.budget.date = Local::now().date_naive();
        self.persist_locked(&state);
    }

    pub async fn budget(&self) -> DailyBudget {
        self.inner.lock().await.budget
    }

    pub async fn queued_len(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    /// Whether an action for this item already waits in the FIFO. Keeps
    /// post-generation duplicate passes from stacking repeats.
    pub async fn has_queued(&self, key: &ItemKey) -> bool {
        self.inner
            .lock()
            .await
            .queue
            .iter()
            .any(|action| action.target == *key)
    }

    fn persist_locked(&self, state: &GateState) {
        let budget = state.budget;
        let queued: Vec<ReplacementAction> = state.queue.iter().cloned().collect();
        self.store.update(|s| {
            s.budget = budget;
            s.queued = queued;
        });
    }
}

fn rollover_locked(state: &mut GateState, today: NaiveDate) -> Vec<ReplacementAction> {
    if state.budget.date == today {
        return Vec::new();
    }
    info!(
        from = %state.budget.date,
        to = %today,
        queued = state.queue.len(),
        "daily budget rollover"
    );
    state.budget.date = today;
    state.budget.used = 0;
    drain_locked(state)
}

/// Replay the FIFO in original order until the budget fills. Leftovers
/// stay queued for the next reset.
fn drain_locked(state: &mut GateState) -> Vec<ReplacementAction> {
    let mut drained = Vec::new();
    while state.budget.used < state.budget.limit {
        let Some(mut action) = state.queue.pop_front() else {
            break;
        };
        state.budget.used += 1;
        action.approve();
        drained.push(action);
    }
    drained
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_model::{ActionReason, Verdict};

    fn gate(limit: u32) -> (ReplacementGate, Arc<StateStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(StateStore::open(dir.path().join("state.json")));
        (ReplacementGate::new(limit, store.clone()), store, dir)
    }

    fn action(id: i64) -> ReplacementAction {
        ReplacementAction::new(
            ItemKey::new("radarr-main", id),
            ActionReason::Verdict(Verdict::Corrupt),
        )
    }

    fn day(s: &str) -> NaiveDate {
        s.parse().expect("valid date")
    }

    #[tokio::test]
    async fn admissions_stop_at_the_limit() {
        let (gate, _store, _dir) = gate(2);
        let today = day("2024-06-01");
        assert_eq!(
            gate.admit_at(action(1), today).await.decision,
            GateDecision::Approved
        );
        assert_eq!(
            gate.admit_at(action(2), today).await.decision,
            GateDecision::Approved
        );
        assert_eq!(
            gate.admit_at(action(3), today).await.decision,
            GateDecision::Queued
        );
        assert_eq!(gate.budget().await.used, 2);
        assert_eq!(gate.queued_len().await, 1);
    }

    #[tokio::test]
    async fn rollover_drains_fifo_before_new_admissions() {
        let (gate, _store, _dir) = gate(1);
        let d1 = day("2024-06-01");
        gate.admit_at(action(1), d1).await;
        let queued = gate.admit_at(action(2), d1).await;
        assert_eq!(queued.decision, GateDecision::Queued);

        // The next day's first admission sees the drained entry first.
        let admission = gate.admit_at(action(3), day("2024-06-02")).await;
        assert_eq!(admission.drained.len(), 1);
        assert_eq!(admission.drained[0].target, ItemKey::new("radarr-main", 2));
        // Budget of 1 was consumed by the drained action.
        assert_eq!(admission.decision, GateDecision::Queued);
    }

    #[tokio::test]
    async fn rollover_is_idempotent_within_a_day() {
        let (gate, _store, _dir) = gate(1);
        let d1 = day("2024-06-01");
        gate.admit_at(action(1), d1).await;
        gate.admit_at(action(2), d1).await;
        gate.admit_at(action(3), d1).await;

        let d2 = day("2024-06-02");
        let first = gate.rollover_at(d2).await;
        assert_eq!(first.len(), 1);
        let second = gate.rollover_at(d2).await;
        assert!(second.is_empty());
        assert_eq!(gate.queued_len().await, 1);
    }

    #[tokio::test]
    async fn manual_reset_drains_without_a_day_change() {
        let (gate, _store, _dir) = gate(1);
        let d1 = day("2024-06-01");
        gate.admit_at(action(1), d1).await;
        gate.admit_at(action(2), d1).await;

        let drained = gate.reset_at(d1).await;
        assert_eq!(drained.len(), 1);
        assert_eq!(gate.budget().await.used, 1);
        assert_eq!(gate.queued_len().await, 0);
    }

    #[tokio::test]
    async fn budget_and_fifo_survive_a_restart() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        let today = day("2024-06-01");

        {
            let store = Arc::new(StateStore::open(&path));
            let gate = ReplacementGate::new(1, store);
            gate.admit_at(action(1), today).await;
            gate.admit_at(action(2), today).await;
        }

        let store = Arc::new(StateStore::open(&path));
        let gate = ReplacementGate::new(1, store);
        assert_eq!(gate.budget().await.used, 1);
        assert_eq!(gate.queued_len().await, 1);
        // Same day: the queued action stays queued.
        let admission = gate.admit_at(action(3), today).await;
        assert_eq!(admission.decision, GateDecision::Queued);
        assert!(admission.drained.is_empty());
    }
}
