//! Event surface for the external notification dispatchers.

use vigil_model::{ActionOutcome, ActionReason, ItemKey, Verdict};

/// Everything the core tells the outside world about.
#[derive(Debug, Clone)]
pub enum JanitorEvent {
    /// An actionable verdict was recorded.
    VerdictRecorded {
        key: ItemKey,
        title: String,
        verdict: Verdict,
    },
    ReplacementApproved {
        key: ItemKey,
        title: String,
        reason: ActionReason,
    },
    /// Budget exhausted; the action waits for the next reset.
    ReplacementQueued {
        key: ItemKey,
        title: String,
        reason: ActionReason,
    },
    ReplacementExecuted {
        outcome: ActionOutcome,
    },
    GenerationCompleted {
        generation: u64,
        scanned: u64,
    },
}

/// Fire-and-forget sink. Implementations must return immediately (queue
/// internally, spawn, or drop); the core never awaits delivery.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: JanitorEvent);
}

/// Discards everything. Useful default and test double.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: JanitorEvent) {}
}
