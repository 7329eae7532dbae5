use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::keys::{ActionId, ItemKey};
use crate::verdict::Verdict;

/// Why a replacement action exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ActionReason {
    /// The classifier produced an actionable verdict.
    Verdict(Verdict),
    /// The item lost a duplicate ranking against a better copy.
    DuplicateOf(ItemKey),
}

impl ActionReason {
    pub fn detail(&self) -> String {
        match self {
            ActionReason::Verdict(v) => v.detail(),
            ActionReason::DuplicateOf(best) => format!("duplicate of {best}"),
        }
    }
}

/// Lifecycle of a replacement action. Transitions are owned by the gate
/// (Pending -> Approved/Queued, Queued -> Approved on drain) and the
/// executor (Approved -> Executing -> Succeeded/Failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    Pending,
    Queued,
    Approved,
    Executing,
    Succeeded,
    Failed,
}

/// A pending or completed corrective action against one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplacementAction {
    pub id: ActionId,
    pub target: ItemKey,
    pub reason: ActionReason,
    pub state: ActionState,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl ReplacementAction {
    pub fn new(target: ItemKey, reason: ActionReason) -> Self {
        ReplacementAction {
            id: ActionId::new(),
            target,
            reason,
            state: ActionState::Pending,
            created_at: Utc::now(),
            decided_at: None,
        }
    }

    pub fn approve(&mut self) {
        self.state = ActionState::Approved;
        self.decided_at = Some(Utc::now());
    }

    pub fn queue(&mut self) {
        self.state = ActionState::Queued;
        self.decided_at = Some(Utc::now());
    }
}

/// What actually happened when an approved action ran. `deleted` is the
/// success criterion; blocklist/search failures are surfaced here but do
/// not demote the action to failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action: ActionId,
    pub target: ItemKey,
    pub dry_run: bool,
    pub deleted: bool,
    /// None when blocklisting is disabled or never reached.
    pub blocklisted: Option<bool>,
    /// None when the search step was never reached.
    pub search_triggered: Option<bool>,
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn succeeded(&self) -> bool {
        self.deleted || self.dry_run
    }

    /// Delete went through but a follow-up step did not.
    pub fn partial_failure(&self) -> bool {
        self.succeeded()
            && (self.blocklisted == Some(false) || self.search_triggered == Some(false))
    }
}

/// Persisted daily replacement budget. `used <= limit` holds while
/// `date` is the current local day; the gate resets it on rollover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DailyBudget {
    pub date: NaiveDate,
    pub used: u32,
    pub limit: u32,
}

impl DailyBudget {
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }
}
