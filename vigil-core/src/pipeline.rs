//! Per-item validation path shared by the immediate and background lanes.
//!
//! Classify, record the verdict, and hand any actionable result to the
//! replacement gate. Approved actions (queue replays first, then the new
//! one) go to the executor channel; queued ones wait for a budget reset.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vigil_config::ActionsConfig;
use vigil_model::{ActionReason, MediaItem, ReplacementAction, Verdict};

use crate::classify::Classifier;
use crate::error::Result;
use crate::gate::{GateDecision, ReplacementGate};
use crate::inventory::Inventory;
use crate::notify::{JanitorEvent, Notifier};
use crate::probe::ProbeAdapter;
use crate::state::StateStore;

pub struct ValidationPipeline {
    classifier: Classifier,
    probe: Arc<dyn ProbeAdapter>,
    inventory: Arc<Inventory>,
    gate: Arc<ReplacementGate>,
    executor_tx: mpsc::UnboundedSender<ReplacementAction>,
    notifier: Arc<dyn Notifier>,
    store: Arc<StateStore>,
    actions: ActionsConfig,
}

impl fmt::Debug for ValidationPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationPipeline")
            .field("actions", &self.actions)
            .finish_non_exhaustive()
    }
}

impl ValidationPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        classifier: Classifier,
        probe: Arc<dyn ProbeAdapter>,
        inventory: Arc<Inventory>,
        gate: Arc<ReplacementGate>,
        executor_tx: mpsc::UnboundedSender<ReplacementAction>,
        notifier: Arc<dyn Notifier>,
        store: Arc<StateStore>,
        actions: ActionsConfig,
    ) -> Self {
        ValidationPipeline {
            classifier,
            probe,
            inventory,
            gate,
            executor_tx,
            notifier,
            store,
            actions,
        }
    }

    /// Validate one item and act on the verdict. `Err` only for an
    /// unreachable probe adapter; a bad file is an `Ok` verdict.
    pub async fn process(&self, item: &MediaItem, generation: u64) -> Result<Verdict> {
        let classification = self.classifier.classify(self.probe.as_ref(), item).await?;
        let verdict = classification.verdict;

        self.inventory.record_verdict(
            &item.key,
            verdict.clone(),
            classification.media_info,
            generation,
        );
        let actionable = verdict.is_actionable();
        self.store.update(|s| {
            // In-flight completions from an older generation are dropped;
            // the item simply re-enters the current sweep.
            if s.generation == generation {
                s.completed.insert(item.key.clone());
            }
            s.counters.scanned += 1;
            if actionable {
                s.counters.invalid += 1;
            }
        });

        if !actionable {
            debug!(key = %item.key, title = %item.title, "file validated");
            return Ok(verdict);
        }

        warn!(
            key = %item.key,
            title = %item.title,
            verdict = %verdict,
            detail = %verdict.detail(),
            "file failed validation"
        );
        self.notifier.notify(JanitorEvent::VerdictRecorded {
            key: item.key.clone(),
            title: item.title.clone(),
            verdict: verdict.clone(),
        });

        if !self.actions.auto_replace {
            info!(key = %item.key, "auto-replace disabled, flagged only");
            return Ok(verdict);
        }

        self.submit_action(item, ActionReason::Verdict(verdict.clone()))
            .await;
        Ok(verdict)
    }

    /// Offer one corrective action to the gate and dispatch the fallout.
    /// Also used by the post-generation duplicate pass.
    pub async fn submit_action(&self, item: &MediaItem, reason: ActionReason) {
        let action = ReplacementAction::new(item.key.clone(), reason.clone());
        let admission = self.gate.admit(action).await;

        self.dispatch(admission.drained);

        match admission.decision {
            GateDecision::Approved => {
                self.notifier.notify(JanitorEvent::ReplacementApproved {
                    key: item.key.clone(),
                    title: item.title.clone(),
                    reason,
                });
                self.send_to_executor(admission.action);
            }
            GateDecision::Queued => {
                self.notifier.notify(JanitorEvent::ReplacementQueued {
                    key: item.key.clone(),
                    title: item.title.clone(),
                    reason,
                });
            }
        }
    }

    /// Forward already-approved actions (rollover/reset drains) to the
    /// executor, oldest first.
    pub fn dispatch(&self, drained: Vec<ReplacementAction>) {
        for action in drained {
            if let Some(item) = self.inventory.get(&action.target) {
                self.notifier.notify(JanitorEvent::ReplacementApproved {
                    key: action.target.clone(),
                    title: item.title,
                    reason: action.reason.clone(),
                });
            }
            self.send_to_executor(action);
        }
    }

    fn send_to_executor(&self, action: ReplacementAction) {
        if self.executor_tx.send(action).is_err() {
            warn!("executor channel closed, dropping approved action");
        }
    }
}
