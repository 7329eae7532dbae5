//! Action executor: the only component that touches the library manager
//! destructively.
//!
//! Consumes approved actions from one channel, serialized, so a day's
//! budget plays out one delete at a time. Delete, blocklist, and search
//! are independently best-effort: a failed blocklist or search never undoes
//! the delete, and a failure before the delete never refunds the budget
//! slot that admission consumed.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use vigil_model::{ActionOutcome, ActionState, InstanceName, ReplacementAction};

use crate::inventory::Inventory;
use crate::manager::LibraryManager;
use crate::notify::{JanitorEvent, Notifier};
use crate::state::StateStore;

pub struct ActionExecutor {
    managers: HashMap<InstanceName, Arc<dyn LibraryManager>>,
    inventory: Arc<Inventory>,
    store: Arc<StateStore>,
    notifier: Arc<dyn Notifier>,
    blocklist_bad_releases: bool,
    dry_run: bool,
}

impl std::fmt::Debug for ActionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionExecutor")
            .field("managers", &self.managers.len())
            .field("blocklist_bad_releases", &self.blocklist_bad_releases)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

impl ActionExecutor {
    pub fn new(
        managers: &[Arc<dyn LibraryManager>],
        inventory: Arc<Inventory>,
        store: Arc<StateStore>,
        notifier: Arc<dyn Notifier>,
        blocklist_bad_releases: bool,
        dry_run: bool,
    ) -> Self {
        ActionExecutor {
            managers: managers
                .iter()
                .map(|m| (m.instance().clone(), m.clone()))
                .collect(),
            inventory,
            store,
            notifier,
            blocklist_bad_releases,
            dry_run,
        }
    }

    /// Run the serialized consumer until the channel closes.
    pub fn spawn(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<ReplacementAction>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(mut action) = rx.recv().await {
                let outcome = self.execute(&mut action).await;
                self.notifier
                    .notify(JanitorEvent::ReplacementExecuted { outcome });
            }
        })
    }

    /// Delete, blocklist, search. Public so the flow is testable without a
    /// running channel consumer.
    pub async fn execute(&self, action: &mut ReplacementAction) -> ActionOutcome {
        action.state = ActionState::Executing;
        let mut outcome = ActionOutcome {
            action: action.id,
            target: action.target.clone(),
            dry_run: self.dry_run,
            deleted: false,
            blocklisted: None,
            search_triggered: None,
            error: None,
        };

        let Some(item) = self.inventory.get(&action.target) else {
            outcome.error = Some("item no longer tracked".to_string());
            action.state = ActionState::Failed;
            return outcome;
        };
        let Some(manager) = self.managers.get(&action.target.instance) else {
            outcome.error = Some(format!(
                "no manager configured for instance '{}'",
                action.target.instance
            ));
            action.state = ActionState::Failed;
            return outcome;
        };

        if self.dry_run {
            info!(
                key = %action.target,
                title = %item.title,
                reason = %action.reason.detail(),
                "dry-run: would delete, blocklist, and re-search"
            );
            action.state = ActionState::Succeeded;
            return outcome;
        }

        let Some(file_id) = item.file_id else {
            outcome.error = Some("no file id for deletion".to_string());
            action.state = ActionState::Failed;
            return outcome;
        };

        info!(key = %action.target, title = %item.title, file_id, "deleting bad file");
        if let Err(e) = manager.delete_file(file_id).await {
            error!(key = %action.target, error = %e, "failed to delete file");
            outcome.error = Some(e.to_string());
            action.state = ActionState::Failed;
            return outcome;
        }
        outcome.deleted = true;

        if self.blocklist_bad_releases {
            let message = format!("blocked by vigil: {}", action.reason.detail());
            match manager
                .blocklist_release(action.target.record, &message)
                .await
            {
                Ok(()) => outcome.blocklisted = Some(true),
                Err(e) => {
                    warn!(key = %action.target, error = %e, "blocklist failed, continuing");
                    outcome.blocklisted = Some(false);
                }
            }
        }

        match manager.trigger_search(action.target.record).await {
            Ok(()) => outcome.search_triggered = Some(true),
            Err(e) => {
                warn!(key = %action.target, error = %e, "replacement search failed");
                outcome.search_triggered = Some(false);
            }
        }

        self.inventory.mark_replaced(&action.target);
        self.store.update(|s| s.counters.replaced += 1);
        action.state = ActionState::Succeeded;
        if outcome.partial_failure() {
            warn!(key = %action.target, "replacement completed with partial failures");
        } else {
            info!(key = %action.target, title = %item.title, "replacement initiated");
        }
        outcome
    }
}
