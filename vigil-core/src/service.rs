//! The janitor facade: wires every component together and exposes the
//! operations the HTTP layer consumes. Nothing here blocks longer than an
//! enqueue or a state read; all heavy lifting happens on spawned tasks.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;
use vigil_config::Config;
use vigil_model::{Report, ReportKind, ReplacementAction, ReportSource, StatusSnapshot};

use crate::classify::Classifier;
use crate::error::{CoreError, Result};
use crate::executor::ActionExecutor;
use crate::gate::ReplacementGate;
use crate::inventory::Inventory;
use crate::manager::LibraryManager;
use crate::notify::Notifier;
use crate::pipeline::ValidationPipeline;
use crate::probe::ProbeAdapter;
use crate::reports::build_report;
use crate::scheduler::{ScanScheduler, until_next_midnight};
use crate::state::StateStore;

pub struct Janitor {
    config: Config,
    store: Arc<StateStore>,
    inventory: Arc<Inventory>,
    gate: Arc<ReplacementGate>,
    pipeline: Arc<ValidationPipeline>,
    scheduler: ScanScheduler,
    executor: Arc<ActionExecutor>,
    executor_rx: StdMutex<Option<mpsc::UnboundedReceiver<ReplacementAction>>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for Janitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Janitor")
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl Janitor {
    pub fn new(
        config: Config,
        managers: Vec<Arc<dyn LibraryManager>>,
        probe: Arc<dyn ProbeAdapter>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let store = Arc::new(StateStore::open(config.state.path.clone()));
        // Generation 0 means "never scanned"; live sweeps start at 1.
        if store.read(|s| s.generation) == 0 {
            store.update(|s| s.generation = 1);
        }

        let inventory = Arc::new(Inventory::new());
        let gate = Arc::new(ReplacementGate::new(
            config.actions.max_replacements_per_day,
            store.clone(),
        ));
        let (executor_tx, executor_rx) = mpsc::unbounded_channel();

        let pipeline = Arc::new(ValidationPipeline::new(
            Classifier::new(config.validation.clone()),
            probe,
            inventory.clone(),
            gate.clone(),
            executor_tx,
            notifier.clone(),
            store.clone(),
            config.actions.clone(),
        ));

        let executor = Arc::new(ActionExecutor::new(
            &managers,
            inventory.clone(),
            store.clone(),
            notifier.clone(),
            config.actions.blocklist_bad_releases,
            config.actions.dry_run,
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = ScanScheduler::new(
            config.scanner.clone(),
            config.actions.auto_delete_duplicates,
            pipeline.clone(),
            inventory.clone(),
            managers,
            store.clone(),
            notifier,
            gate.clone(),
            shutdown_rx,
        );

        Janitor {
            config,
            store,
            inventory,
            gate,
            pipeline,
            scheduler,
            executor,
            executor_rx: StdMutex::new(Some(executor_rx)),
            shutdown_tx,
            tasks: StdMutex::new(Vec::new()),
        }
    }

    /// Bring the system up: executor, eager movie enumeration, the worker
    /// pool, the TV refresh schedule, and the midnight budget rollover.
    pub async fn start(&self) {
        let mut handles = Vec::new();

        let executor_rx = self
            .executor_rx
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(rx) = executor_rx {
            handles.push(self.executor.clone().spawn(rx));
        }

        // Movies are cheap to list; get them sweeping before TV arrives.
        let merged = self.scheduler.refresh_movies().await;
        info!(movies = merged, "eager movie enumeration finished");
        self.scheduler.rebuild_pending();

        handles.extend(self.scheduler.spawn_all());
        handles.push(self.spawn_midnight_rollover());

        self.tasks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .extend(handles);
        info!("janitor started");
    }

    fn spawn_midnight_rollover(&self) -> JoinHandle<()> {
        let gate = self.gate.clone();
        let pipeline = self.pipeline.clone();
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                let delay = until_next_midnight();
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(delay) => {
                        let drained = gate.rollover().await;
                        if !drained.is_empty() {
                            info!(drained = drained.len(), "midnight rollover released queued actions");
                        }
                        pipeline.dispatch(drained);
                    }
                }
            }
        })
    }

    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .drain(..)
            .collect();
        for handle in handles {
            handle.abort();
        }
        info!("janitor stopped");
    }

    pub async fn status(&self) -> StatusSnapshot {
        let (generation, initial_scan_done, counters) = self
            .store
            .read(|s| (s.generation, s.initial_scan_done, s.counters));
        StatusSnapshot {
            mode: self.config.scanner.mode,
            generation,
            queue_depth: self.inventory.pending_len(),
            initial_scan_done,
            budget: self.gate.budget().await,
            queued_actions: self.gate.queued_len().await,
            counters,
        }
    }

    /// Immediate-lane entry used by the webhook layer on imports/upgrades.
    pub fn validate_now(&self, path: PathBuf) -> Result<()> {
        if self.scheduler.request_immediate(path) {
            Ok(())
        } else {
            Err(CoreError::Internal("scheduler is shut down".to_string()))
        }
    }

    /// Process one extra background batch right away, off the caller's
    /// thread.
    pub fn trigger_scan_batch(&self) {
        let scheduler = self.scheduler.clone();
        tokio::spawn(async move {
            scheduler.trigger_batch().await;
        });
    }

    /// Re-enumerate part of the library in the background.
    pub fn refresh_inventory(&self, source: ReportSource) {
        let scheduler = self.scheduler.clone();
        tokio::spawn(async move {
            if matches!(source, ReportSource::All | ReportSource::Movies) {
                scheduler.refresh_movies().await;
            }
            if matches!(source, ReportSource::All | ReportSource::Tv) {
                scheduler.refresh_tv().await;
            }
        });
    }

    /// Manual budget reset: reset and drain the queue now, touching
    /// neither the scan generation nor the inventory.
    pub async fn reset_replacements(&self) {
        let drained = self.gate.reset().await;
        self.pipeline.dispatch(drained);
    }

    /// Full clear: budget, queue, generation, and counters. In-flight
    /// scans finish harmlessly and their items re-enter the fresh sweep.
    pub async fn clear_state(&self) {
        self.gate.clear().await;
        self.store.update(|s| {
            s.generation = 1;
            s.completed.clear();
            s.counters = Default::default();
            s.initial_scan_done = false;
        });
        self.inventory.reset_scan_marks();
        self.scheduler.reset_lifecycle();
        self.scheduler.rebuild_pending();
        info!("state cleared, starting fresh sweep");
    }

    pub async fn report(&self, kind: ReportKind, source: ReportSource) -> Report {
        build_report(kind, source, &self.inventory.snapshot())
    }
}
