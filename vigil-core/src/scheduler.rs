//! Scan scheduler: decides what gets validated and when.
//!
//! A fixed pool of workers consumes two lanes. The immediate lane carries
//! webhook-triggered validations and is never paced; the background lane
//! sweeps the inventory at `files_per_hour`, split across the workers so
//! the aggregate rate matches the configured one rather than multiplying
//! by the worker count. Probe-adapter outages pause only the background
//! lane, with exponential backoff and indefinite retries.

use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use vigil_config::ScannerConfig;
use vigil_model::{ActionReason, ItemKey, ScanMode};

use crate::duplicates::find_duplicates;
use crate::error::CoreError;
use crate::gate::ReplacementGate;
use crate::inventory::Inventory;
use crate::manager::LibraryManager;
use crate::notify::{JanitorEvent, Notifier};
use crate::pipeline::ValidationPipeline;
use crate::state::StateStore;

/// Interval between background dequeues for one worker. Each of the
/// `concurrency` workers ticks this slowly so together they hit
/// `files_per_hour`.
pub(crate) fn worker_period(files_per_hour: u32, concurrency: usize) -> Duration {
    let files_per_hour = files_per_hour.max(1);
    let concurrency = concurrency.max(1) as f64;
    Duration::from_secs_f64(3_600.0 / f64::from(files_per_hour) * concurrency)
}

/// Size of one manually triggered batch.
pub(crate) fn batch_size(files_per_hour: u32) -> usize {
    (files_per_hour / 60).max(1) as usize
}

/// Sleep duration until the next local occurrence of `hour:minute`.
pub(crate) fn until_daily(hour: u32, minute: u32) -> Duration {
    let now = Local::now();
    let today = now.date_naive();
    let candidate = today
        .and_hms_opt(hour, minute, 0)
        .filter(|t| *t > now.naive_local())
        .or_else(|| today.succ_opt().and_then(|d| d.and_hms_opt(hour, minute, 0)));
    candidate
        .and_then(|naive| naive.and_local_timezone(Local).earliest())
        .and_then(|next| (next - now).to_std().ok())
        .unwrap_or(Duration::from_secs(24 * 3_600))
}

/// Sleep duration until just past the next local midnight.
pub(crate) fn until_next_midnight() -> Duration {
    until_daily(0, 0) + Duration::from_secs(5)
}

#[derive(Debug, Default)]
struct BackoffState {
    until: Option<Instant>,
    current: Option<Duration>,
}

#[derive(Clone)]
pub struct ScanScheduler {
    shared: Arc<Shared>,
}

struct Shared {
    config: ScannerConfig,
    auto_delete_duplicates: bool,
    pipeline: Arc<ValidationPipeline>,
    inventory: Arc<Inventory>,
    managers: Vec<Arc<dyn LibraryManager>>,
    store: Arc<StateStore>,
    notifier: Arc<dyn Notifier>,
    gate: Arc<ReplacementGate>,
    immediate_tx: mpsc::UnboundedSender<PathBuf>,
    immediate_rx: Mutex<mpsc::UnboundedReceiver<PathBuf>>,
    shutdown: watch::Receiver<bool>,
    backoff: StdMutex<BackoffState>,
    initial_scan_done: AtomicBool,
    in_flight: AtomicUsize,
    generation_turnover: Mutex<()>,
}

impl fmt::Debug for ScanScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanScheduler")
            .field("config", &self.shared.config)
            .field(
                "initial_scan_done",
                &self.shared.initial_scan_done.load(Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}

impl ScanScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ScannerConfig,
        auto_delete_duplicates: bool,
        pipeline: Arc<ValidationPipeline>,
        inventory: Arc<Inventory>,
        managers: Vec<Arc<dyn LibraryManager>>,
        store: Arc<StateStore>,
        notifier: Arc<dyn Notifier>,
        gate: Arc<ReplacementGate>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (immediate_tx, immediate_rx) = mpsc::unbounded_channel();
        let initial_scan_done = store.read(|s| s.initial_scan_done);
        ScanScheduler {
            shared: Arc::new(Shared {
                config,
                auto_delete_duplicates,
                pipeline,
                inventory,
                managers,
                store,
                notifier,
                gate,
                immediate_tx,
                immediate_rx: Mutex::new(immediate_rx),
                shutdown,
                backoff: StdMutex::new(BackoffState::default()),
                initial_scan_done: AtomicBool::new(initial_scan_done),
                in_flight: AtomicUsize::new(0),
                generation_turnover: Mutex::new(()),
            }),
        }
    }

    /// Queue a path on the immediate lane. Returns false when no worker
    /// will ever pick it up (shutdown).
    pub fn request_immediate(&self, path: PathBuf) -> bool {
        self.shared.immediate_tx.send(path).is_ok()
    }

    pub fn generation(&self) -> u64 {
        self.shared.store.read(|s| s.generation)
    }

    pub fn initial_scan_done(&self) -> bool {
        self.shared.initial_scan_done.load(Ordering::Relaxed)
    }

    /// Reset the in-memory lifecycle after a state clear.
    pub fn reset_lifecycle(&self) {
        self.shared.initial_scan_done.store(false, Ordering::Relaxed);
    }

    /// Spawn the worker pool and the TV refresh loop.
    pub fn spawn_all(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for worker in 0..self.shared.config.concurrency.max(1) {
            let shared = self.shared.clone();
            handles.push(tokio::spawn(async move {
                run_worker(shared, worker).await;
            }));
        }
        if self.shared.managers.iter().any(|m| m.is_tv()) {
            let shared = self.shared.clone();
            handles.push(tokio::spawn(async move {
                run_tv_refresh(shared).await;
            }));
        }
        handles
    }

    /// Eagerly enumerate the movie instances.
    pub async fn refresh_movies(&self) -> usize {
        self.shared.refresh(false).await
    }

    /// Bulk-enumerate the TV instances (expensive).
    pub async fn refresh_tv(&self) -> usize {
        self.shared.refresh(true).await
    }

    /// Rebuild the pending queue for the current generation, e.g. after a
    /// restart or a state clear.
    pub fn rebuild_pending(&self) {
        let (generation, completed) = self
            .shared
            .store
            .read(|s| (s.generation, s.completed.clone()));
        self.shared.inventory.rebuild_pending(generation, &completed);
    }

    /// Process one extra background batch right now, without touching the
    /// pacing of the scheduled ticks.
    pub async fn trigger_batch(&self) -> usize {
        let shared = &self.shared;
        let batch = batch_size(shared.config.files_per_hour);
        info!(batch, "manual scan batch triggered");
        let mut processed = 0;
        for _ in 0..batch {
            if !shared.background_step().await {
                break;
            }
            processed += 1;
        }
        processed
    }
}

async fn run_worker(shared: Arc<Shared>, worker: usize) {
    let period = worker_period(shared.config.files_per_hour, shared.config.concurrency);
    debug!(worker, period_secs = period.as_secs_f64(), "scan worker started");
    let mut shutdown = shared.shutdown.clone();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            request = next_immediate(&shared) => {
                match request {
                    Some(path) => shared.process_immediate(path).await,
                    None => break,
                }
            }
            _ = ticker.tick() => {
                if shared.config.enabled {
                    shared.background_step().await;
                }
            }
        }
    }
    debug!(worker, "scan worker stopped");
}

/// Shared receiver: whichever worker grabs the lock serves the immediate
/// lane; the rest keep sweeping.
async fn next_immediate(shared: &Shared) -> Option<PathBuf> {
    let mut rx = shared.immediate_rx.lock().await;
    rx.recv().await
}

async fn run_tv_refresh(shared: Arc<Shared>) {
    let mut shutdown = shared.shutdown.clone();
    let (hour, minute) = match shared.config.tv_refresh_hm() {
        Ok(hm) => hm,
        Err(e) => {
            error!(error = %e, "invalid TV refresh time, TV enumeration disabled");
            return;
        }
    };

    // First run on startup when an instance has never been enumerated.
    let never_refreshed = shared.store.read(|s| {
        shared
            .managers
            .iter()
            .filter(|m| m.is_tv())
            .any(|m| !s.tv_refreshed_at.contains_key(m.instance().as_str()))
    });
    if never_refreshed {
        shared.refresh(true).await;
    }

    loop {
        let delay = until_daily(hour, minute);
        debug!(delay_secs = delay.as_secs(), "next TV refresh scheduled");
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(delay) => {
                shared.refresh(true).await;
            }
        }
    }
}

impl Shared {
    /// Enumerate all managers of one flavour and merge into the inventory.
    /// Per-instance failures are logged and skipped; the rest still merge.
    async fn refresh(&self, tv: bool) -> usize {
        let (generation, completed) = self.store.read(|s| (s.generation, s.completed.clone()));
        let mut merged = 0;
        for manager in self.managers.iter().filter(|m| m.is_tv() == tv) {
            let instance = manager.instance().clone();
            match manager.list_records().await {
                Ok(records) => {
                    let summary =
                        self.inventory
                            .merge_records(&instance, records, generation, &completed);
                    merged += summary.total;
                    if tv {
                        self.store.update(|s| {
                            s.tv_refreshed_at
                                .insert(instance.as_str().to_string(), chrono::Utc::now());
                        });
                    }
                }
                Err(e) => {
                    error!(%instance, error = %e, "library enumeration failed");
                }
            }
        }
        merged
    }

    async fn process_immediate(&self, path: PathBuf) {
        let item = match self.inventory.find_by_path(&path) {
            Some(item) => Some(item),
            None => {
                // Fresh imports may not be enumerated yet; movies are cheap
                // to re-list.
                self.refresh(false).await;
                self.inventory.find_by_path(&path)
            }
        };
        let Some(item) = item else {
            warn!(path = %path.display(), "immediate validation for unknown path ignored");
            return;
        };

        let generation = self.store.read(|s| s.generation);
        match self.pipeline.process(&item, generation).await {
            Ok(verdict) => {
                debug!(path = %path.display(), %verdict, "immediate validation finished");
            }
            Err(CoreError::ProbeUnavailable(reason)) => {
                self.note_unavailable(&reason);
                warn!(path = %path.display(), %reason, "immediate validation hit unavailable adapter");
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "immediate validation failed");
            }
        }
    }

    /// One background dequeue. Returns false when there was nothing to do
    /// (empty queue, paused, or lifecycle finished).
    async fn background_step(&self) -> bool {
        if self.backoff_active() {
            return false;
        }
        if self.config.mode == ScanMode::WatchOnly
            && self.initial_scan_done.load(Ordering::Relaxed)
        {
            return false;
        }

        let generation = self.store.read(|s| s.generation);
        let Some(item) = self.inventory.next_pending(generation) else {
            self.maybe_complete_generation(generation).await;
            return false;
        };

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let result = self.pipeline.process(&item, generation).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(_) => {
                self.reset_backoff();
                true
            }
            Err(CoreError::ProbeUnavailable(reason)) => {
                // Not the file's fault: put it back and pause the lane.
                self.inventory.requeue_front(item.key.clone());
                self.note_unavailable(&reason);
                false
            }
            Err(e) => {
                error!(key = %item.key, error = %e, "background validation failed");
                true
            }
        }
    }

    /// Close out a finished sweep: watch-only flips `initial_scan_done`;
    /// continuous starts the next generation immediately.
    async fn maybe_complete_generation(&self, generation: u64) {
        let _turnover = self.generation_turnover.lock().await;

        // Re-check under the lock; another worker may have finished the
        // turnover while we waited.
        if self.store.read(|s| s.generation) != generation {
            return;
        }
        if self.config.mode == ScanMode::WatchOnly
            && self.initial_scan_done.load(Ordering::Relaxed)
        {
            return;
        }
        if self.inventory.pending_len() > 0
            || self.in_flight.load(Ordering::SeqCst) > 0
            || self.inventory.is_empty()
        {
            return;
        }
        let scanned = self.store.read(|s| s.completed.len() as u64);
        if scanned == 0 {
            // Nothing was ever swept (e.g. TV enumeration still pending).
            return;
        }

        self.notifier.notify(JanitorEvent::GenerationCompleted {
            generation,
            scanned,
        });

        if self.auto_delete_duplicates {
            self.offer_duplicate_removals().await;
        }

        match self.config.mode {
            ScanMode::WatchOnly => {
                info!(generation, scanned, "initial library scan completed");
                self.initial_scan_done.store(true, Ordering::Relaxed);
                self.store.update(|s| s.initial_scan_done = true);
            }
            ScanMode::Continuous => {
                let next = generation + 1;
                info!(generation, next, scanned, "generation completed, starting next sweep");
                self.store.update(|s| {
                    s.generation = next;
                    s.completed.clear();
                });
                self.inventory
                    .rebuild_pending(next, &std::collections::HashSet::new());
            }
        }
    }

    /// Post-generation duplicate pass: offer every non-best copy to the
    /// gate. Needs the full inventory snapshot, so it never runs inline
    /// with per-file scanning.
    async fn offer_duplicate_removals(&self) {
        let snapshot = self.inventory.snapshot();
        let groups = find_duplicates(&snapshot);
        for group in groups {
            let best: Option<ItemKey> = group
                .members
                .iter()
                .find(|m| m.keep)
                .map(|m| m.key.clone());
            let Some(best) = best else { continue };
            for member in group.members.iter().filter(|m| !m.keep) {
                if self.gate.has_queued(&member.key).await {
                    continue;
                }
                let Some(item) = self.inventory.get(&member.key) else {
                    continue;
                };
                self.pipeline
                    .submit_action(&item, ActionReason::DuplicateOf(best.clone()))
                    .await;
            }
        }
    }

    fn backoff_active(&self) -> bool {
        let state = self.backoff.lock().unwrap_or_else(|p| p.into_inner());
        state
            .until
            .map(|until| Instant::now() < until)
            .unwrap_or(false)
    }

    fn note_unavailable(&self, reason: &str) {
        let base = Duration::from_secs(self.config.backoff_base_secs.max(1));
        let cap = Duration::from_secs(self.config.backoff_max_secs.max(1));
        let mut state = self.backoff.lock().unwrap_or_else(|p| p.into_inner());
        let next = state
            .current
            .map(|current| (current * 2).min(cap))
            .unwrap_or(base);
        state.current = Some(next);
        state.until = Some(Instant::now() + next);
        warn!(
            %reason,
            retry_in_secs = next.as_secs(),
            "probe adapter unavailable, background lane paused"
        );
    }

    fn reset_backoff(&self) {
        let mut state = self.backoff.lock().unwrap_or_else(|p| p.into_inner());
        state.current = None;
        state.until = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_rate_is_split_across_workers() {
        // 300 files/hour is one file every 12s; with 2 workers each ticks
        // every 24s so the pool still does 300/hour.
        assert_eq!(worker_period(300, 2), Duration::from_secs(24));
        assert_eq!(worker_period(300, 1), Duration::from_secs(12));
        assert_eq!(worker_period(3_600, 4), Duration::from_secs(4));
    }

    #[test]
    fn degenerate_pacing_inputs_are_clamped() {
        assert_eq!(worker_period(0, 0), Duration::from_secs(3_600));
    }

    #[test]
    fn manual_batch_matches_one_minute_of_rate() {
        assert_eq!(batch_size(300), 5);
        assert_eq!(batch_size(100), 1);
        assert_eq!(batch_size(0), 1);
    }

    #[test]
    fn daily_delay_is_under_a_day() {
        let delay = until_daily(3, 0);
        assert!(delay <= Duration::from_secs(24 * 3_600));
        assert!(delay > Duration::ZERO);
    }
}
