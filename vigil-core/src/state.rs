//! Restart-safe state snapshot.
//!
//! Everything that must survive a process restart lives in one JSON file:
//! the scan generation and its completed set, the daily replacement budget,
//! the queued-action FIFO, and the TV refresh bookkeeping. Writes are
//! atomic (temp file in the same directory, then rename over the old
//! snapshot), so a crash mid-write leaves the previous snapshot intact.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use vigil_model::{DailyBudget, ItemKey, LifetimeCounters, ReplacementAction};

/// The on-disk shape. Field additions must keep `serde(default)` so older
/// snapshots keep loading.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PersistedState {
    pub generation: u64,
    /// Item keys completed in the current generation.
    pub completed: HashSet<ItemKey>,
    pub budget: DailyBudget,
    /// Queued replacement FIFO, front first.
    pub queued: Vec<ReplacementAction>,
    pub initial_scan_done: bool,
    /// Instance name -> last bulk TV enumeration.
    pub tv_refreshed_at: BTreeMap<String, DateTime<Utc>>,
    pub counters: LifetimeCounters,
}

/// File-backed store guarding the snapshot with one lock. Mutations go
/// through [`StateStore::update`], which persists before returning.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: Mutex<PersistedState>,
}

impl StateStore {
    /// Open the snapshot at `path`. An unreadable snapshot is replaced by
    /// an empty one with a loud warning; this never fails and never
    /// crash-loops.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<PersistedState>(&bytes) {
                Ok(state) => {
                    info!(
                        path = %path.display(),
                        generation = state.generation,
                        completed = state.completed.len(),
                        queued = state.queued.len(),
                        "state snapshot loaded"
                    );
                    state
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "state snapshot unreadable, starting from empty state"
                    );
                    PersistedState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PersistedState::default(),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "state snapshot unreadable, starting from empty state"
                );
                PersistedState::default()
            }
        };
        StateStore {
            path,
            state: Mutex::new(state),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a value out of the snapshot.
    pub fn read<R>(&self, f: impl FnOnce(&PersistedState) -> R) -> R {
        let state = self.state.lock().unwrap_or_else(|poisoned| {
            // A panic while holding the lock cannot leave partial state:
            // every mutation completes before save.
            poisoned.into_inner()
        });
        f(&state)
    }

    /// Mutate the snapshot and persist it before returning.
    pub fn update<R>(&self, f: impl FnOnce(&mut PersistedState) -> R) -> R {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let result = f(&mut state);
        self.save_locked(&state);
        result
    }

    fn save_locked(&self, state: &PersistedState) {
        if let Err(e) = self.write_atomic(state) {
            // Losing a save is survivable (the next mutation retries);
            // losing the process over it is not.
            error!(path = %self.path.display(), error = %e, "failed to persist state snapshot");
        }
    }

    fn write_atomic(&self, state: &PersistedState) -> std::io::Result<()> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut tmp, state)?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_snapshot_starts_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vigil.json");
        std::fs::write(&path, b"{ not json").expect("write garbage");

        let store = StateStore::open(&path);
        assert_eq!(store.read(|s| s.generation), 0);
        assert!(store.read(|s| s.queued.is_empty()));
    }

    #[test]
    fn update_persists_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vigil.json");

        let store = StateStore::open(&path);
        store.update(|s| {
            s.generation = 3;
            s.initial_scan_done = true;
            s.completed.insert(ItemKey::new("radarr-main", 42));
        });
        drop(store);

        let store = StateStore::open(&path);
        assert_eq!(store.read(|s| s.generation), 3);
        assert!(store.read(|s| s.initial_scan_done));
        assert!(store.read(|s| s.completed.contains(&ItemKey::new("radarr-main", 42))));
    }
}
