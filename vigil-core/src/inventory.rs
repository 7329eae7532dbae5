//! In-memory index of every known file per library instance.
//!
//! Source of truth for what needs (re)scanning. Reads are lock-free via the
//! dashmap; verdict writes are per-item and atomic. The pending queue is
//! the current generation's sweep order, shuffled so the library is not
//! always walked alphabetically.

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::seq::SliceRandom;
use tracing::{debug, info};
use vigil_model::{InstanceName, ItemKey, MediaInfo, MediaItem, Verdict};

use crate::manager::MediaRecord;

#[derive(Debug, Default)]
struct PendingQueue {
    queue: VecDeque<ItemKey>,
    members: HashSet<ItemKey>,
}

impl PendingQueue {
    fn push_shuffled(&mut self, mut keys: Vec<ItemKey>) {
        keys.retain(|k| !self.members.contains(k));
        keys.shuffle(&mut rand::rng());
        for key in keys {
            self.members.insert(key.clone());
            self.queue.push_back(key);
        }
    }

    fn push_front(&mut self, key: ItemKey) {
        if self.members.insert(key.clone()) {
            self.queue.push_front(key);
        }
    }

    fn pop(&mut self) -> Option<ItemKey> {
        let key = self.queue.pop_front()?;
        self.members.remove(&key);
        Some(key)
    }

    fn clear(&mut self) {
        self.queue.clear();
        self.members.clear();
    }

    fn len(&self) -> usize {
        self.queue.len()
    }
}

/// Result of merging one instance's enumeration into the inventory.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeSummary {
    pub total: usize,
    pub added: usize,
    pub newly_pending: usize,
    pub gone_missing: usize,
}

#[derive(Debug, Default)]
pub struct Inventory {
    items: DashMap<ItemKey, MediaItem>,
    pending: Mutex<PendingQueue>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, key: &ItemKey) -> Option<MediaItem> {
        self.items.get(key).map(|item| item.clone())
    }

    pub fn find_by_path(&self, path: &Path) -> Option<MediaItem> {
        self.items
            .iter()
            .find(|item| item.path.as_deref() == Some(path))
            .map(|item| item.clone())
    }

    /// Merge one instance's enumeration. Existing items are refreshed in
    /// place; a changed path means a new file and resets scan history for
    /// that item. Records no longer listed are marked missing, not removed.
    pub fn merge_records(
        &self,
        instance: &InstanceName,
        records: Vec<MediaRecord>,
        generation: u64,
        completed: &HashSet<ItemKey>,
    ) -> MergeSummary {
        let mut summary = MergeSummary {
            total: records.len(),
            ..MergeSummary::default()
        };
        let mut seen: HashSet<ItemKey> = HashSet::with_capacity(records.len());
        let mut candidates: Vec<ItemKey> = Vec::new();

        for record in records {
            let key = ItemKey {
                instance: instance.clone(),
                record: record.record,
            };
            seen.insert(key.clone());

            match self.items.entry(key.clone()) {
                Entry::Occupied(mut occupied) => {
                    let item = occupied.get_mut();
                    let replaced_on_disk = item.path != record.path;
                    item.title = record.title;
                    item.kind = record.kind;
                    item.path = record.path;
                    item.file_id = record.file_id;
                    item.size_bytes = record.size_bytes;
                    item.quality = record.quality;
                    item.runtime_minutes = record.runtime_minutes;
                    item.missing = false;
                    if replaced_on_disk {
                        // Different file now; everything we knew is stale.
                        item.last_verdict = None;
                        item.verdict_at = None;
                        item.media_info = None;
                        item.scanned_generation = 0;
                    }
                }
                Entry::Vacant(vacant) => {
                    summary.added += 1;
                    vacant.insert(MediaItem {
                        key: key.clone(),
                        kind: record.kind,
                        title: record.title,
                        path: record.path,
                        file_id: record.file_id,
                        size_bytes: record.size_bytes,
                        quality: record.quality,
                        runtime_minutes: record.runtime_minutes,
                        media_info: None,
                        last_verdict: None,
                        verdict_at: None,
                        scanned_generation: 0,
                        missing: false,
                    });
                }
            }

            if let Some(item) = self.items.get(&key)
                && item.is_scannable()
                && item.scanned_generation < generation
                && !completed.contains(&key)
            {
                candidates.push(key);
            }
        }

        for mut item in self.items.iter_mut() {
            if item.key.instance == *instance && !seen.contains(&item.key) && !item.missing {
                item.missing = true;
                summary.gone_missing += 1;
            }
        }

        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        let before = pending.len();
        pending.push_shuffled(candidates);
        summary.newly_pending = pending.len() - before;

        info!(
            %instance,
            total = summary.total,
            added = summary.added,
            pending = summary.newly_pending,
            missing = summary.gone_missing,
            "inventory merged"
        );
        summary
    }

    /// Rebuild the pending queue for a (new) generation from scratch.
    pub fn rebuild_pending(&self, generation: u64, completed: &HashSet<ItemKey>) -> usize {
        let candidates: Vec<ItemKey> = self
            .items
            .iter()
            .filter(|item| {
                item.is_scannable()
                    && item.scanned_generation < generation
                    && !completed.contains(&item.key)
            })
            .map(|item| item.key.clone())
            .collect();

        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        pending.clear();
        pending.push_shuffled(candidates);
        debug!(generation, pending = pending.len(), "pending queue rebuilt");
        pending.len()
    }

    /// Next item the background sweep should look at, skipping anything
    /// that became unscannable or was already covered this generation.
    pub fn next_pending(&self, generation: u64) -> Option<MediaItem> {
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        while let Some(key) = pending.pop() {
            if let Some(item) = self.items.get(&key)
                && item.is_scannable()
                && item.scanned_generation < generation
            {
                return Some(item.clone());
            }
        }
        None
    }

    /// Put an item back at the head of the queue (probe adapter outage).
    pub fn requeue_front(&self, key: ItemKey) {
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        pending.push_front(key);
    }

    pub fn pending_len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .len()
    }

    /// Write a verdict. Per-item atomic: the dashmap entry is updated in
    /// one critical section.
    pub fn record_verdict(
        &self,
        key: &ItemKey,
        verdict: Verdict,
        info: Option<MediaInfo>,
        generation: u64,
    ) -> bool {
        match self.items.get_mut(key) {
            Some(mut item) => {
                item.last_verdict = Some(verdict);
                item.verdict_at = Some(Utc::now());
                if info.is_some() {
                    item.media_info = info;
                }
                item.scanned_generation = generation;
                true
            }
            None => false,
        }
    }

    /// Forget which generation each item was scanned under, so a reset
    /// generation counter sweeps everything again. Verdicts stay as the
    /// last known state for reporting.
    pub fn reset_scan_marks(&self) {
        for mut item in self.items.iter_mut() {
            item.scanned_generation = 0;
        }
    }

    /// The file was deleted for replacement; the record stays until the
    /// manager re-imports and the next enumeration brings the new path.
    pub fn mark_replaced(&self, key: &ItemKey) {
        if let Some(mut item) = self.items.get_mut(key) {
            item.path = None;
            item.missing = true;
        }
    }

    pub fn snapshot(&self) -> Vec<MediaItem> {
        self.items.iter().map(|item| item.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use vigil_model::MediaKind;

    fn movie_record(id: i64, title: &str, path: &str) -> MediaRecord {
        MediaRecord {
            record: vigil_model::RecordId(id),
            title: title.to_string(),
            kind: MediaKind::Movie,
            path: Some(PathBuf::from(path)),
            file_id: Some(id * 10),
            size_bytes: Some(1_000_000),
            quality: Some("Bluray-1080p".to_string()),
            runtime_minutes: Some(110),
        }
    }

    #[test]
    fn merge_marks_unlisted_items_missing() {
        let inventory = Inventory::new();
        let instance = InstanceName::from("radarr-main");
        let completed = HashSet::new();

        inventory.merge_records(
            &instance,
            vec![
                movie_record(1, "Avatar", "/movies/Avatar (2009)/avatar.mkv"),
                movie_record(2, "Titanic", "/movies/Titanic (1997)/titanic.mkv"),
            ],
            1,
            &completed,
        );
        assert_eq!(inventory.pending_len(), 2);

        let summary = inventory.merge_records(
            &instance,
            vec![movie_record(1, "Avatar", "/movies/Avatar (2009)/avatar.mkv")],
            1,
            &completed,
        );
        assert_eq!(summary.gone_missing, 1);
        let titanic = inventory.get(&ItemKey::new("radarr-main", 2)).unwrap();
        assert!(titanic.missing);
    }

    #[test]
    fn path_change_resets_scan_history() {
        let inventory = Inventory::new();
        let instance = InstanceName::from("radarr-main");
        let completed = HashSet::new();
        let key = ItemKey::new("radarr-main", 1);

        inventory.merge_records(
            &instance,
            vec![movie_record(1, "Avatar", "/movies/old.mkv")],
            1,
            &completed,
        );
        inventory.record_verdict(&key, Verdict::Healthy, None, 1);
        assert_eq!(inventory.get(&key).unwrap().scanned_generation, 1);

        inventory.merge_records(
            &instance,
            vec![movie_record(1, "Avatar", "/movies/new.mkv")],
            1,
            &completed,
        );
        let item = inventory.get(&key).unwrap();
        assert_eq!(item.scanned_generation, 0);
        assert!(item.last_verdict.is_none());
    }

    #[test]
    fn next_pending_skips_completed_generation() {
        let inventory = Inventory::new();
        let instance = InstanceName::from("radarr-main");
        let completed = HashSet::new();
        inventory.merge_records(
            &instance,
            vec![movie_record(1, "Avatar", "/movies/a.mkv")],
            1,
            &completed,
        );

        let item = inventory.next_pending(1).expect("one pending item");
        inventory.record_verdict(&item.key, Verdict::Healthy, None, 1);
        assert!(inventory.next_pending(1).is_none());

        // A new generation makes it pending again.
        inventory.rebuild_pending(2, &HashSet::new());
        assert!(inventory.next_pending(2).is_some());
    }
}
