use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::DailyBudget;
use crate::keys::ItemKey;
use crate::media::ScanMode;

/// Which report the facade should build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Mismatches,
    Duplicates,
    CodecBreakdown,
    LibrarySize,
}

/// Which part of the library a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReportSource {
    #[default]
    All,
    Movies,
    Tv,
}

/// Lifetime bookkeeping carried in the persisted state snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LifetimeCounters {
    pub scanned: u64,
    pub invalid: u64,
    pub replaced: u64,
}

/// Snapshot returned by `status()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub mode: ScanMode,
    pub generation: u64,
    pub queue_depth: usize,
    pub initial_scan_done: bool,
    pub budget: DailyBudget,
    pub queued_actions: usize,
    pub counters: LifetimeCounters,
}

/// One file flagged by the path-mismatch check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MismatchEntry {
    pub key: ItemKey,
    pub title: String,
    pub expected: String,
    pub found: String,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MismatchReport {
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<MismatchEntry>,
}

/// One member of a duplicate group, best-first ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateMember {
    pub key: ItemKey,
    pub title: String,
    pub path: Option<PathBuf>,
    pub size_bytes: Option<u64>,
    pub quality: Option<String>,
    pub pixels: Option<u64>,
    /// True for the copy the ranking would keep.
    pub keep: bool,
}

/// Items sharing one logical identity, with the space reclaimed if all but
/// the best copy were removed. Derived from the inventory on demand, never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub identity: String,
    pub members: Vec<DuplicateMember>,
    pub savings_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecBreakdown {
    pub generated_at: DateTime<Utc>,
    pub by_codec: BTreeMap<String, usize>,
    pub by_tier: BTreeMap<String, usize>,
    /// Files never successfully probed.
    pub unprobed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    pub key: ItemKey,
    pub title: String,
    pub path: Option<PathBuf>,
    pub size_bytes: u64,
    pub quality: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibrarySizeReport {
    pub generated_at: DateTime<Utc>,
    pub total_files: usize,
    pub total_bytes: u64,
    pub largest: Vec<FileStat>,
    pub smallest: Vec<FileStat>,
    pub by_quality: BTreeMap<String, usize>,
    pub by_instance: BTreeMap<String, usize>,
}

/// Tagged union returned by `report(kind, source)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "report", rename_all = "snake_case")]
pub enum Report {
    Mismatches(MismatchReport),
    Duplicates { groups: Vec<DuplicateGroup> },
    CodecBreakdown(CodecBreakdown),
    LibrarySize(LibrarySizeReport),
}

/// Render a byte count the way the reports print it.
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{value:.2} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.2} PB")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_bytes_picks_the_right_unit() {
        assert_eq!(human_bytes(0), "0.00 B");
        assert_eq!(human_bytes(1023), "1023.00 B");
        assert_eq!(human_bytes(1536), "1.50 KB");
        assert_eq!(human_bytes(8_589_934_592), "8.00 GB");
    }
}
