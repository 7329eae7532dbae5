//! Boundary to the library managers (Radarr/Sonarr).
//!
//! One trait object per configured instance. Enumeration cost differs
//! wildly between the two: movie listings are a single call, episode
//! listings walk every series, which is why the scheduler refreshes TV on
//! its own daily schedule.

use async_trait::async_trait;
use std::path::PathBuf;
use vigil_model::{InstanceName, MediaKind, RecordId};

use crate::error::Result;

/// A movie or episode record as the manager reports it.
#[derive(Debug, Clone)]
pub struct MediaRecord {
    pub record: RecordId,
    pub title: String,
    pub kind: MediaKind,
    pub path: Option<PathBuf>,
    pub file_id: Option<i64>,
    pub size_bytes: Option<u64>,
    pub quality: Option<String>,
    pub runtime_minutes: Option<u32>,
}

/// Client for one Radarr or Sonarr instance.
#[async_trait]
pub trait LibraryManager: Send + Sync {
    fn instance(&self) -> &InstanceName;

    /// True for Sonarr-style instances whose enumeration is expensive.
    fn is_tv(&self) -> bool;

    /// Every record that currently has a file on disk.
    async fn list_records(&self) -> Result<Vec<MediaRecord>>;

    async fn delete_file(&self, file_id: i64) -> Result<()>;

    /// Best-effort: block the release that produced the current file so the
    /// next search grabs something else.
    async fn blocklist_release(&self, record: RecordId, message: &str) -> Result<()>;

    async fn trigger_search(&self, record: RecordId) -> Result<()>;
}
