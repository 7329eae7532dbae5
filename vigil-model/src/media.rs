use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::keys::ItemKey;
use crate::verdict::Verdict;

/// Lifecycle mode of the background sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// Sweep the inventory once, then leave only the immediate lane active.
    #[default]
    WatchOnly,
    /// On completing a generation, immediately start the next one.
    Continuous,
}

/// Movie vs. episode, with the identity details needed for duplicate
/// grouping and title matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaKind {
    Movie,
    Episode {
        series: String,
        season: u32,
        episode: u32,
    },
}

impl MediaKind {
    pub fn is_movie(&self) -> bool {
        matches!(self, MediaKind::Movie)
    }
}

/// Technical facts from the most recent successful probe of a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MediaInfo {
    pub duration_secs: Option<f64>,
    pub bitrate_kbps: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub video_codec: Option<String>,
    pub hdr: bool,
}

impl MediaInfo {
    /// Pixel count of the video stream, when dimensions are known.
    pub fn pixels(&self) -> Option<u64> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(u64::from(w) * u64::from(h)),
            _ => None,
        }
    }
}

/// Resolution tier used by the bitrate floors and the codec breakdown
/// report. A stream qualifies for a tier at 80% of the nominal pixel count,
/// so slightly cropped encodes still land where a viewer would place them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionTier {
    Sd,
    Hd720,
    Hd1080,
    Uhd4k,
}

impl ResolutionTier {
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        let pixels = u64::from(width) * u64::from(height);
        if pixels * 10 >= 3840 * 2160 * 8 {
            ResolutionTier::Uhd4k
        } else if pixels * 10 >= 1920 * 1080 * 8 {
            ResolutionTier::Hd1080
        } else if pixels * 10 >= 1280 * 720 * 8 {
            ResolutionTier::Hd720
        } else {
            ResolutionTier::Sd
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResolutionTier::Sd => "sd",
            ResolutionTier::Hd720 => "720p",
            ResolutionTier::Hd1080 => "1080p",
            ResolutionTier::Uhd4k => "4k",
        }
    }
}

impl std::fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One tracked file. Owned by the inventory; the scheduler touches scan
/// bookkeeping, the classifier writes verdicts, nothing else mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub key: ItemKey,
    pub kind: MediaKind,
    /// Expected title as the library manager reports it. For episodes this
    /// is a display title ("Series - S01E02"); matching uses `kind.series`.
    pub title: String,
    pub path: Option<PathBuf>,
    /// File id used for delete calls against the manager.
    pub file_id: Option<i64>,
    pub size_bytes: Option<u64>,
    pub quality: Option<String>,
    pub runtime_minutes: Option<u32>,
    pub media_info: Option<MediaInfo>,
    pub last_verdict: Option<Verdict>,
    pub verdict_at: Option<DateTime<Utc>>,
    /// Generation this item was last scanned under.
    pub scanned_generation: u64,
    /// Set when the source record vanished or the file left the disk. The
    /// item stays in the model for reporting until the next enumeration.
    pub missing: bool,
}

impl MediaItem {
    /// Whether the background sweep can usefully scan this item right now.
    pub fn is_scannable(&self) -> bool {
        !self.missing && self.path.is_some()
    }

    /// The title the fuzzy path check matches against.
    pub fn expected_title(&self) -> &str {
        match &self.kind {
            MediaKind::Movie => &self.title,
            MediaKind::Episode { series, .. } => series,
        }
    }
}
