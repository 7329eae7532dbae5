//! Boundary to the external media-inspection tool.
//!
//! The core never decodes anything itself; it hands a path to the adapter
//! and gets structured facts (or a typed failure) back. Implementations
//! wrap ffprobe/ffmpeg or whatever inspector the deployment ships.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use vigil_model::MediaInfo;

/// Why a probe could not produce metadata.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The file was readable but the inspector rejected it.
    #[error("probe failed: {0}")]
    Failed(String),

    /// The inspector did not answer within its own deadline.
    #[error("probe timed out")]
    Timeout,

    /// The adapter itself is unreachable. Distinct from a bad file: the
    /// scheduler pauses and retries instead of recording a verdict.
    #[error("probe adapter unavailable: {0}")]
    Unavailable(String),
}

/// Container facts for one file.
#[derive(Debug, Clone, Default)]
pub struct ProbeReport {
    pub duration_secs: Option<f64>,
    pub bitrate_kbps: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub video_codec: Option<String>,
    pub hdr: bool,
    /// Stereoscopic hint from stream metadata (e.g. a `stereo_mode` tag),
    /// when the inspector saw one.
    pub stereo_hint: Option<String>,
}

impl ProbeReport {
    pub fn media_info(&self) -> MediaInfo {
        MediaInfo {
            duration_secs: self.duration_secs,
            bitrate_kbps: self.bitrate_kbps,
            width: self.width,
            height: self.height,
            video_codec: self.video_codec.clone(),
            hdr: self.hdr,
        }
    }
}

/// Result of decoding a sample window or a full stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeCheck {
    Ok,
    Error(String),
    Timeout,
}

/// Opaque inspection capability the classifier drives.
///
/// `decode_*` return `Err` only for [`ProbeError::Unavailable`]; a decode
/// problem in the file itself comes back as a [`DecodeCheck`] so the
/// classifier can turn it into a verdict.
#[async_trait]
pub trait ProbeAdapter: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<ProbeReport, ProbeError>;

    async fn decode_sample(
        &self,
        path: &Path,
        start_secs: f64,
        length_secs: u32,
        timeout: Duration,
    ) -> Result<DecodeCheck, ProbeError>;

    async fn decode_full(&self, path: &Path, timeout: Duration)
    -> Result<DecodeCheck, ProbeError>;
}
