use serde::{Deserialize, Serialize};

/// Outcome of classifying one file. Immutable once produced; a rescan
/// supersedes the previous verdict rather than mutating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Healthy,
    /// Metadata probe failed outright, or produced output too incomplete to
    /// classify. Inconclusive results are treated as corrupt.
    Corrupt,
    /// Decode never got going: the start-window test timed out.
    Truncated,
    /// Decode failed partway through the stream.
    EncodingError,
    LowBitrate {
        measured_kbps: u64,
        floor_kbps: u64,
    },
    WrongDuration {
        measured_secs: f64,
        max_allowed_secs: f64,
    },
    /// Technically valid media whose title does not match the expected
    /// record. Wrong bytes, not a naming problem: replaced, never renamed.
    PathMismatch {
        expected: String,
        found: String,
    },
    /// Stereoscopic/3D content detected (filename tag, stream metadata, or
    /// aspect-ratio heuristic).
    Stereo3d {
        detection: String,
    },
}

impl Verdict {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Verdict::Healthy)
    }

    /// Anything other than healthy can feed the replacement gate.
    pub fn is_actionable(&self) -> bool {
        !self.is_healthy()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Healthy => "healthy",
            Verdict::Corrupt => "corrupt",
            Verdict::Truncated => "truncated",
            Verdict::EncodingError => "encoding_error",
            Verdict::LowBitrate { .. } => "low_bitrate",
            Verdict::WrongDuration { .. } => "wrong_duration",
            Verdict::PathMismatch { .. } => "path_mismatch",
            Verdict::Stereo3d { .. } => "stereo_3d",
        }
    }

    /// Human-readable summary used in logs, notifications, and the
    /// blocklist reason message.
    pub fn detail(&self) -> String {
        match self {
            Verdict::Healthy => "healthy".to_string(),
            Verdict::Corrupt => "metadata probe failed".to_string(),
            Verdict::Truncated => "decode timed out at start of stream".to_string(),
            Verdict::EncodingError => "decode error mid-stream".to_string(),
            Verdict::LowBitrate {
                measured_kbps,
                floor_kbps,
            } => format!("bitrate {measured_kbps}kbps below floor {floor_kbps}kbps"),
            Verdict::WrongDuration {
                measured_secs,
                max_allowed_secs,
            } => format!(
                "duration {:.0}s outside allowed range (max {:.0}s)",
                measured_secs, max_allowed_secs
            ),
            Verdict::PathMismatch { expected, found } => {
                format!("expected '{expected}' but found '{found}'")
            }
            Verdict::Stereo3d { detection } => format!("3D content detected: {detection}"),
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}
