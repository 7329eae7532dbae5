//! Validation classifier.
//!
//! Turns probe output plus the expected record metadata into exactly one
//! verdict per scan attempt, deterministically. Checks run in a fixed
//! order and short-circuit on the first failure, so a corrupt file is
//! always reported corrupt even when its bitrate and title would also have
//! failed. The fuzzy title check runs last and only on files that passed
//! every technical check: a mismatch there means wrong content, not a
//! broken file.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};
use vigil_config::{DeepScanMode, ValidationConfig};
use vigil_model::{MediaInfo, MediaItem, ResolutionTier, Verdict};

use crate::error::{CoreError, Result};
use crate::probe::{DecodeCheck, ProbeAdapter, ProbeError, ProbeReport};

/// Verdict plus whatever technical metadata the probe produced, so the
/// inventory can remember stream facts even for unhealthy files.
#[derive(Debug, Clone)]
pub struct Classification {
    pub verdict: Verdict,
    pub media_info: Option<MediaInfo>,
}

pub struct Classifier {
    config: ValidationConfig,
    matcher: SkimMatcherV2,
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classifier")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Classifier {
    pub fn new(config: ValidationConfig) -> Self {
        Classifier {
            config,
            matcher: SkimMatcherV2::default(),
        }
    }

    /// Classify one item. `Err` means the probe adapter itself is
    /// unreachable; everything about the file comes back as a verdict.
    pub async fn classify(
        &self,
        probe: &dyn ProbeAdapter,
        item: &MediaItem,
    ) -> Result<Classification> {
        let Some(path) = item.path.as_deref() else {
            return Err(CoreError::UnknownItem(format!(
                "{} has no file path",
                item.key
            )));
        };

        let report = match probe.probe(path).await {
            Ok(report) => report,
            Err(ProbeError::Unavailable(reason)) => {
                return Err(CoreError::ProbeUnavailable(reason));
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "metadata probe failed");
                return Ok(Classification {
                    verdict: Verdict::Corrupt,
                    media_info: None,
                });
            }
        };

        let media_info = Some(report.media_info());
        let done = |verdict: Verdict| {
            Ok(Classification {
                verdict,
                media_info: media_info.clone(),
            })
        };

        if self.config.replace_3d
            && let Some(detection) = detect_stereo3d(path, &report)
        {
            return done(Verdict::Stereo3d { detection });
        }

        // Duration is the one fact every later check leans on; a probe that
        // cannot report it is inconclusive, and inconclusive is corrupt.
        let Some(duration) = report.duration_secs else {
            debug!(path = %path.display(), "probe reported no duration");
            return done(Verdict::Corrupt);
        };

        if self.config.check_duration
            && let Some(verdict) = self.check_duration(duration, item.runtime_minutes)
        {
            return done(verdict);
        }

        if self.config.deep_scan_enabled
            && let Some(verdict) = self.decode_checks(probe, path, duration).await?
        {
            return done(verdict);
        }

        if self.config.check_bitrate
            && let Some(verdict) = self.check_bitrate(&report, item.size_bytes, duration)
        {
            return done(verdict);
        }

        if let Some(found) = self.title_mismatch(path, item.expected_title()) {
            return done(Verdict::PathMismatch {
                expected: item.expected_title().to_string(),
                found,
            });
        }

        done(Verdict::Healthy)
    }

    fn check_duration(&self, duration: f64, runtime_minutes: Option<u32>) -> Option<Verdict> {
        let max_secs = f64::from(self.config.max_duration_hours) * 3600.0;
        if duration > max_secs {
            return Some(Verdict::WrongDuration {
                measured_secs: duration,
                max_allowed_secs: max_secs,
            });
        }
        let near_zero = duration < 60.0
            || runtime_minutes
                .map(|minutes| duration < f64::from(minutes) * 60.0 * 0.05)
                .unwrap_or(false);
        if near_zero {
            return Some(Verdict::WrongDuration {
                measured_secs: duration,
                max_allowed_secs: max_secs,
            });
        }
        None
    }

    /// Sample-window (or full-stream) decode tests. Returns `Err` only when
    /// the adapter is unreachable.
    async fn decode_checks(
        &self,
        probe: &dyn ProbeAdapter,
        path: &Path,
        duration: f64,
    ) -> Result<Option<Verdict>> {
        let timeout = Duration::from_secs(self.config.decode_timeout_seconds);

        if self.config.full_decode_enabled {
            return Ok(match self.run_decode(probe, path, None, timeout).await? {
                DecodeCheck::Ok => None,
                DecodeCheck::Error(e) => {
                    warn!(path = %path.display(), error = %e, "full decode failed");
                    Some(Verdict::EncodingError)
                }
                DecodeCheck::Timeout => Some(Verdict::EncodingError),
            });
        }

        let sample = self.config.sample_duration_seconds;
        let sample_f = f64::from(sample);

        // Start window. A timeout here means the reader never got going,
        // which is the truncation signature.
        match self.run_decode(probe, path, Some(0.0), timeout).await? {
            DecodeCheck::Ok => {}
            DecodeCheck::Timeout => return Ok(Some(Verdict::Truncated)),
            DecodeCheck::Error(e) => {
                warn!(path = %path.display(), error = %e, "decode failed at start");
                return Ok(Some(Verdict::EncodingError));
            }
        }

        if self.config.deep_scan_mode == DeepScanMode::Full {
            if duration > sample_f * 3.0 {
                let middle = duration / 2.0 - sample_f / 2.0;
                match self.run_decode(probe, path, Some(middle), timeout).await? {
                    DecodeCheck::Ok => {}
                    DecodeCheck::Error(_) | DecodeCheck::Timeout => {
                        return Ok(Some(Verdict::EncodingError));
                    }
                }
            }
            if duration > sample_f * 2.0 {
                let end = duration - sample_f;
                match self.run_decode(probe, path, Some(end), timeout).await? {
                    DecodeCheck::Ok => {}
                    DecodeCheck::Error(_) | DecodeCheck::Timeout => {
                        return Ok(Some(Verdict::EncodingError));
                    }
                }
            }
        }

        Ok(None)
    }

    async fn run_decode(
        &self,
        probe: &dyn ProbeAdapter,
        path: &Path,
        start: Option<f64>,
        timeout: Duration,
    ) -> Result<DecodeCheck> {
        let result = match start {
            Some(start) => {
                probe
                    .decode_sample(path, start, self.config.sample_duration_seconds, timeout)
                    .await
            }
            None => probe.decode_full(path, timeout).await,
        };
        match result {
            Ok(check) => Ok(check),
            Err(ProbeError::Unavailable(reason)) => Err(CoreError::ProbeUnavailable(reason)),
            Err(ProbeError::Timeout) => Ok(DecodeCheck::Timeout),
            Err(ProbeError::Failed(e)) => Ok(DecodeCheck::Error(e)),
        }
    }

    fn check_bitrate(
        &self,
        report: &ProbeReport,
        size_bytes: Option<u64>,
        duration: f64,
    ) -> Option<Verdict> {
        let (width, height) = (report.width?, report.height?);
        let measured_kbps = report.bitrate_kbps.or_else(|| {
            size_bytes.and_then(|bytes| {
                (duration > 0.0).then(|| ((bytes as f64 * 8.0 / 1000.0) / duration) as u64)
            })
        })?;

        let tier = ResolutionTier::from_dimensions(width, height);
        let base = match tier {
            ResolutionTier::Sd => self.config.min_bitrate_sd_kbps,
            ResolutionTier::Hd720 => self.config.min_bitrate_720p_kbps,
            ResolutionTier::Hd1080 => self.config.min_bitrate_1080p_kbps,
            ResolutionTier::Uhd4k => self.config.min_bitrate_4k_kbps,
        };
        let efficiency = codec_efficiency(report.video_codec.as_deref());
        let floor_kbps = (base as f64 * efficiency).round() as u64;

        (measured_kbps < floor_kbps).then(|| Verdict::LowBitrate {
            measured_kbps,
            floor_kbps,
        })
    }

    /// Fuzzy-match the file name and its enclosing folders against the
    /// expected title. Returns the offending name when nothing clears the
    /// threshold.
    fn title_mismatch(&self, path: &Path, expected: &str) -> Option<String> {
        let pattern = normalize_title(expected);
        if pattern.is_empty() {
            return None;
        }

        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
        let mut candidates: Vec<&str> = vec![stem];
        // Movie folders name the movie; episode files sit two levels below
        // the series folder, so look at both ancestors.
        for ancestor in path.ancestors().skip(1).take(2) {
            if let Some(name) = ancestor.file_name().and_then(|s| s.to_str()) {
                candidates.push(name);
            }
        }

        let normalized: Vec<String> = candidates.iter().map(|c| normalize_title(c)).collect();
        // Verbatim containment always passes; fuzzy scoring penalizes very
        // short titles too harshly to rely on alone.
        if normalized.iter().any(|c| c.contains(&pattern)) {
            return None;
        }

        let best = normalized
            .iter()
            .filter_map(|candidate| self.matcher.fuzzy_match(candidate, &pattern))
            .max()
            .unwrap_or(0);

        if best < self.config.title_match_threshold {
            Some(stem.to_string())
        } else {
            None
        }
    }
}

/// How much less bitrate a codec needs for comparable quality. Applied as
/// a multiplier on the tier floor.
pub fn codec_efficiency(codec: Option<&str>) -> f64 {
    match codec.map(|c| c.to_ascii_lowercase()).as_deref() {
        Some("hevc" | "h265" | "x265") => 0.65,
        Some("av1") => 0.55,
        Some("vp9") => 0.75,
        _ => 1.0,
    }
}

static STEREO3D_FILENAME: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)[.\-_ ]3D[.\-_ ]",
        r"(?i)[.\-_ ]H?SBS[.\-_ ]",
        r"(?i)[.\-_ ]H[.\-]?SBS[.\-_ ]",
        r"(?i)[.\-_ ]H?OU[.\-_ ]",
        r"(?i)[.\-_ ]H[.\-]?OU[.\-_ ]",
        r"(?i)[.\-_ ]H?TAB[.\-_ ]",
        r"(?i)[.\-_ ]MVC[.\-_ ]",
        r"(?i)Side[.\-_ ]?by[.\-_ ]?Side",
        r"(?i)Half[.\-_ ]?(SBS|OU)",
        r"(?i)Blu[.\-_ ]?Ray[.\-_ ]?3D",
        r"(?i)3D[.\-_ ]?BluRay",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("static 3D pattern compiles"))
    .collect()
});

/// Detect stereoscopic content from the filename, stream metadata, or an
/// implausible aspect ratio (SBS doubles width, OU doubles height).
fn detect_stereo3d(path: &Path, report: &ProbeReport) -> Option<String> {
    let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    for pattern in STEREO3D_FILENAME.iter() {
        if let Some(hit) = pattern.find(filename) {
            return Some(format!(
                "filename:{}",
                hit.as_str().trim_matches(&['.', '-', '_', ' '][..])
            ));
        }
    }

    if let Some(hint) = &report.stereo_hint {
        return Some(format!("metadata:{hint}"));
    }

    if let (Some(width), Some(height)) = (report.width, report.height)
        && height > 0
    {
        let ratio = f64::from(width) / f64::from(height);
        if ratio >= 3.2 {
            return Some(format!("sbs-aspect({width}x{height})"));
        }
        if ratio <= 1.0 && height >= 1080 {
            return Some(format!("ou-aspect({width}x{height})"));
        }
    }

    None
}

static TITLE_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\d{4}\)|\b(19|20)\d{2}\b").expect("static year pattern compiles"));

/// Lowercase, strip release years, and collapse separators so "Avatar
/// (2009)" and "avatar.2009.1080p" compare cleanly.
fn normalize_title(raw: &str) -> String {
    let stripped = TITLE_YEAR.replace_all(raw, " ");
    let mut out = String::with_capacity(stripped.len());
    let mut last_space = true;
    for c in stripped.chars() {
        let c = if c.is_alphanumeric() {
            c.to_ascii_lowercase()
        } else {
            ' '
        };
        if c == ' ' {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(c);
            last_space = false;
        }
    }
    out.trim_end().to_string()
}
