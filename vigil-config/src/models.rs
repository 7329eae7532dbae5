use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use vigil_model::ScanMode;

use crate::loader::ConfigError;

/// A configured Radarr or Sonarr instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub name: String,
    pub url: String,
    pub api_key: String,
}

/// Validation thresholds for the classifier.
///
/// The bitrate floors are per resolution tier; the classifier multiplies
/// them by a codec efficiency factor before comparing, so an HEVC encode is
/// held to a lower floor than an H.264 one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub check_duration: bool,
    pub max_duration_hours: u32,

    pub check_bitrate: bool,
    pub min_bitrate_sd_kbps: u64,
    pub min_bitrate_720p_kbps: u64,
    pub min_bitrate_1080p_kbps: u64,
    pub min_bitrate_4k_kbps: u64,

    pub deep_scan_enabled: bool,
    pub deep_scan_mode: DeepScanMode,
    pub sample_duration_seconds: u32,
    pub decode_timeout_seconds: u64,
    /// Decode the entire stream instead of sample windows. Much slower.
    pub full_decode_enabled: bool,

    /// Treat stereoscopic/3D content as replaceable.
    pub replace_3d: bool,

    /// Minimum fuzzy-match score for the path/title check.
    pub title_match_threshold: i64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            check_duration: true,
            max_duration_hours: 12,
            check_bitrate: true,
            min_bitrate_sd_kbps: 500,
            min_bitrate_720p_kbps: 1_500,
            min_bitrate_1080p_kbps: 3_000,
            min_bitrate_4k_kbps: 8_000,
            deep_scan_enabled: true,
            deep_scan_mode: DeepScanMode::Partial,
            sample_duration_seconds: 30,
            decode_timeout_seconds: 60,
            full_decode_enabled: false,
            replace_3d: false,
            title_match_threshold: 60,
        }
    }
}

/// Where the deep scan places its sample windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeepScanMode {
    /// Start of the stream only.
    #[default]
    Partial,
    /// Start, middle, and end.
    Full,
}

/// Background sweep pacing and lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub enabled: bool,
    /// Aggregate background validation rate across all workers.
    pub files_per_hour: u32,
    /// Parallel probe/classify workers.
    pub concurrency: usize,
    pub mode: ScanMode,
    /// Local time of day ("HH:MM") for the bulk TV enumeration.
    pub tv_refresh_time: String,
    /// Backoff when the probe adapter is unreachable.
    pub backoff_base_secs: u64,
    pub backoff_max_secs: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            files_per_hour: 100,
            concurrency: 2,
            mode: ScanMode::WatchOnly,
            tv_refresh_time: "03:00".to_string(),
            backoff_base_secs: 30,
            backoff_max_secs: 1_800,
        }
    }
}

impl ScannerConfig {
    /// Parse `tv_refresh_time` into (hour, minute).
    pub fn tv_refresh_hm(&self) -> Result<(u32, u32), ConfigError> {
        parse_hhmm(&self.tv_refresh_time).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "scanner.tv_refresh_time '{}' is not HH:MM",
                self.tv_refresh_time
            ))
        })
    }
}

/// What the gate and executor are allowed to do.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionsConfig {
    pub auto_replace: bool,
    pub auto_delete_duplicates: bool,
    pub blocklist_bad_releases: bool,
    pub max_replacements_per_day: u32,
    /// Full gate bookkeeping, no delete/blocklist/search calls.
    pub dry_run: bool,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            auto_replace: true,
            auto_delete_duplicates: false,
            blocklist_bad_releases: true,
            max_replacements_per_day: 10,
            dry_run: false,
        }
    }
}

/// Location of the persisted state snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub path: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/data/state/vigil.json"),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub radarr: Vec<InstanceConfig>,
    pub sonarr: Vec<InstanceConfig>,
    pub validation: ValidationConfig,
    pub scanner: ScannerConfig,
    pub actions: ActionsConfig,
    pub state: StateConfig,
}

/// A non-fatal configuration smell, logged at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning(pub String);

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Config {
    /// Reject configs the core cannot run with; collect warnings for the
    /// rest.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        if self.scanner.files_per_hour == 0 {
            return Err(ConfigError::Invalid(
                "scanner.files_per_hour must be at least 1".to_string(),
            ));
        }
        if self.scanner.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "scanner.concurrency must be at least 1".to_string(),
            ));
        }
        self.scanner.tv_refresh_hm()?;

        let mut warnings = Vec::new();
        if self.radarr.is_empty() && self.sonarr.is_empty() {
            warnings.push(ConfigWarning(
                "no radarr or sonarr instances configured; nothing will be scanned".to_string(),
            ));
        }
        if self.actions.max_replacements_per_day == 0 && self.actions.auto_replace {
            warnings.push(ConfigWarning(
                "auto_replace is on but max_replacements_per_day is 0; every action will queue"
                    .to_string(),
            ));
        }
        if self.validation.full_decode_enabled && !self.validation.deep_scan_enabled {
            warnings.push(ConfigWarning(
                "full_decode_enabled has no effect while deep_scan_enabled is off".to_string(),
            ));
        }
        for instance in self.radarr.iter().chain(&self.sonarr) {
            if instance.api_key.is_empty() {
                warnings.push(ConfigWarning(format!(
                    "instance '{}' has an empty api_key",
                    instance.name
                )));
            }
        }
        Ok(warnings)
    }
}

fn parse_hhmm(value: &str) -> Option<(u32, u32)> {
    let (h, m) = value.split_once(':')?;
    let hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    (hour < 24 && minute < 60).then_some((hour, minute))
}
