use std::path::Path;

use thiserror::Error;
use tracing::{info, warn};

use crate::models::Config;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Load and validate a config file. Warnings are logged here so callers
/// only deal with the hard failures.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let config: Config = toml::from_str(&raw)?;
    let warnings = config.validate()?;
    for warning in &warnings {
        warn!(%warning, "config warning");
    }
    info!(
        radarr = config.radarr.len(),
        sonarr = config.sonarr.len(),
        files_per_hour = config.scanner.files_per_hour,
        mode = ?config.scanner.mode,
        auto_replace = config.actions.auto_replace,
        dry_run = config.actions.dry_run,
        "configuration loaded"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use vigil_model::ScanMode;

    #[test]
    fn minimal_config_gets_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"
[[radarr]]
name = "radarr-main"
url = "http://radarr:7878"
api_key = "abc123"

[scanner]
files_per_hour = 300
mode = "continuous"
"#
        )
        .expect("write config");

        let config = load_config(file.path()).expect("config loads");
        assert_eq!(config.radarr.len(), 1);
        assert_eq!(config.scanner.files_per_hour, 300);
        assert_eq!(config.scanner.mode, ScanMode::Continuous);
        // Untouched sections keep their defaults.
        assert_eq!(config.validation.min_bitrate_1080p_kbps, 3_000);
        assert_eq!(config.actions.max_replacements_per_day, 10);
        assert!(!config.actions.dry_run);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = load_config("/nonexistent/vigil.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn bad_refresh_time_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"
[scanner]
tv_refresh_time = "25:00"
"#
        )
        .expect("write config");
        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
