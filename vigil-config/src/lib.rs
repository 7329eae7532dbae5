//! Configuration for Vigil.
//!
//! One TOML file describes the arr instances, validation thresholds, sweep
//! pacing, and action policy. Every section carries defaults so a minimal
//! config stays minimal; `Config::validate` surfaces the mistakes that are
//! worth refusing to start over and the ones that only deserve a warning.

pub mod loader;
pub mod models;

pub use loader::{ConfigError, load_config};
pub use models::{
    ActionsConfig, Config, ConfigWarning, DeepScanMode, InstanceConfig, ScannerConfig, StateConfig,
    ValidationConfig,
};
