//! Core library for Vigil.
//!
//! Continuously audits a Radarr/Sonarr-managed media library for
//! corruption, truncation, low bitrate, wrong-content files, and
//! duplicates, and triggers replacement of bad files under a persisted
//! daily action budget.
//!
//! The pieces, leaves first:
//!
//! - [`probe::ProbeAdapter`], [`manager::LibraryManager`],
//!   [`notify::Notifier`] — trait boundaries to the external collaborators
//!   (the media inspector, the arr instances, the notification
//!   dispatchers).
//! - [`classify::Classifier`] — turns probe output plus expected metadata
//!   into exactly one verdict per scan.
//! - [`duplicates`] — groups inventory items by logical identity and ranks
//!   copies by quality.
//! - [`inventory::Inventory`] — the in-memory index of every tracked file.
//! - [`gate::ReplacementGate`] — the persisted daily-budget rate limiter
//!   with its deferred-replay FIFO.
//! - [`executor::ActionExecutor`] — delete, blocklist, re-search.
//! - [`scheduler::ScanScheduler`] — the paced worker pool feeding all of
//!   the above.
//! - [`service::Janitor`] — the facade the (out-of-tree) HTTP layer talks
//!   to.

pub mod classify;
pub mod duplicates;
pub mod error;
pub mod executor;
pub mod gate;
pub mod inventory;
pub mod manager;
pub mod notify;
pub mod pipeline;
pub mod probe;
pub mod reports;
pub mod scheduler;
pub mod service;
pub mod state;

pub use classify::{Classification, Classifier};
pub use error::{CoreError, Result};
pub use executor::ActionExecutor;
pub use gate::{Admission, GateDecision, ReplacementGate};
pub use inventory::Inventory;
pub use manager::{LibraryManager, MediaRecord};
pub use notify::{JanitorEvent, Notifier, NullNotifier};
pub use pipeline::ValidationPipeline;
pub use probe::{DecodeCheck, ProbeAdapter, ProbeError, ProbeReport};
pub use scheduler::ScanScheduler;
pub use service::Janitor;
pub use state::{PersistedState, StateStore};
