//! Shared data model for Vigil.
//!
//! Every crate in the workspace speaks these types: stable item identities,
//! classification verdicts, replacement actions and their lifecycle, the
//! persisted daily budget, and the payloads returned by the reporting
//! surface. Nothing in here performs I/O.

pub mod action;
pub mod keys;
pub mod media;
pub mod report;
pub mod verdict;

pub use action::{ActionOutcome, ActionReason, ActionState, DailyBudget, ReplacementAction};
pub use keys::{ActionId, InstanceName, ItemKey, RecordId};
pub use media::{MediaInfo, MediaItem, MediaKind, ResolutionTier, ScanMode};
pub use report::{
    CodecBreakdown, DuplicateGroup, DuplicateMember, FileStat, LibrarySizeReport, LifetimeCounters,
    MismatchEntry, MismatchReport, Report, ReportKind, ReportSource, StatusSnapshot, human_bytes,
};
pub use verdict::Verdict;
