use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// The probe adapter itself is unreachable (tool missing, mount gone).
    /// Pauses the background lane; never recorded as a verdict.
    #[error("probe adapter unavailable: {0}")]
    ProbeUnavailable(String),

    #[error("library manager request failed: {0}")]
    Manager(String),

    /// Persisted state could not be read. The store recovers by starting
    /// empty; this surfaces only when a caller asks for an explicit load.
    #[error("state snapshot unreadable: {0}")]
    StateCorrupt(String),

    #[error("unknown item: {0}")]
    UnknownItem(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
