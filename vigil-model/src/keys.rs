use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of a configured Radarr/Sonarr instance, as given in the config file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceName(pub String);

impl InstanceName {
    pub fn new(name: impl Into<String>) -> Self {
        InstanceName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstanceName {
    fn from(name: &str) -> Self {
        InstanceName(name.to_string())
    }
}

/// Record id assigned by the library manager (movie id or episode id).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identity of a tracked file: the owning instance plus the source
/// record id. Survives path changes and file replacements.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub instance: InstanceName,
    pub record: RecordId,
}

impl ItemKey {
    pub fn new(instance: impl Into<String>, record: i64) -> Self {
        ItemKey {
            instance: InstanceName::new(instance),
            record: RecordId(record),
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.instance, self.record)
    }
}

/// Identifier for a replacement action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionId(pub Uuid);

impl ActionId {
    pub fn new() -> Self {
        ActionId(Uuid::now_v7())
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
