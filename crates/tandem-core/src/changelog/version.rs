//! Versions and change sets.

use super::operation::Operation;
use serde::{Deserialize, Serialize};

/// Identifier of a version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionId(String);

impl VersionId {
    /// Wrap an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VersionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A group of consecutive versions authored together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Change set identifier.
    pub id: String,
    /// Author.
    pub author: String,
    /// Optional description.
    pub description: Option<String>,
    /// Creation time (microseconds since epoch).
    pub created_at: u64,
}

/// A node of the changelog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    /// Version identifier.
    pub id: VersionId,
    /// Parent version. `None` only for the root.
    pub parent: Option<VersionId>,
    /// Next version along the changelog.
    pub child: Option<VersionId>,
    /// Operation that produced this version. `None` only for the root.
    pub operation: Option<Operation>,
    /// Change set that introduced this version.
    pub change_set: String,
}

impl Version {
    /// Check if this is the root version.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}
