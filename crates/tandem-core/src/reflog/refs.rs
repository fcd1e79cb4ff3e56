//! Reference types tracked by the ref log.

use crate::changelog::VersionId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Mapping from source column names to target column names.
pub type ColumnMapping = BTreeMap<String, String>;

/// Identity of a column: the ref-id of its table plus the column name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnKey {
    /// Ref-id of the table.
    pub table: String,
    /// Column name.
    pub column: String,
}

impl ColumnKey {
    /// Create a column key.
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

/// A column of a table ref and its lineage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRef {
    /// Column name.
    pub name: String,
    /// Columns this one was derived from.
    pub based_on: BTreeSet<ColumnKey>,
    /// Columns derived from this one.
    pub basis_for: BTreeSet<ColumnKey>,
}

impl ColumnRef {
    /// Create a column ref without lineage.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Binding of a logical table name to a physical table for a set of versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    /// Logical name.
    pub name: String,
    /// Physical name. Never changes once assigned.
    pub ref_id: String,
    /// Versions for which this physical table backs the name.
    pub versions: BTreeSet<VersionId>,
    /// Columns by name.
    pub columns: BTreeMap<String, ColumnRef>,
    /// Ref-ids of the tables this one was derived from.
    pub based_on: BTreeSet<String>,
}

impl TableRef {
    /// Check if the ref is visible at a version.
    pub fn is_at(&self, version: &VersionId) -> bool {
        self.versions.contains(version)
    }
}

/// Binding of a logical view name to a physical view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewRef {
    /// Logical name.
    pub name: String,
    /// Physical name.
    pub ref_id: String,
    /// Versions for which this physical view backs the name.
    pub versions: BTreeSet<VersionId>,
}

/// Direction of a synchronizer relative to the migration that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncDirection {
    /// Old table to ghost table.
    Forwards,
    /// Ghost table to old table.
    Backwards,
}

impl std::fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncDirection::Forwards => write!(f, "forwards"),
            SyncDirection::Backwards => write!(f, "backwards"),
        }
    }
}

/// An installed synchronizer between two physical tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRef {
    /// Trigger name.
    pub trigger_name: String,
    /// Function name.
    pub function_name: String,
    /// Ref-id of the table the trigger fires on.
    pub source: String,
    /// Ref-id of the table receiving the writes.
    pub target: String,
    /// Direction.
    pub direction: SyncDirection,
    /// Source column to target column.
    pub column_mapping: ColumnMapping,
}

impl SyncRef {
    /// Record mappings not yet known to this synchronizer.
    pub fn add_mapping(&mut self, mapping: &ColumnMapping) {
        for (source, target) in mapping {
            self.column_mapping
                .entry(source.clone())
                .or_insert_with(|| target.clone());
        }
    }
}
