//! Schema state of a database: physical catalog, ref log and changelog.

use crate::changelog::Changelog;
use crate::error::Error;
use crate::reflog::RefLog;
use crate::schema::Catalog;
use serde::{Deserialize, Serialize};

/// Everything needed to plan and execute migrations against one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    /// Physical catalog.
    pub catalog: Catalog,
    /// Logical to physical bindings per version.
    pub ref_log: RefLog,
    /// Version graph.
    pub changelog: Changelog,
}

impl State {
    /// Start tracking an existing database. Every table and view is
    /// registered under its own name at the root version, which becomes the
    /// only active version.
    pub fn bootstrap(catalog: Catalog) -> Result<Self, Error> {
        let changelog = Changelog::new();
        let root = changelog.root().id.clone();
        let mut ref_log = RefLog::new();
        for table in catalog.tables() {
            ref_log.add_table(&table.name, &table.name, &root, table.column_names())?;
        }
        for view in catalog.views() {
            ref_log.add_view(&view.name, &view.name, &root)?;
        }
        ref_log.set_version_state(&root, true);
        Ok(Self {
            catalog,
            ref_log,
            changelog,
        })
    }

    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }
}
