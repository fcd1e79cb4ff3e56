//! Core error types.

use thiserror::Error;

/// Errors raised by the catalog, changelog, ref log and state store.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// No table with this physical name exists in the catalog.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// No view with this physical name exists in the catalog.
    #[error("unknown view: {0}")]
    UnknownView(String),

    /// No sequence with this name exists in the catalog.
    #[error("unknown sequence: {0}")]
    UnknownSequence(String),

    /// A column was referenced that the table does not define.
    #[error("unknown column {table}.{column}")]
    UnknownColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// A foreign key was referenced that the table does not define.
    #[error("unknown foreign key {name} on {table}")]
    UnknownForeignKey {
        /// Table name.
        table: String,
        /// Foreign key name.
        name: String,
    },

    /// An index was referenced that the table does not define.
    #[error("unknown index {name} on {table}")]
    UnknownIndex {
        /// Table name.
        table: String,
        /// Index name.
        name: String,
    },

    /// A table or view with this name already exists.
    #[error("{0} already exists")]
    Duplicate(String),

    /// The table already has a column with this name.
    #[error("column {table}.{column} already exists")]
    DuplicateColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// Tables must define at least one column.
    #[error("table {0} has no columns")]
    EmptyTable(String),

    /// Tables must define a primary key.
    #[error("table {0} has no primary key")]
    MissingPrimaryKey(String),

    /// The changelog has no version with this id.
    #[error("unknown version: {0}")]
    UnknownVersion(String),

    /// No table (or view) is visible under this logical name at the version.
    #[error("no table named {name} at version {version}")]
    UnknownTableRef {
        /// Version id.
        version: String,
        /// Logical name.
        name: String,
    },

    /// No view is visible under this logical name at the version.
    #[error("no view named {name} at version {version}")]
    UnknownViewRef {
        /// Version id.
        version: String,
        /// Logical name.
        name: String,
    },

    /// The ref log has no table or view ref with this ref-id.
    #[error("unknown ref-id: {0}")]
    UnknownRefId(String),

    /// Two refs would be visible under the same logical name at one version.
    #[error("name {name} is already taken at version {version}")]
    NameTaken {
        /// Version id.
        version: String,
        /// Logical name.
        name: String,
    },

    /// Invalid data format.
    #[error("invalid data: {0}")]
    InvalidData(String),
}
