//! Operations recorded in the changelog.

use crate::operations::SchemaOperation;
use serde::{Deserialize, Serialize};

/// Kind of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// Schema change.
    Ddl,
    /// Data change.
    Dml,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Ddl => write!(f, "DDL"),
            OperationKind::Dml => write!(f, "DML"),
        }
    }
}

/// A data-changing statement, written against logical table names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataOperation {
    /// The SQL statement.
    pub query: String,
}

/// An operation of the changelog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Schema change.
    Schema(SchemaOperation),
    /// Data change.
    Data(DataOperation),
}

impl Operation {
    /// Create a data operation.
    pub fn data(query: impl Into<String>) -> Self {
        Operation::Data(DataOperation {
            query: query.into(),
        })
    }

    /// The kind of this operation.
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Schema(_) => OperationKind::Ddl,
            Operation::Data(_) => OperationKind::Dml,
        }
    }
}

impl From<SchemaOperation> for Operation {
    fn from(operation: SchemaOperation) -> Self {
        Operation::Schema(operation)
    }
}

impl From<DataOperation> for Operation {
    fn from(operation: DataOperation) -> Self {
        Operation::Data(operation)
    }
}
