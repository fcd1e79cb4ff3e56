//! Plan construction errors.

use crate::error::Error;
use thiserror::Error;

/// Errors raised while building or validating a plan. A migration never
/// starts when one of these is returned.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The target version is not reachable from the origin version.
    #[error("no migration path from {from} to {to}")]
    NoPath {
        /// Origin version.
        from: String,
        /// Target version.
        to: String,
    },

    /// The migration path contains a data operation.
    #[error("version {version} holds a data operation; only schema operations can be planned")]
    DataOperationInSchemaPhase {
        /// Offending version.
        version: String,
    },

    /// A table could never have its primary key copied.
    #[error("cannot schedule table {table}: its primary key depends on tables that never become copyable")]
    Unschedulable {
        /// Table ref-id.
        table: String,
    },

    /// Expanding the graph did not add any table.
    #[error("graph expansion for {tables:?} made no progress")]
    ExpansionStalled {
        /// Tables that were requested.
        tables: Vec<String>,
    },

    /// The step dependencies contain a cycle.
    #[error("plan contains a dependency cycle")]
    CyclicPlan,

    /// The plan violates a structural rule.
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// Catalog or ref log error.
    #[error(transparent)]
    Catalog(#[from] Error),
}
