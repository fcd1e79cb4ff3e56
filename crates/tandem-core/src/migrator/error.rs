//! Migration errors.

use super::report::ExecutionStage;
use crate::backend::BackendError;
use crate::error::Error;
use crate::planner::PlanError;
use thiserror::Error;

/// Errors raised while executing migrations or dropping versions.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The plan could not be built or is invalid.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// A statement of an execution stage failed. The stage transaction was
    /// rolled back; earlier stages stay committed.
    #[error("stage {stage} failed: {source}")]
    StageFailed {
        /// Stage that failed.
        stage: ExecutionStage,
        /// Backend error.
        #[source]
        source: BackendError,
    },

    /// A statement of a data stage failed. The whole stage was rolled back.
    #[error("data changes up to version {version} failed: {source}")]
    DataStageFailed {
        /// Last version of the stage.
        version: String,
        /// Backend error.
        #[source]
        source: BackendError,
    },

    /// A statement dropping a version failed. Nothing was dropped.
    #[error("dropping version {version} failed: {source}")]
    DropFailed {
        /// Version being dropped.
        version: String,
        /// Backend error.
        #[source]
        source: BackendError,
    },

    /// Connection or transaction control failure.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Catalog, ref log or state store error.
    #[error(transparent)]
    Catalog(#[from] Error),

    /// The version is not active.
    #[error("version {version} is not active")]
    VersionNotActive {
        /// Version id.
        version: String,
    },

    /// Dropping the version would leave no active version.
    #[error("version {version} is the only active version")]
    SoleActiveVersion {
        /// Version id.
        version: String,
    },

    /// Only the oldest or newest active version can be dropped.
    #[error("version {version} is neither the oldest nor the newest active version")]
    NotAtBoundary {
        /// Version id.
        version: String,
    },

    /// A data stage contains a schema operation.
    #[error("version {version} does not hold a data operation")]
    NonDataOperationInStage {
        /// Version id.
        version: String,
    },

    /// The version does not hold a schema operation.
    #[error("version {version} does not hold a schema operation")]
    NonSchemaOperation {
        /// Version id.
        version: String,
    },

    /// Another schema migration committed some stages and has to be
    /// finished or discarded first.
    #[error("schema migration {from} -> {to} is unfinished")]
    MigrationPending {
        /// Origin version of the unfinished migration.
        from: String,
        /// Target version of the unfinished migration.
        to: String,
    },

    /// A data stage must not be empty.
    #[error("data stage is empty")]
    EmptyStage,
}
