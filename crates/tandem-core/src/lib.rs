//! Tandem Core - zero-downtime schema evolution.
//!
//! Several versions of a database schema stay live side by side. Every
//! logical table is backed by a physical table per version; when a schema
//! operation changes a table, a ghost table is created, filled from the
//! original and kept in sync with it by triggers in both directions.
//!
//! - [`changelog`] records the versions and the operations between them.
//! - [`reflog`] maps logical names to physical tables per version.
//! - [`planner`] works out the order in which ghost tables are filled.
//! - [`migrator`] runs plans, data stages and version drops against a
//!   [`backend`].

pub mod backend;
pub mod changelog;
pub mod error;
pub mod ids;
pub mod migrator;
pub mod nulls;
pub mod operations;
pub mod planner;
pub mod reflog;
pub mod rewrite;
pub mod schema;
pub mod state;
pub mod store;
pub mod sync;

pub use backend::{Backend, BackendError, Connection, DryRunBackend, MemoryBackend};
pub use changelog::{ChangeSet, Changelog, Operation, OperationKind, Version, VersionId};
pub use error::Error;
pub use migrator::{
    DropPlan, ExecutionStage, MigrationError, MigrationReport, Migrator, MigratorConfig,
    PendingMigration, StageOutcome,
};
pub use nulls::NullRecords;
pub use operations::{ColumnChanges, SchemaMigrator, SchemaOperation};
pub use planner::{
    LeastOutgoingMostIncoming, MigrationPlanner, Plan, PlanError, SchedulingHeuristic, Step,
    StepId, StepKind, StepOperation,
};
pub use reflog::{ColumnMapping, RefLog, SyncDirection, SyncRef, TableRef, ViewRef};
pub use rewrite::{QueryRewriter, TableNameRewriter};
pub use schema::{Catalog, Column, ColumnType, ForeignKey, ForeignKeyAction, Hint, Index, Table, View};
pub use state::State;
pub use store::StateStore;
pub use sync::SyncFunction;
