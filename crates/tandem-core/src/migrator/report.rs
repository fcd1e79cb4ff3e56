//! Execution stages and migration reports.

use crate::changelog::VersionId;
use crate::planner::Plan;
use serde::{Deserialize, Serialize};

/// Stages of a schema migration, in execution order. Each stage that
/// touches the database runs in its own transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ExecutionStage {
    /// Plan built, nothing executed.
    Created,
    /// Ghost tables, their sequences and foreign keys exist.
    GhostTablesCreated,
    /// Steps of the plan ran.
    StepsExecuting,
    /// Ghost table indexes exist.
    IndexesCreated,
    /// Synchronizers from ghost tables back to the originals are installed.
    BackSyncInstalled,
    /// The target version is active.
    VersionActivated,
    /// Views of the target version exist.
    ViewsCreated,
    /// The new state is stored.
    Persisted,
}

impl std::fmt::Display for ExecutionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStage::Created => write!(f, "created"),
            ExecutionStage::GhostTablesCreated => write!(f, "ghost tables created"),
            ExecutionStage::StepsExecuting => write!(f, "steps executing"),
            ExecutionStage::IndexesCreated => write!(f, "indexes created"),
            ExecutionStage::BackSyncInstalled => write!(f, "back sync installed"),
            ExecutionStage::VersionActivated => write!(f, "version activated"),
            ExecutionStage::ViewsCreated => write!(f, "views created"),
            ExecutionStage::Persisted => write!(f, "persisted"),
        }
    }
}

/// Outcome of a schema migration.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    /// Origin version.
    pub from: VersionId,
    /// Target version.
    pub to: VersionId,
    /// The executed (or, in dry-run mode, planned) plan.
    pub plan: Plan,
    /// Last stage reached.
    pub stage: ExecutionStage,
    /// Steps executed.
    pub steps_executed: usize,
    /// Rows reported by the data copies.
    pub rows_copied: u64,
    /// Ref-ids of the ghost tables created.
    pub ghost_tables: Vec<String>,
    /// Whether nothing was executed.
    pub dry_run: bool,
}

impl MigrationReport {
    /// Report for a plan that has not run.
    pub fn new(from: VersionId, to: VersionId, plan: Plan) -> Self {
        let ghost_tables = plan.ghost_tables().iter().map(|t| t.name.clone()).collect();
        Self {
            from,
            to,
            plan,
            stage: ExecutionStage::Created,
            steps_executed: 0,
            rows_copied: 0,
            ghost_tables,
            dry_run: false,
        }
    }

    /// Check if every stage completed.
    pub fn is_complete(&self) -> bool {
        self.stage == ExecutionStage::Persisted
    }
}

/// Outcome of one stage of [`Migrator::migrate`](super::Migrator::migrate).
#[derive(Debug, Clone)]
pub enum StageOutcome {
    /// A run of schema operations.
    Schema(MigrationReport),
    /// A run of data operations.
    Data {
        /// Version the stage was applied on.
        from: VersionId,
        /// Last version of the stage.
        to: VersionId,
        /// Statements executed.
        statements: usize,
        /// Rows reported by the database.
        rows: u64,
    },
}

impl StageOutcome {
    /// The version reached by this stage.
    pub fn to(&self) -> &VersionId {
        match self {
            StageOutcome::Schema(report) => &report.to,
            StageOutcome::Data { to, .. } => to,
        }
    }
}
