//! Schema migrations that committed some stages but not all.

use super::report::{ExecutionStage, MigrationReport};
use crate::changelog::VersionId;
use crate::planner::Plan;
use crate::reflog::{ColumnMapping, SyncDirection, SyncRef};
use crate::schema::quote_ident;
use crate::state::State;
use crate::sync;
use serde::{Deserialize, Serialize};

/// Checkpoint of a schema migration in progress.
///
/// Written before the first stage runs and after every stage commits. The
/// state is the working state as of the last committed stage, so its
/// catalog and ref log name every ghost table and synchronizer the
/// database holds for this migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMigration {
    /// Origin version.
    pub from: VersionId,
    /// Target version.
    pub to: VersionId,
    /// Last stage that committed.
    pub stage: ExecutionStage,
    /// The plan being executed.
    pub plan: Plan,
    /// Working state after `stage`.
    pub state: State,
}

impl PendingMigration {
    /// Checkpoint the progress recorded in `report`.
    pub fn new(report: &MigrationReport, state: &State) -> Self {
        Self {
            from: report.from.clone(),
            to: report.to.clone(),
            stage: report.stage,
            plan: report.plan.clone(),
            state: state.clone(),
        }
    }

    /// Check if this checkpoint belongs to the migration `from` -> `to`.
    pub fn is_for(&self, from: &VersionId, to: &VersionId) -> bool {
        &self.from == from && &self.to == to
    }

    /// Report to continue from, with the executed steps cleared.
    pub fn resume_report(&self) -> MigrationReport {
        let mut report = MigrationReport::new(self.from.clone(), self.to.clone(), self.plan.clone());
        report.stage = self.stage;
        report
    }

    /// Synchronizers that touch a ghost table of the plan.
    pub fn synchronizers(&self) -> Vec<&SyncRef> {
        let ghosts: Vec<&str> = self.plan.ghost_tables().iter().map(|t| t.name.as_str()).collect();
        self.state
            .ref_log
            .syncs()
            .filter(|s| ghosts.contains(&s.source.as_str()) || ghosts.contains(&s.target.as_str()))
            .collect()
    }

    /// Statements removing everything the migration may have created:
    /// views, synchronizers, then ghost tables and their sequences.
    pub fn discard_statements(&self) -> Vec<String> {
        let mut statements: Vec<String> = self
            .plan
            .views()
            .iter()
            .map(|v| format!("DROP VIEW IF EXISTS {} CASCADE", quote_ident(&v.name)))
            .collect();
        let mut retired: Vec<SyncRef> = self.synchronizers().into_iter().cloned().collect();
        // Synchronizers committed after the last checkpoint are not
        // recorded. Their names derive from the table pair.
        for (old, ghost) in self.state.ref_log.table_mapping(&self.from, &self.to) {
            for (source, target, direction) in [
                (&old, &ghost, SyncDirection::Forwards),
                (&ghost, &old, SyncDirection::Backwards),
            ] {
                let trigger_name = sync::trigger_name(source, target);
                if retired.iter().any(|s| s.trigger_name == trigger_name) {
                    continue;
                }
                retired.push(SyncRef {
                    trigger_name,
                    function_name: sync::function_name(source, target),
                    source: source.clone(),
                    target: target.clone(),
                    direction,
                    column_mapping: ColumnMapping::new(),
                });
            }
        }
        for sync in &retired {
            statements.extend(sync::drop_statements(sync));
        }
        let existing: Vec<&str> = self.plan.ghost_tables().iter().map(|t| t.name.as_str()).collect();
        for table in self.plan.ghost_tables() {
            statements.push(format!("DROP TABLE IF EXISTS {} CASCADE", quote_ident(&table.name)));
            for sequence in table.columns.iter().filter_map(|c| c.sequence.as_deref()) {
                let shared = self
                    .state
                    .catalog
                    .tables_using_sequence(sequence)
                    .iter()
                    .any(|(t, _)| !existing.contains(&t.as_str()));
                let statement = format!("DROP SEQUENCE IF EXISTS {}", quote_ident(sequence));
                if !shared && !statements.contains(&statement) {
                    statements.push(statement);
                }
            }
        }
        statements
    }
}
