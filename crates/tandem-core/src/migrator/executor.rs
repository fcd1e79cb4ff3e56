//! Executes a migration plan stage by stage.

use super::copier::TableDataCopier;
use super::creator::{TableCreator, ViewCreator};
use super::error::MigrationError;
use super::report::{ExecutionStage, MigrationReport};
use crate::backend::{execute_all, Connection};
use crate::changelog::VersionId;
use crate::nulls::NullRecords;
use crate::planner::{PlanError, StepOperation};
use crate::reflog::{SyncDirection, SyncRef};
use crate::rewrite::QueryRewriter;
use crate::state::State;
use crate::sync::SyncFunction;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Runs the stages of one plan against one connection, updating the state
/// as objects are created.
pub(crate) struct Executor<'a> {
    conn: &'a mut dyn Connection,
    state: &'a mut State,
    rewriter: &'a dyn QueryRewriter,
    copier: TableDataCopier,
    nulls: NullRecords,
    /// Forward synchronizers by (original, ghost).
    forward: BTreeMap<(String, String), SyncFunction>,
    /// Ghost columns copied so far.
    copied: BTreeMap<String, BTreeSet<String>>,
}

impl<'a> Executor<'a> {
    pub(crate) fn new(
        conn: &'a mut dyn Connection,
        state: &'a mut State,
        rewriter: &'a dyn QueryRewriter,
        copier: TableDataCopier,
    ) -> Self {
        Self {
            conn,
            state,
            rewriter,
            copier,
            nulls: NullRecords::new(),
            forward: BTreeMap::new(),
            copied: BTreeMap::new(),
        }
    }

    /// Run every stage after `report.stage` up to and including view
    /// creation. `checkpoint` is called after each stage with the state as
    /// of that stage; `report.stage` holds the last stage that completed.
    pub(crate) fn execute<C>(&mut self, report: &mut MigrationReport, mut checkpoint: C) -> Result<(), MigrationError>
    where
        C: FnMut(&State, &MigrationReport) -> Result<(), MigrationError>,
    {
        let from = report.from.clone();
        let to = report.to.clone();

        if report.stage < ExecutionStage::GhostTablesCreated {
            let statements = TableCreator.create_statements(report.plan.ghost_tables());
            self.run_stage(ExecutionStage::GhostTablesCreated, |this| {
                this.exec(ExecutionStage::GhostTablesCreated, statements)
            })?;
            report.stage = ExecutionStage::GhostTablesCreated;
            checkpoint(&*self.state, report)?;
        }

        if report.stage < ExecutionStage::StepsExecuting {
            self.run_stage(ExecutionStage::StepsExecuting, |this| {
                while let Some(id) = report.plan.next_step() {
                    let Some(step) = report.plan.step(id).cloned() else {
                        break;
                    };
                    debug!(step = %step.id, operation = %step.operation, "executing step");
                    report.rows_copied += this.execute_step(&step.operation, &from, &to)?;
                    report.plan.mark_executed(step.id);
                    report.steps_executed += 1;
                }
                if report.plan.steps().iter().any(|s| !s.executed) {
                    return Err(PlanError::CyclicPlan.into());
                }
                Ok(0)
            })?;
            report.stage = ExecutionStage::StepsExecuting;
            checkpoint(&*self.state, report)?;
        }

        if report.stage < ExecutionStage::IndexesCreated {
            let statements = TableCreator.index_statements(report.plan.ghost_tables());
            self.run_stage(ExecutionStage::IndexesCreated, |this| {
                this.exec(ExecutionStage::IndexesCreated, statements)
            })?;
            report.stage = ExecutionStage::IndexesCreated;
            checkpoint(&*self.state, report)?;
        }

        if report.stage < ExecutionStage::BackSyncInstalled {
            self.run_stage(ExecutionStage::BackSyncInstalled, |this| {
                this.install_back_syncs(&from, &to)
            })?;
            report.stage = ExecutionStage::BackSyncInstalled;
            checkpoint(&*self.state, report)?;
        }

        if report.stage < ExecutionStage::VersionActivated {
            self.state.ref_log.set_version_state(&to, true);
            report.stage = ExecutionStage::VersionActivated;
            info!(version = %to, "version activated");
            checkpoint(&*self.state, report)?;
        }

        if report.stage < ExecutionStage::ViewsCreated {
            let statements = ViewCreator::new(self.rewriter).create_statements(
                report.plan.views(),
                &self.state.ref_log,
                &to,
            )?;
            self.run_stage(ExecutionStage::ViewsCreated, |this| {
                this.exec(ExecutionStage::ViewsCreated, statements)
            })?;
            report.stage = ExecutionStage::ViewsCreated;
        }
        Ok(())
    }

    /// Run `body` in a transaction of its own.
    fn run_stage<F>(&mut self, stage: ExecutionStage, body: F) -> Result<(), MigrationError>
    where
        F: FnOnce(&mut Self) -> Result<u64, MigrationError>,
    {
        self.conn
            .begin()
            .map_err(|source| MigrationError::StageFailed { stage, source })?;
        match body(self) {
            Ok(rows) => {
                self.conn
                    .commit()
                    .map_err(|source| MigrationError::StageFailed { stage, source })?;
                info!(stage = %stage, rows, "stage committed");
                Ok(())
            }
            Err(err) => {
                if let Err(rollback) = self.conn.rollback() {
                    warn!(stage = %stage, error = %rollback, "rollback failed");
                }
                warn!(stage = %stage, error = %err, "stage rolled back");
                Err(err)
            }
        }
    }

    fn exec(&mut self, stage: ExecutionStage, statements: Vec<String>) -> Result<u64, MigrationError> {
        execute_all(&mut *self.conn, statements).map_err(|source| MigrationError::StageFailed { stage, source })
    }

    fn execute_step(
        &mut self,
        operation: &StepOperation,
        from: &VersionId,
        to: &VersionId,
    ) -> Result<u64, MigrationError> {
        match operation {
            StepOperation::AddNull { tables } => {
                let statements = self.nulls.insert_statements(&self.state.catalog, tables)?;
                self.exec(ExecutionStage::StepsExecuting, statements)?;
                Ok(0)
            }
            StepOperation::DropNull { tables } => {
                let statements = self.nulls.delete_statements(&self.state.catalog, tables)?;
                self.exec(ExecutionStage::StepsExecuting, statements)?;
                Ok(0)
            }
            StepOperation::Copy { table, columns } => self.copy(table, columns, from, to),
        }
    }

    /// Install or widen the forward synchronizer, then copy the data.
    fn copy(
        &mut self,
        ghost: &str,
        columns: &[String],
        from: &VersionId,
        to: &VersionId,
    ) -> Result<u64, MigrationError> {
        let copied = self.copied.get(ghost).cloned().unwrap_or_default();
        let mut rows = 0;
        for source in self.sources(ghost, from) {
            let mapping = self.state.ref_log.column_mapping(&source, ghost)?;
            let replaced = !self.state.ref_log.table_ref_by_id(&source)?.is_at(to);
            if replaced {
                let key = (source.clone(), ghost.to_string());
                if !self.forward.contains_key(&key) {
                    let sync = SyncFunction::from_catalog(
                        &self.state.catalog,
                        &source,
                        ghost,
                        SyncDirection::Forwards,
                        mapping.clone(),
                    )?;
                    self.forward.insert(key.clone(), sync);
                }
                let synced: Vec<String> = mapping
                    .iter()
                    .filter(|(_, t)| copied.contains(*t) || columns.contains(*t))
                    .map(|(s, _)| s.clone())
                    .collect();
                if let Some(sync) = self.forward.get_mut(&key) {
                    sync.add_columns(synced);
                    let statements = sync.install_statements()?;
                    let record = sync.to_sync_ref();
                    self.exec(ExecutionStage::StepsExecuting, statements)?;
                    record_sync(&mut self.state.ref_log, record);
                }
            }

            let catalog = &self.state.catalog;
            let source_table = catalog.table(&source)?;
            let target_table = catalog.table(ghost)?;
            rows += self.copier.copy(
                &mut *self.conn,
                catalog,
                source_table,
                target_table,
                &mapping,
                columns,
                &copied,
            )?;
        }
        self.copied
            .entry(ghost.to_string())
            .or_default()
            .extend(columns.iter().cloned());
        Ok(rows)
    }

    /// Tables visible at `from` that `ghost` was derived from.
    fn sources(&self, ghost: &str, from: &VersionId) -> Vec<String> {
        let origin = self.state.ref_log.ref_ids_at(from);
        let mut sources = Vec::new();
        let mut queue = vec![ghost.to_string()];
        let mut seen = BTreeSet::new();
        while let Some(current) = queue.pop() {
            let Ok(table) = self.state.ref_log.table_ref_by_id(&current) else {
                continue;
            };
            for parent in &table.based_on {
                if !seen.insert(parent.clone()) {
                    continue;
                }
                if origin.contains(parent) {
                    sources.push(parent.clone());
                } else {
                    queue.push(parent.clone());
                }
            }
        }
        sources.sort();
        sources
    }

    /// Synchronizers from every ghost back to the table it replaces.
    fn install_back_syncs(&mut self, from: &VersionId, to: &VersionId) -> Result<u64, MigrationError> {
        let pairs: Vec<(String, String)> = self
            .state
            .ref_log
            .table_mapping(from, to)
            .into_iter()
            .filter(|(old, _)| {
                self.state
                    .ref_log
                    .table_ref_by_id(old)
                    .map(|t| !t.is_at(to))
                    .unwrap_or(false)
            })
            .collect();

        for (old, ghost) in pairs {
            let mapping = self.state.ref_log.column_mapping(&ghost, &old)?;
            if mapping.is_empty() {
                continue;
            }
            let sync = SyncFunction::from_catalog(
                &self.state.catalog,
                &ghost,
                &old,
                SyncDirection::Backwards,
                mapping,
            )?
            .with_all_columns();
            let statements = sync.install_statements()?;
            self.exec(ExecutionStage::BackSyncInstalled, statements)?;
            record_sync(&mut self.state.ref_log, sync.to_sync_ref());
            debug!(source = %ghost, target = %old, "backward synchronizer installed");
        }
        Ok(0)
    }
}

/// Record a synchronizer, merging its mapping into an existing record.
fn record_sync(ref_log: &mut crate::reflog::RefLog, sync: SyncRef) {
    match ref_log.sync_between_mut(&sync.source, &sync.target) {
        Some(existing) => existing.add_mapping(&sync.column_mapping),
        None => ref_log.add_sync(sync),
    }
}
