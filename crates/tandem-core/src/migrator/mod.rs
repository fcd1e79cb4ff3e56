//! Migrator: executes plans and data stages against a database.
//!
//! A schema migration runs in stages, each in its own transaction:
//!
//! | Stage | What runs |
//! |-------|-----------|
//! | ghost tables | sequences, `CREATE TABLE`, deferred foreign keys |
//! | steps | placeholder rows, forward synchronizers, batched copies |
//! | indexes | `CREATE INDEX` on every ghost |
//! | back sync | synchronizers from each ghost back to its original |
//! | views | `CREATE OR REPLACE VIEW` for the target version |
//!
//! The state handed to the migrator is only replaced once every stage
//! committed and the new state is stored. A failed stage leaves the caller's
//! state as it was. Earlier stages stay committed and are recorded as a
//! [`PendingMigration`]; running the migration again continues it with the
//! same ghost tables, and [`Migrator::discard_pending`] removes them.
//!
//! # Example
//!
//! ```ignore
//! use tandem_core::{Migrator, MigratorConfig, StateStore, MemoryBackend};
//!
//! let store = StateStore::open(&db)?;
//! let migrator = Migrator::new(MemoryBackend::new(), store)
//!     .with_config(MigratorConfig::default().with_copy_batch_size(500));
//! let report = migrator.apply_schema_changes(&mut state, &from, &to)?;
//! assert!(report.is_complete());
//! ```

mod config;
mod copier;
mod creator;
mod drop;
mod error;
mod executor;
mod pending;
mod report;

pub use config::MigratorConfig;
pub use copier::TableDataCopier;
pub use creator::{TableCreator, ViewCreator};
pub use drop::{compose_mappings, DropPlan};
pub use error::MigrationError;
pub use pending::PendingMigration;
pub use report::{ExecutionStage, MigrationReport, StageOutcome};

use crate::backend::{execute_all, transaction, Backend};
use crate::changelog::{Operation, OperationKind, VersionId};
use crate::error::Error;
use crate::planner::{MigrationPlanner, PlanError};
use crate::rewrite::{QueryRewriter, TableNameRewriter};
use crate::state::State;
use crate::store::StateStore;
use executor::Executor;
use tracing::{debug, info};

/// Applies schema and data changes to one database.
pub struct Migrator<B: Backend> {
    backend: B,
    store: StateStore,
    config: MigratorConfig,
    planner: MigrationPlanner,
    rewriter: Box<dyn QueryRewriter>,
}

impl<B: Backend> Migrator<B> {
    /// Create a migrator with the default configuration, planner and
    /// rewriter.
    pub fn new(backend: B, store: StateStore) -> Self {
        Self {
            backend,
            store,
            config: MigratorConfig::default(),
            planner: MigrationPlanner::new(),
            rewriter: Box::new(TableNameRewriter),
        }
    }

    /// Use a different configuration.
    pub fn with_config(mut self, config: MigratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a different planner.
    pub fn with_planner(mut self, planner: MigrationPlanner) -> Self {
        self.planner = planner;
        self
    }

    /// Use a different query rewriter.
    pub fn with_rewriter(mut self, rewriter: impl QueryRewriter + 'static) -> Self {
        self.rewriter = Box::new(rewriter);
        self
    }

    /// The backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The state store.
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// The configuration.
    pub fn config(&self) -> &MigratorConfig {
        &self.config
    }

    /// Migrate the schema from the active version `from` to `to`. Every
    /// version between them must hold a schema operation. Both versions are
    /// active afterwards.
    ///
    /// Progress is checkpointed in the store after every committed stage.
    /// Calling this again after a failure continues the same migration,
    /// with the same ghost tables, from the stage that failed.
    pub fn apply_schema_changes(
        &self,
        state: &mut State,
        from: &VersionId,
        to: &VersionId,
    ) -> Result<MigrationReport, MigrationError> {
        if !self.config.dry_run {
            if let Some(pending) = self.store.load_pending()? {
                if !pending.is_for(from, to) {
                    return Err(MigrationError::MigrationPending {
                        from: pending.from.to_string(),
                        to: pending.to.to_string(),
                    });
                }
                info!(from = %from, to = %to, stage = %pending.stage, "resuming schema migration");
                let report = pending.resume_report();
                return self.execute_schema(state, pending.state, report);
            }
        }

        let (working, mut report) = self.plan_schema(state, from, to)?;
        if self.config.dry_run {
            report.dry_run = true;
            info!(from = %from, to = %to, steps = report.plan.steps().len(), "dry run, nothing executed");
            return Ok(report);
        }
        self.checkpoint(&working, &report)?;
        self.execute_schema(state, working, report)
    }

    /// Remove the ghost tables, synchronizers and views of an unfinished
    /// schema migration and forget it. The state handed to the migrator
    /// never saw them, so it stays as it is.
    pub fn discard_pending(&self) -> Result<Option<PendingMigration>, MigrationError> {
        let Some(pending) = self.store.load_pending()? else {
            return Ok(None);
        };
        let statements = pending.discard_statements();
        if self.config.dry_run {
            info!(from = %pending.from, to = %pending.to, statements = statements.len(), "dry run, nothing discarded");
            return Ok(Some(pending));
        }

        {
            let mut conn = self.backend.connect()?;
            transaction(conn.as_mut(), |conn| {
                execute_all(conn, &statements).map_err(MigrationError::from)
            })?;
        }
        self.store.clear_pending()?;
        self.store.flush()?;
        info!(
            from = %pending.from,
            to = %pending.to,
            tables = pending.plan.ghost_tables().len(),
            "pending migration discarded"
        );
        Ok(Some(pending))
    }

    /// The schema migration in progress, if any.
    pub fn pending(&self) -> Result<Option<PendingMigration>, MigrationError> {
        Ok(self.store.load_pending()?)
    }

    fn execute_schema(
        &self,
        state: &mut State,
        mut working: State,
        mut report: MigrationReport,
    ) -> Result<MigrationReport, MigrationError> {
        let from = report.from.clone();
        let to = report.to.clone();
        {
            let mut conn = self.backend.connect()?;
            let copier = TableDataCopier::new(self.config.copy_batch_size);
            let mut executor = Executor::new(conn.as_mut(), &mut working, self.rewriter.as_ref(), copier);
            executor.execute(&mut report, |state, report| self.checkpoint(state, report))?;
        }

        self.store.commit(&working)?;
        self.store.flush()?;
        report.stage = ExecutionStage::Persisted;
        *state = working;
        info!(
            backend = self.backend.name(),
            from = %from,
            to = %to,
            steps = report.steps_executed,
            rows = report.rows_copied,
            "schema migration complete"
        );
        Ok(report)
    }

    fn checkpoint(&self, state: &State, report: &MigrationReport) -> Result<(), MigrationError> {
        self.store.save_pending(&PendingMigration::new(report, state))?;
        self.store.flush()?;
        debug!(to = %report.to, stage = %report.stage, "checkpoint stored");
        Ok(())
    }

    fn ensure_nothing_pending(&self) -> Result<(), MigrationError> {
        match self.store.load_pending()? {
            Some(pending) => Err(MigrationError::MigrationPending {
                from: pending.from.to_string(),
                to: pending.to.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Run a stage of consecutive data operations on the version preceding
    /// it, in one transaction. Each query is rewritten against the tables
    /// visible at that version. Afterwards the last version of the stage is
    /// active in place of the one it was applied on. Returns the number of
    /// rows reported by the database.
    pub fn apply_data_changes(&self, state: &mut State, stage: &[VersionId]) -> Result<u64, MigrationError> {
        if !self.config.dry_run {
            self.ensure_nothing_pending()?;
        }
        let (parent, statements) = self.prepare_data_stage(state, stage)?;
        let last = stage.last().ok_or(MigrationError::EmptyStage)?;
        if self.config.dry_run {
            info!(on = %parent, to = %last, statements = statements.len(), "dry run, nothing executed");
            return Ok(0);
        }

        let rows = {
            let mut conn = self.backend.connect()?;
            transaction(conn.as_mut(), |conn| {
                execute_all(conn, &statements).map_err(|source| MigrationError::DataStageFailed {
                    version: last.to_string(),
                    source,
                })
            })?
        };

        let mut working = state.clone();
        activate_data_stage(&mut working, &parent, stage)?;
        self.persist(&working)?;
        *state = working;
        info!(on = %parent, to = %last, statements = statements.len(), rows, "data stage complete");
        Ok(rows)
    }

    /// Retire `version` with the change set it belongs to. Only the oldest
    /// or newest active version can be dropped, and never the last one.
    /// Tables no surviving version uses are dropped after their
    /// synchronizers; neighbours of a dropped table are connected directly.
    pub fn drop(&self, state: &mut State, version: &VersionId) -> Result<DropPlan, MigrationError> {
        let plan = DropPlan::new(state, version)?;
        let statements = plan.statements()?;
        if self.config.dry_run {
            info!(version = %version, statements = statements.len(), "dry run, nothing dropped");
            return Ok(plan);
        }
        self.ensure_nothing_pending()?;

        {
            let mut conn = self.backend.connect()?;
            transaction(conn.as_mut(), |conn| {
                execute_all(conn, &statements).map_err(|source| MigrationError::DropFailed {
                    version: version.to_string(),
                    source,
                })
            })?;
        }

        let mut working = state.clone();
        plan.apply(&mut working)?;
        self.persist(&working)?;
        *state = working;
        info!(
            version = %version,
            tables = plan.tables.len(),
            views = plan.views.len(),
            "version dropped"
        );
        Ok(plan)
    }

    /// Bring the database from `from` to `to`, splitting the versions in
    /// between into consecutive schema and data stages.
    pub fn migrate(
        &self,
        state: &mut State,
        from: &VersionId,
        to: &VersionId,
    ) -> Result<Vec<StageOutcome>, MigrationError> {
        let path = state
            .changelog
            .find_child_path(from, to)
            .ok_or_else(|| PlanError::NoPath {
                from: from.to_string(),
                to: to.to_string(),
            })?;
        let stages = split_stages(state, &path[1..])?;

        // In dry-run mode later stages are checked against a scratch state
        // in which the earlier ones took effect.
        let mut scratch = state.clone();
        let mut outcomes = Vec::with_capacity(stages.len());
        let mut current = from.clone();
        for (kind, versions) in stages {
            let Some(last) = versions.last().cloned() else {
                continue;
            };
            match kind {
                OperationKind::Ddl => {
                    let report = if self.config.dry_run {
                        let (mut working, mut report) = self.plan_schema(&scratch, &current, &last)?;
                        working.ref_log.set_version_state(&last, true);
                        scratch = working;
                        report.dry_run = true;
                        report
                    } else {
                        self.apply_schema_changes(state, &current, &last)?
                    };
                    outcomes.push(StageOutcome::Schema(report));
                }
                OperationKind::Dml => {
                    let (statements, rows) = if self.config.dry_run {
                        let (parent, statements) = self.prepare_data_stage(&scratch, &versions)?;
                        activate_data_stage(&mut scratch, &parent, &versions)?;
                        (statements.len(), 0)
                    } else {
                        let count = self.prepare_data_stage(state, &versions)?.1.len();
                        (count, self.apply_data_changes(state, &versions)?)
                    };
                    outcomes.push(StageOutcome::Data {
                        from: current.clone(),
                        to: last.clone(),
                        statements,
                        rows,
                    });
                }
            }
            current = last;
        }
        Ok(outcomes)
    }

    /// Plan on a copy of the state. Returns the copy with the schema
    /// operations applied and a report for the validated plan.
    fn plan_schema(
        &self,
        state: &State,
        from: &VersionId,
        to: &VersionId,
    ) -> Result<(State, MigrationReport), MigrationError> {
        if !state.ref_log.is_active(from) {
            return Err(MigrationError::VersionNotActive {
                version: from.to_string(),
            });
        }
        let mut working = state.clone();
        let plan = self.planner.create_plan(&mut working, from, to)?;
        plan.validate()?;
        Ok((working, MigrationReport::new(from.clone(), to.clone(), plan)))
    }

    /// Check a data stage and rewrite its queries. Returns the version the
    /// stage applies on and the statements to run.
    fn prepare_data_stage(
        &self,
        state: &State,
        stage: &[VersionId],
    ) -> Result<(VersionId, Vec<String>), MigrationError> {
        let first = stage.first().ok_or(MigrationError::EmptyStage)?;
        let parent = state
            .changelog
            .version(first)?
            .parent
            .clone()
            .ok_or_else(|| MigrationError::NonDataOperationInStage {
                version: first.to_string(),
            })?;

        let mut queries = Vec::with_capacity(stage.len());
        let mut previous = parent.clone();
        for id in stage {
            let version = state.changelog.version(id)?;
            let Some(Operation::Data(operation)) = &version.operation else {
                return Err(MigrationError::NonDataOperationInStage {
                    version: id.to_string(),
                });
            };
            if version.parent.as_ref() != Some(&previous) {
                return Err(Error::InvalidData(format!(
                    "data stage is not consecutive: {} does not follow {}",
                    id, previous
                ))
                .into());
            }
            queries.push(operation.query.as_str());
            previous = id.clone();
        }

        if !state.ref_log.is_active(&parent) {
            return Err(MigrationError::VersionNotActive {
                version: parent.to_string(),
            });
        }
        let mapping = state.ref_log.name_mapping(&parent);
        let statements = queries
            .into_iter()
            .map(|query| self.rewriter.rewrite(query, &mapping))
            .collect::<Result<Vec<_>, Error>>()?;
        Ok((parent, statements))
    }

    fn persist(&self, state: &State) -> Result<(), MigrationError> {
        self.store.save(state)?;
        self.store.flush()?;
        Ok(())
    }
}

/// Make the versions of a committed data stage visible and move the active
/// marker from `parent` to the last of them.
fn activate_data_stage(state: &mut State, parent: &VersionId, stage: &[VersionId]) -> Result<(), Error> {
    for id in stage {
        let version = state.changelog.version(id)?.clone();
        state.ref_log.fork(&version)?;
    }
    if let Some(last) = stage.last() {
        state.ref_log.set_version_state(last, true);
        state.ref_log.set_version_state(parent, false);
    }
    Ok(())
}

/// Group consecutive versions by operation kind.
fn split_stages(state: &State, versions: &[VersionId]) -> Result<Vec<(OperationKind, Vec<VersionId>)>, Error> {
    let mut stages: Vec<(OperationKind, Vec<VersionId>)> = Vec::new();
    for id in versions {
        let kind = state
            .changelog
            .version(id)?
            .operation
            .as_ref()
            .map(Operation::kind)
            .ok_or_else(|| Error::InvalidData(format!("version {id} holds no operation")))?;
        match stages.last_mut() {
            Some((current, run)) if *current == kind => run.push(id.clone()),
            _ => stages.push((kind, vec![id.clone()])),
        }
    }
    Ok(stages)
}
