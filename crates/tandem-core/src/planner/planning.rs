//! Builds migration plans.
//!
//! Planning runs in passes. A pass schedules COPY steps over a snapshot of
//! the foreign key graph and either completes or reports tables that must
//! be ghosted before the plan can be built. The outer loop ghosts them,
//! rebuilds the snapshot and plans again from scratch.

use super::error::PlanError;
use super::graph::{GraphResult, LeastOutgoingMostIncoming, SchedulingHeuristic, Selection, TableGraph};
use super::plan::{Plan, PlanBuilder, StepId, StepOperation};
use super::progress::{MigrationProgress, Progress};
use crate::changelog::{Operation, VersionId};
use crate::operations::SchemaMigrator;
use crate::schema::{Catalog, Table};
use crate::state::State;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{debug, info};

/// Result of one planning pass.
#[derive(Debug)]
pub enum PlanningOutcome {
    /// Every table is scheduled.
    Complete(PlanBuilder),
    /// These tables are referenced by placeholders but have no ghost yet.
    NeedsExpansion(BTreeSet<String>),
}

/// Early exit of a planning pass.
enum Halt {
    Expand(BTreeSet<String>),
    Failed(PlanError),
}

impl From<PlanError> for Halt {
    fn from(err: PlanError) -> Self {
        Halt::Failed(err)
    }
}

impl From<crate::error::Error> for Halt {
    fn from(err: crate::error::Error) -> Self {
        Halt::Failed(PlanError::Catalog(err))
    }
}

/// Plans migrations between versions.
pub struct MigrationPlanner {
    heuristic: Box<dyn SchedulingHeuristic>,
}

impl Default for MigrationPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MigrationPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationPlanner").finish_non_exhaustive()
    }
}

impl MigrationPlanner {
    /// Create a planner using the default scheduling policy.
    pub fn new() -> Self {
        Self {
            heuristic: Box::new(LeastOutgoingMostIncoming),
        }
    }

    /// Use a different scheduling policy.
    pub fn with_heuristic(mut self, heuristic: impl SchedulingHeuristic + 'static) -> Self {
        self.heuristic = Box::new(heuristic);
        self
    }

    /// Plan the migration from `from` to `to`.
    ///
    /// Applies the schema operations between the two versions to the
    /// catalog and ref log, ghosting tables as needed, and schedules the
    /// steps that populate every ghost.
    pub fn create_plan(
        &self,
        state: &mut State,
        from: &VersionId,
        to: &VersionId,
    ) -> Result<Plan, PlanError> {
        let path = state
            .changelog
            .find_child_path(from, to)
            .ok_or_else(|| PlanError::NoPath {
                from: from.to_string(),
                to: to.to_string(),
            })?;

        let mut operations = Vec::with_capacity(path.len().saturating_sub(1));
        for id in path.iter().skip(1) {
            let version = state.changelog.version(id)?;
            match &version.operation {
                Some(Operation::Schema(operation)) => operations.push((version.clone(), operation.clone())),
                _ => {
                    return Err(PlanError::DataOperationInSchemaPhase {
                        version: id.to_string(),
                    })
                }
            }
        }

        let mut migrator = SchemaMigrator::new(&mut state.catalog, &mut state.ref_log);
        for (version, operation) in &operations {
            migrator.migrate(version, operation)?;
        }
        let mut ghost_tables = migrator.created_tables().clone();
        let new_views = migrator.created_views().clone();

        let mut expansions = 0usize;
        loop {
            let graph = TableGraph::from_catalog(&state.catalog, &ghost_tables)?;
            match self.plan_pass(&state.catalog, &graph)? {
                PlanningOutcome::Complete(builder) => {
                    let tables = ghost_tables
                        .iter()
                        .map(|id| state.catalog.table(id).cloned())
                        .collect::<Result<Vec<Table>, _>>()?;
                    let views = new_views
                        .iter()
                        .map(|id| state.catalog.view(id).cloned())
                        .collect::<Result<Vec<_>, _>>()?;
                    let plan = builder.build(tables, views);
                    info!(
                        from = %from,
                        to = %to,
                        steps = plan.steps().len(),
                        ghost_tables = plan.ghost_tables().len(),
                        expansions,
                        "migration plan created"
                    );
                    return Ok(plan);
                }
                PlanningOutcome::NeedsExpansion(tables) => {
                    let added = expand(state, from, to, &ghost_tables, &tables)?;
                    if added.is_empty() {
                        return Err(PlanError::ExpansionStalled {
                            tables: tables.into_iter().collect(),
                        });
                    }
                    debug!(requested = ?tables, added = ?added, "expanded table graph, planning again");
                    ghost_tables.extend(added);
                    expansions += 1;
                }
            }
        }
    }

    /// One planning pass over a graph snapshot.
    pub fn plan_pass(&self, catalog: &Catalog, graph: &TableGraph) -> Result<PlanningOutcome, PlanError> {
        let mut pass = Pass {
            catalog,
            graph,
            builder: PlanBuilder::new(),
            progress: MigrationProgress::new(catalog, &graph.ref_ids())?,
            seeded: BTreeMap::new(),
            awaiting: BTreeMap::new(),
        };
        match pass.run(self.heuristic.as_ref()) {
            Ok(()) => Ok(PlanningOutcome::Complete(pass.builder)),
            Err(Halt::Expand(tables)) => Ok(PlanningOutcome::NeedsExpansion(tables)),
            Err(Halt::Failed(err)) => Err(err),
        }
    }
}

struct Pass<'a> {
    catalog: &'a Catalog,
    graph: &'a TableGraph,
    builder: PlanBuilder,
    progress: MigrationProgress,
    /// Table to the ADD_NULL step giving it a placeholder.
    seeded: BTreeMap<String, StepId>,
    /// Pending table to the COPY steps waiting for its first copy.
    awaiting: BTreeMap<String, BTreeSet<StepId>>,
}

impl<'a> Pass<'a> {
    fn run(&mut self, heuristic: &dyn SchedulingHeuristic) -> Result<(), Halt> {
        loop {
            let todo = self.progress.tables_with(Progress::Pending);
            if todo.is_empty() {
                break;
            }
            match heuristic.select(self.graph, &self.progress, &todo) {
                Some(Selection::Unblocked(tables)) => self.migrate_tables(tables)?,
                Some(Selection::CycleBreaking(most)) => self.migrate_core_tables(most)?,
                None => break,
            }
        }
        // Partial tables left over when the last round ended.
        self.complete_partial_tables()?;
        self.add_drop_nulls_step();
        Ok(())
    }

    fn migrate_tables(&mut self, tables: BTreeSet<String>) -> Result<(), Halt> {
        debug!(tables = ?tables, "scheduling unblocked tables");
        self.schedule(tables.into_iter().collect(), false)
    }

    /// Nothing left to migrate references a table with no incoming foreign
    /// keys, so it is copied whole. Its copy then waits for the first copy
    /// of every table it points at.
    fn migrate_core_tables(&mut self, most: GraphResult) -> Result<(), Halt> {
        debug!(tables = ?most.tables, incoming = most.count, "scheduling core tables to break a cycle");
        self.schedule(most.tables.into_iter().collect(), most.count == 0)
    }

    fn schedule(&mut self, mut queue: VecDeque<String>, all_columns: bool) -> Result<(), Halt> {
        let limit = self.graph.len() * self.graph.len() + 1;
        let mut requeues = 0usize;
        while let Some(ref_id) = queue.pop_front() {
            if self.progress.progress(&ref_id) != Progress::Pending {
                continue;
            }
            let catalog = self.catalog;
            let table = catalog.table(&ref_id)?;
            let columns = if all_columns {
                table.column_names()
            } else {
                self.copyable_columns(table, &table.column_names())
            };

            let missing_key: Vec<String> = table
                .primary_key_names()
                .into_iter()
                .filter(|c| !columns.contains(c))
                .collect();
            if !missing_key.is_empty() {
                requeues += 1;
                if requeues > limit {
                    return Err(PlanError::Unschedulable { table: ref_id }.into());
                }
                let parents: BTreeSet<String> = missing_key
                    .iter()
                    .filter_map(|c| table.foreign_key_for_column(c))
                    .map(|fk| fk.referred_table.clone())
                    .filter(|t| t != &ref_id)
                    .collect();
                debug!(table = %ref_id, parents = ?parents, "primary key not copyable yet, parents first");
                queue.push_front(ref_id);
                for parent in parents {
                    queue.retain(|q| q != &parent);
                    queue.push_front(parent);
                }
                continue;
            }

            self.copy(table, columns)?;
        }
        Ok(())
    }

    /// Columns whose value can be copied now: those without a foreign key,
    /// or whose referenced table is outside the graph, not pending, or the
    /// table itself.
    fn copyable_columns(&self, table: &Table, candidates: &[String]) -> Vec<String> {
        candidates
            .iter()
            .filter(|column| match table.foreign_key_for_column(column) {
                None => true,
                Some(fk) => {
                    fk.referred_table == table.name
                        || !self.graph.contains(&fk.referred_table)
                        || self.progress.progress(&fk.referred_table) != Progress::Pending
                }
            })
            .cloned()
            .collect()
    }

    fn copy(&mut self, table: &Table, columns: Vec<String>) -> Result<StepId, Halt> {
        let dependencies = self.copy_dependencies(table, &columns);
        let first = self.builder.latest_copy(&table.name).is_none();
        let step = self.builder.copy(&table.name, columns.clone());
        self.progress.record_copy(&table.name, &columns);
        for dependency in dependencies {
            self.builder.add_dependency(step, dependency);
        }
        for fk in &table.foreign_keys {
            if !fk.is_self_referencing()
                && self.graph.contains(&fk.referred_table)
                && self.builder.latest_copy(&fk.referred_table).is_none()
                && fk.referencing_columns.iter().any(|c| columns.contains(c))
            {
                self.awaiting.entry(fk.referred_table.clone()).or_default().insert(step);
            }
        }
        if first {
            for waiting in self.awaiting.remove(&table.name).unwrap_or_default() {
                self.builder.add_dependency(waiting, step);
            }
        }
        debug!(step = %step, table = %table.name, columns = ?columns, "COPY");
        self.apply_dependency_rule(step)?;
        self.apply_completion_rule()?;
        Ok(step)
    }

    /// Latest COPY of the table itself and of every graph table whose
    /// values the copied columns point at, minus the ones already implied.
    fn copy_dependencies(&self, table: &Table, columns: &[String]) -> BTreeSet<StepId> {
        let mut dependencies = BTreeSet::new();
        if let Some(previous) = self.builder.latest_copy(&table.name) {
            dependencies.insert(previous);
        }
        for fk in &table.foreign_keys {
            if fk.is_self_referencing()
                || !self.graph.contains(&fk.referred_table)
                || !fk.referencing_columns.iter().any(|c| columns.contains(c))
            {
                continue;
            }
            if let Some(step) = self.builder.latest_copy(&fk.referred_table) {
                dependencies.insert(step);
            }
        }
        self.reduce(dependencies)
    }

    /// Drop dependencies implied by others, greedily keeping the one that
    /// implies the most.
    fn reduce(&self, mut dependencies: BTreeSet<StepId>) -> BTreeSet<StepId> {
        let mut mapping: BTreeMap<StepId, BTreeSet<StepId>> = dependencies
            .iter()
            .map(|d| (*d, self.builder.transitive_dependencies(*d)))
            .collect();
        while let Some(largest) = mapping
            .iter()
            .max_by(|a, b| a.1.len().cmp(&b.1.len()).then(b.0.cmp(a.0)))
            .map(|(id, _)| *id)
        {
            if let Some(implied) = mapping.remove(&largest) {
                dependencies.retain(|d| !implied.contains(d));
            }
        }
        dependencies
    }

    fn apply_dependency_rule(&mut self, step: StepId) -> Result<(), Halt> {
        let Some(StepOperation::Copy { table, .. }) = self.builder.step(step).map(|s| s.operation.clone()) else {
            return Ok(());
        };
        let catalog = self.catalog;
        let table = catalog.table(&table)?;
        let migrated = self.progress.migrated_columns(&table.name);
        for fk in &table.foreign_keys {
            let needs_placeholder = fk.is_self_referencing()
                || ((table.is_required(fk) || fk.inheritance)
                    && !fk.referencing_columns.iter().all(|c| migrated.contains(c)));
            if !needs_placeholder {
                continue;
            }
            let seed = self.seed(&fk.referred_table)?;
            self.builder.add_dependency(step, seed);
        }
        Ok(())
    }

    /// The ADD_NULL step giving `table` a placeholder, creating it if needed.
    fn seed(&mut self, table: &str) -> Result<StepId, Halt> {
        if !self.graph.contains(table) {
            return Err(Halt::Expand(BTreeSet::from([table.to_string()])));
        }
        if let Some(step) = self.seeded.get(table) {
            return Ok(*step);
        }
        let step = self
            .builder
            .add_null_records(BTreeSet::from([table.to_string()]));
        self.seeded.insert(table.to_string(), step);
        debug!(step = %step, table = %table, "ADD_NULL");
        self.seed_referenced_tables(step, table)?;
        Ok(step)
    }

    /// A placeholder row must point at existing rows through its required
    /// foreign keys: fold their targets into the same ADD_NULL step, or
    /// depend on the step that already seeded them.
    fn seed_referenced_tables(&mut self, step: StepId, table: &str) -> Result<(), Halt> {
        let catalog = self.catalog;
        let table = catalog.table(table)?;
        for fk in &table.foreign_keys {
            if fk.is_self_referencing() || !(table.is_required(fk) || fk.inheritance) {
                continue;
            }
            let target = fk.referred_table.as_str();
            if !self.graph.contains(target) {
                return Err(Halt::Expand(BTreeSet::from([target.to_string()])));
            }
            match self.seeded.get(target) {
                Some(existing) if *existing == step => {}
                Some(existing) => {
                    let existing = *existing;
                    self.builder.add_dependency(step, existing);
                }
                None => {
                    self.builder.add_table_to_null_step(step, target);
                    self.seeded.insert(target.to_string(), step);
                    self.seed_referenced_tables(step, target)?;
                }
            }
        }
        Ok(())
    }

    /// Copy the remaining columns of partially copied tables whose
    /// referenced tables are no longer pending.
    fn apply_completion_rule(&mut self) -> Result<(), Halt> {
        for ref_id in self.progress.tables_with(Progress::Migrating) {
            let remaining = self.progress.remaining_columns(&ref_id);
            if remaining.is_empty() || self.progress.progress(&ref_id) != Progress::Migrating {
                continue;
            }
            let catalog = self.catalog;
            let table = catalog.table(&ref_id)?;
            if self.copyable_columns(table, &remaining).len() == remaining.len() {
                self.copy(table, remaining)?;
            }
        }
        Ok(())
    }

    fn complete_partial_tables(&mut self) -> Result<(), Halt> {
        self.apply_completion_rule()?;
        if let Some(table) = self.progress.tables_with(Progress::Migrating).into_iter().next() {
            return Err(PlanError::Unschedulable { table }.into());
        }
        Ok(())
    }

    fn add_drop_nulls_step(&mut self) {
        if self.seeded.is_empty() {
            return;
        }
        let leaves = self.builder.leaves();
        let tables: BTreeSet<String> = self.seeded.keys().cloned().collect();
        let step = self.builder.drop_null_records(tables);
        for leaf in leaves {
            self.builder.add_dependency(step, leaf);
        }
        debug!(step = %step, "DROP_NULL");
    }
}

/// Ghost the requested tables for `to`, together with every table that
/// references them at `from`, and point the foreign keys of all ghosts at
/// the tables visible at `to`. Returns the ref-ids of the new ghosts.
fn expand(
    state: &mut State,
    from: &VersionId,
    to: &VersionId,
    ghost_tables: &BTreeSet<String>,
    requested: &BTreeSet<String>,
) -> Result<BTreeSet<String>, PlanError> {
    let origin = state.ref_log.ref_ids_at(from);
    let mut mapped: BTreeSet<String> = state
        .ref_log
        .table_mapping(from, to)
        .into_iter()
        .map(|(old, _)| old)
        .collect();
    let mut added = BTreeSet::new();
    let mut queue: VecDeque<String> = requested.iter().cloned().collect();

    while let Some(ref_id) = queue.pop_front() {
        if mapped.contains(&ref_id) || ghost_tables.contains(&ref_id) {
            continue;
        }
        let visible_at_target = state
            .ref_log
            .table_ref_by_id(&ref_id)
            .map(|t| t.is_at(to))
            .unwrap_or(false);
        if !visible_at_target {
            continue;
        }

        let ghost_id = state.ref_log.generate_table_ref_id();
        state.ref_log.ghost_table(&ref_id, &ghost_id, to)?;
        let ghost = state.catalog.table(&ref_id)?.copy_as(ghost_id.clone());
        state.catalog.add_table(ghost)?;
        debug!(table = %ref_id, ghost = %ghost_id, "mirrored table for expansion");
        mapped.insert(ref_id.clone());
        added.insert(ghost_id);

        for referencing in state.catalog.tables_referencing(&ref_id) {
            if origin.contains(&referencing) && !mapped.contains(&referencing) && !queue.contains(&referencing) {
                queue.push_back(referencing);
            }
        }
    }

    let all: Vec<String> = ghost_tables.iter().chain(added.iter()).cloned().collect();
    for ref_id in all {
        let mut updates = Vec::new();
        for (position, fk) in state.catalog.table(&ref_id)?.foreign_keys.iter().enumerate() {
            if let Some(target) = state.ref_log.descendant_at(&fk.referred_table, to) {
                if target.ref_id != fk.referred_table {
                    updates.push((position, target.ref_id.clone()));
                }
            }
        }
        let table = state.catalog.table_mut(&ref_id)?;
        for (position, target) in updates {
            table.foreign_keys[position].referred_table = target;
        }
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::StepKind;
    use crate::schema::{Column, ColumnType, ForeignKey};

    fn fk(table: &str, column: &str, referred: &str) -> ForeignKey {
        ForeignKey::new(
            format!("{table}_{column}_fk"),
            table,
            vec![column.into()],
            referred,
            vec!["id".into()],
        )
    }

    fn catalog(tables: Vec<Table>) -> Catalog {
        let mut catalog = Catalog::new("db");
        for table in tables {
            catalog.add_table(table).unwrap();
        }
        catalog
    }

    fn plan(planner: &MigrationPlanner, catalog: &Catalog, ids: &[&str]) -> Plan {
        let ids: BTreeSet<String> = ids.iter().map(|s| s.to_string()).collect();
        let graph = TableGraph::from_catalog(catalog, &ids).unwrap();
        match planner.plan_pass(catalog, &graph).unwrap() {
            PlanningOutcome::Complete(builder) => {
                let tables = ids.iter().map(|id| catalog.table(id).unwrap().clone()).collect();
                builder.build(tables, vec![])
            }
            PlanningOutcome::NeedsExpansion(tables) => panic!("unexpected expansion of {tables:?}"),
        }
    }

    fn a_references_b() -> Catalog {
        let mut a = Table::new("a")
            .with_column(Column::new("id", ColumnType::Integer).primary_key())
            .with_column(Column::new("b_id", ColumnType::Integer).not_null());
        a.add_foreign_key(fk("a", "b_id", "b")).unwrap();
        let b = Table::new("b").with_column(Column::new("id", ColumnType::Integer).primary_key());
        catalog(vec![a, b])
    }

    #[test]
    fn test_required_reference_copies_parent_first() {
        let catalog = a_references_b();
        let plan = plan(&MigrationPlanner::new(), &catalog, &["a", "b"]);
        plan.validate().unwrap();
        assert_eq!(plan.steps().len(), 2);
        assert_eq!(plan.steps_of(StepKind::AddNull).count(), 0);
        assert_eq!(plan.steps_of(StepKind::DropNull).count(), 0);
        let order = plan.execution_order().unwrap();
        assert!(matches!(&plan.step(order[0]).unwrap().operation, StepOperation::Copy { table, .. } if table == "b"));
        assert!(matches!(&plan.step(order[1]).unwrap().operation, StepOperation::Copy { table, .. } if table == "a"));
    }

    #[test]
    fn test_alternative_heuristic_still_yields_valid_plan() {
        struct Everything;
        impl SchedulingHeuristic for Everything {
            fn select(&self, _: &TableGraph, _: &MigrationProgress, todo: &BTreeSet<String>) -> Option<Selection> {
                (!todo.is_empty()).then(|| Selection::Unblocked(todo.clone()))
            }
        }
        let catalog = a_references_b();
        let plan = plan(&MigrationPlanner::new().with_heuristic(Everything), &catalog, &["a", "b"]);
        plan.validate().unwrap();
        assert_eq!(plan.steps_of(StepKind::AddNull).count(), 1);
        assert_eq!(plan.steps_of(StepKind::DropNull).count(), 1);
        assert_eq!(plan.steps_of(StepKind::Copy).count(), 3);
    }

    #[test]
    fn test_reference_cycle_is_broken_with_placeholders() {
        let mut stores = Table::new("stores")
            .with_column(Column::new("id", ColumnType::Integer).primary_key())
            .with_column(Column::new("manager_id", ColumnType::Integer).not_null());
        stores.add_foreign_key(fk("stores", "manager_id", "staff")).unwrap();
        let mut staff = Table::new("staff")
            .with_column(Column::new("id", ColumnType::Integer).primary_key())
            .with_column(Column::new("store_id", ColumnType::Integer).not_null());
        staff.add_foreign_key(fk("staff", "store_id", "stores")).unwrap();
        let catalog = catalog(vec![stores, staff]);

        let plan = plan(&MigrationPlanner::new(), &catalog, &["staff", "stores"]);
        plan.validate().unwrap();
        assert_eq!(plan.steps_of(StepKind::AddNull).count(), 1);
        let drop = plan.steps_of(StepKind::DropNull).next().unwrap();
        assert!(plan.dependents(drop.id).is_empty());
    }

    #[test]
    fn test_placeholder_outside_graph_requests_expansion() {
        let mut inventory = Table::new("inventory")
            .with_column(Column::new("id", ColumnType::Integer).primary_key())
            .with_column(Column::new("parent_id", ColumnType::Integer))
            .with_column(Column::new("film_id", ColumnType::Integer).not_null());
        inventory.add_foreign_key(fk("inventory", "parent_id", "inventory")).unwrap();
        inventory.add_foreign_key(fk("inventory", "film_id", "films")).unwrap();
        let films = Table::new("films").with_column(Column::new("id", ColumnType::Integer).primary_key());
        let catalog = catalog(vec![inventory, films]);

        let ids = BTreeSet::from(["inventory".to_string()]);
        let graph = TableGraph::from_catalog(&catalog, &ids).unwrap();
        match MigrationPlanner::new().plan_pass(&catalog, &graph).unwrap() {
            PlanningOutcome::NeedsExpansion(tables) => {
                assert_eq!(tables, BTreeSet::from(["films".to_string()]))
            }
            PlanningOutcome::Complete(_) => panic!("expected expansion"),
        }
    }

    #[test]
    fn test_primary_key_cycle_is_unschedulable() {
        let mut a = Table::new("a").with_column(Column::new("b_id", ColumnType::Integer).primary_key());
        a.add_foreign_key(ForeignKey::new("a_b", "a", vec!["b_id".into()], "b", vec!["a_id".into()]))
            .unwrap();
        let mut b = Table::new("b").with_column(Column::new("a_id", ColumnType::Integer).primary_key());
        b.add_foreign_key(ForeignKey::new("b_a", "b", vec!["a_id".into()], "a", vec!["b_id".into()]))
            .unwrap();
        let catalog = catalog(vec![a, b]);
        let ids = BTreeSet::from(["a".to_string(), "b".to_string()]);
        let graph = TableGraph::from_catalog(&catalog, &ids).unwrap();
        assert!(matches!(
            MigrationPlanner::new().plan_pass(&catalog, &graph),
            Err(PlanError::Unschedulable { .. })
        ));
    }

    #[test]
    fn test_unreferenced_table_waiting_on_a_cycle_is_copied_whole() {
        let mut tables = Vec::new();
        let shape: [(&str, Vec<&str>); 4] = [
            ("a", vec!["x"]),
            ("x", vec!["y", "z"]),
            ("y", vec!["x", "z"]),
            ("z", vec!["x", "y"]),
        ];
        for (name, targets) in shape {
            let mut table = Table::new(name).with_column(Column::new("id", ColumnType::Integer).primary_key());
            for target in targets {
                let column = format!("{target}_id");
                table.add_column(Column::new(column.clone(), ColumnType::Integer)).unwrap();
                table.add_foreign_key(fk(name, &column, target)).unwrap();
            }
            tables.push(table);
        }
        let catalog = catalog(tables);

        let plan = plan(&MigrationPlanner::new(), &catalog, &["a", "x", "y", "z"]);
        plan.validate().unwrap();
        assert_eq!(plan.steps_of(StepKind::AddNull).count(), 0);

        let copies_of = |name: &str| {
            plan.steps_of(StepKind::Copy)
                .filter(|s| matches!(&s.operation, StepOperation::Copy { table, .. } if table == name))
                .collect::<Vec<_>>()
        };
        let a = copies_of("a");
        assert_eq!(a.len(), 1);
        assert_eq!(
            a[0].operation,
            StepOperation::Copy {
                table: "a".into(),
                columns: vec!["id".into(), "x_id".into()],
            }
        );
        let first_x = copies_of("x")[0].id;
        assert!(plan.transitive_dependencies(a[0].id).contains(&first_x));
        let order = plan.execution_order().unwrap();
        let position = |id| order.iter().position(|s| *s == id).unwrap();
        assert!(position(first_x) < position(a[0].id));
    }
}
