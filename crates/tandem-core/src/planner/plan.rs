//! Migration plans: steps with explicit dependencies.

use super::error::PlanError;
use crate::schema::{Table, View};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Identifier of a step within its plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StepId(pub usize);

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepKind {
    /// Copy data.
    Copy,
    /// Insert placeholder rows.
    AddNull,
    /// Remove placeholder rows.
    DropNull,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepKind::Copy => write!(f, "COPY"),
            StepKind::AddNull => write!(f, "ADD_NULL"),
            StepKind::DropNull => write!(f, "DROP_NULL"),
        }
    }
}

/// What a step does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOperation {
    /// Copy columns of a ghost table from the tables it was derived from.
    Copy {
        /// Ghost table ref-id.
        table: String,
        /// Ghost columns to copy.
        columns: Vec<String>,
    },
    /// Insert a placeholder row into each table.
    AddNull {
        /// Table ref-ids.
        tables: BTreeSet<String>,
    },
    /// Remove the placeholder rows from each table.
    DropNull {
        /// Table ref-ids.
        tables: BTreeSet<String>,
    },
}

impl StepOperation {
    /// The kind of this operation.
    pub fn kind(&self) -> StepKind {
        match self {
            StepOperation::Copy { .. } => StepKind::Copy,
            StepOperation::AddNull { .. } => StepKind::AddNull,
            StepOperation::DropNull { .. } => StepKind::DropNull,
        }
    }
}

impl std::fmt::Display for StepOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepOperation::Copy { table, columns } => {
                write!(f, "COPY {} ({})", table, columns.join(", "))
            }
            StepOperation::AddNull { tables } => {
                write!(f, "ADD_NULL {}", tables.iter().cloned().collect::<Vec<_>>().join(", "))
            }
            StepOperation::DropNull { tables } => {
                write!(f, "DROP_NULL {}", tables.iter().cloned().collect::<Vec<_>>().join(", "))
            }
        }
    }
}

/// A step of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Step id.
    pub id: StepId,
    /// What the step does.
    pub operation: StepOperation,
    /// Steps that must run before this one.
    pub dependencies: BTreeSet<StepId>,
    /// Set once the step has run.
    pub executed: bool,
}

/// Every step reachable through dependency edges from `id`, excluding `id`.
fn transitive_dependencies(steps: &[Step], id: StepId) -> BTreeSet<StepId> {
    let mut seen = BTreeSet::new();
    let mut queue: VecDeque<StepId> = steps
        .get(id.0)
        .map(|s| s.dependencies.iter().copied().collect())
        .unwrap_or_default();
    while let Some(next) = queue.pop_front() {
        if seen.insert(next) {
            if let Some(step) = steps.get(next.0) {
                queue.extend(step.dependencies.iter().copied());
            }
        }
    }
    seen
}

/// Steps nothing depends on.
fn leaves(steps: &[Step]) -> Vec<StepId> {
    let depended: BTreeSet<StepId> = steps
        .iter()
        .flat_map(|s| s.dependencies.iter().copied())
        .collect();
    steps
        .iter()
        .map(|s| s.id)
        .filter(|id| !depended.contains(id))
        .collect()
}

/// Incrementally assembles the steps of a plan.
#[derive(Debug, Clone, Default)]
pub struct PlanBuilder {
    steps: Vec<Step>,
}

impl PlanBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    fn add_step(&mut self, operation: StepOperation) -> StepId {
        let id = StepId(self.steps.len());
        self.steps.push(Step {
            id,
            operation,
            dependencies: BTreeSet::new(),
            executed: false,
        });
        id
    }

    /// Add a COPY step.
    pub fn copy(&mut self, table: &str, columns: Vec<String>) -> StepId {
        self.add_step(StepOperation::Copy {
            table: table.to_string(),
            columns,
        })
    }

    /// Add an ADD_NULL step.
    pub fn add_null_records(&mut self, tables: BTreeSet<String>) -> StepId {
        self.add_step(StepOperation::AddNull { tables })
    }

    /// Add a DROP_NULL step.
    pub fn drop_null_records(&mut self, tables: BTreeSet<String>) -> StepId {
        self.add_step(StepOperation::DropNull { tables })
    }

    /// Make `step` depend on `on`. Self-dependencies are ignored.
    pub fn add_dependency(&mut self, step: StepId, on: StepId) {
        if step == on {
            return;
        }
        if let Some(s) = self.steps.get_mut(step.0) {
            s.dependencies.insert(on);
        }
    }

    /// Add a table to an existing ADD_NULL step.
    pub fn add_table_to_null_step(&mut self, step: StepId, table: &str) {
        if let Some(Step {
            operation: StepOperation::AddNull { tables },
            ..
        }) = self.steps.get_mut(step.0)
        {
            tables.insert(table.to_string());
        }
    }

    /// Look up a step.
    pub fn step(&self, id: StepId) -> Option<&Step> {
        self.steps.get(id.0)
    }

    /// All steps in creation order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// The most recently added COPY step for a table.
    pub fn latest_copy(&self, table: &str) -> Option<StepId> {
        self.steps
            .iter()
            .rev()
            .find(|s| matches!(&s.operation, StepOperation::Copy { table: t, .. } if t == table))
            .map(|s| s.id)
    }

    /// Every step `id` depends on, directly or not.
    pub fn transitive_dependencies(&self, id: StepId) -> BTreeSet<StepId> {
        transitive_dependencies(&self.steps, id)
    }

    /// Steps nothing depends on.
    pub fn leaves(&self) -> Vec<StepId> {
        leaves(&self.steps)
    }

    /// Finish the plan.
    pub fn build(self, ghost_tables: Vec<Table>, views: Vec<View>) -> Plan {
        Plan {
            steps: self.steps,
            ghost_tables,
            views,
        }
    }
}

/// A migration plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    steps: Vec<Step>,
    ghost_tables: Vec<Table>,
    views: Vec<View>,
}

impl Plan {
    /// All steps in creation order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Look up a step.
    pub fn step(&self, id: StepId) -> Option<&Step> {
        self.steps.get(id.0)
    }

    /// Tables the plan creates.
    pub fn ghost_tables(&self) -> &[Table] {
        &self.ghost_tables
    }

    /// Views the plan creates.
    pub fn views(&self) -> &[View] {
        &self.views
    }

    /// Check if the plan has nothing to do.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.ghost_tables.is_empty() && self.views.is_empty()
    }

    /// Steps of a kind.
    pub fn steps_of(&self, kind: StepKind) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(move |s| s.operation.kind() == kind)
    }

    /// Every step `id` depends on, directly or not.
    pub fn transitive_dependencies(&self, id: StepId) -> BTreeSet<StepId> {
        transitive_dependencies(&self.steps, id)
    }

    /// Steps depending directly on `id`.
    pub fn dependents(&self, id: StepId) -> Vec<StepId> {
        self.steps
            .iter()
            .filter(|s| s.dependencies.contains(&id))
            .map(|s| s.id)
            .collect()
    }

    /// Topological order of the steps, ties broken by creation order.
    pub fn execution_order(&self) -> Result<Vec<StepId>, PlanError> {
        let mut remaining: BTreeMap<StepId, BTreeSet<StepId>> = self
            .steps
            .iter()
            .map(|s| (s.id, s.dependencies.clone()))
            .collect();
        let mut order = Vec::with_capacity(self.steps.len());
        while !remaining.is_empty() {
            let next = remaining
                .iter()
                .find(|(_, deps)| deps.is_empty())
                .map(|(id, _)| *id)
                .ok_or(PlanError::CyclicPlan)?;
            remaining.remove(&next);
            for deps in remaining.values_mut() {
                deps.remove(&next);
            }
            order.push(next);
        }
        Ok(order)
    }

    /// The first step, in creation order, that has not run and whose
    /// dependencies all ran.
    pub fn next_step(&self) -> Option<StepId> {
        self.steps
            .iter()
            .find(|s| {
                !s.executed
                    && s.dependencies
                        .iter()
                        .all(|d| self.step(*d).map(|d| d.executed).unwrap_or(false))
            })
            .map(|s| s.id)
    }

    /// Record that a step ran.
    pub fn mark_executed(&mut self, id: StepId) {
        if let Some(step) = self.steps.get_mut(id.0) {
            step.executed = true;
        }
    }

    /// Check the structural rules every plan must satisfy:
    /// dependencies exist and are acyclic; each ghost column is copied
    /// exactly once; a placeholder exists before every copy that leaves a
    /// required foreign key of its table unfilled; and there is a single
    /// terminal DROP_NULL when any placeholder is created.
    pub fn validate(&self) -> Result<(), PlanError> {
        for step in &self.steps {
            for dependency in &step.dependencies {
                if self.step(*dependency).is_none() {
                    return Err(PlanError::InvalidPlan(format!(
                        "step {} depends on unknown step {}",
                        step.id, dependency
                    )));
                }
            }
        }
        let order = self.execution_order()?;

        let ghosts: BTreeMap<&str, &Table> = self
            .ghost_tables
            .iter()
            .map(|t| (t.name.as_str(), t))
            .collect();
        let mut copied: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for id in &order {
            let step = &self.steps[id.0];
            let StepOperation::Copy { table, columns } = &step.operation else {
                continue;
            };
            let ghost = ghosts.get(table.as_str()).ok_or_else(|| {
                PlanError::InvalidPlan(format!("step {} copies into unknown table {}", id, table))
            })?;
            let done = copied.entry(table.as_str()).or_default();
            for column in columns {
                if !done.insert(column.as_str()) {
                    return Err(PlanError::InvalidPlan(format!(
                        "column {}.{} is copied twice",
                        table, column
                    )));
                }
            }

            let seeded = self.seeded_before(*id);
            for fk in &ghost.foreign_keys {
                let filled = fk.referencing_columns.iter().all(|c| done.contains(c.as_str()));
                let needs_placeholder = fk.is_self_referencing()
                    || ((ghost.is_required(fk) || fk.inheritance) && !filled);
                if needs_placeholder
                    && ghosts.contains_key(fk.referred_table.as_str())
                    && !seeded.contains(fk.referred_table.as_str())
                {
                    return Err(PlanError::InvalidPlan(format!(
                        "step {} needs a placeholder in {} first",
                        id, fk.referred_table
                    )));
                }
            }
        }
        for (name, table) in &ghosts {
            let done = copied.get(name).cloned().unwrap_or_default();
            if table.columns.iter().any(|c| !done.contains(c.name.as_str())) && copied.contains_key(name) {
                return Err(PlanError::InvalidPlan(format!("table {} is only partially copied", name)));
            }
        }

        let adds = self.steps_of(StepKind::AddNull).count();
        let drops: Vec<&Step> = self.steps_of(StepKind::DropNull).collect();
        match (adds, drops.as_slice()) {
            (0, []) => {}
            (0, _) => {
                return Err(PlanError::InvalidPlan(
                    "DROP_NULL without placeholders".to_string(),
                ))
            }
            (_, [drop]) => {
                if !self.dependents(drop.id).is_empty() {
                    return Err(PlanError::InvalidPlan("DROP_NULL is not terminal".to_string()));
                }
                if self.transitive_dependencies(drop.id).len() + 1 != self.steps.len() {
                    return Err(PlanError::InvalidPlan(
                        "DROP_NULL does not run after every other step".to_string(),
                    ));
                }
            }
            _ => {
                return Err(PlanError::InvalidPlan(
                    "placeholders need exactly one DROP_NULL".to_string(),
                ))
            }
        }
        Ok(())
    }

    /// Tables that received a placeholder in an ADD_NULL step `id` depends on.
    fn seeded_before(&self, id: StepId) -> BTreeSet<&str> {
        self.transitive_dependencies(id)
            .into_iter()
            .filter_map(|d| match &self.steps[d.0].operation {
                StepOperation::AddNull { tables } => Some(tables),
                _ => None,
            })
            .flat_map(|tables| tables.iter().map(String::as_str))
            .collect()
    }

    /// Serialize the plan to pretty JSON.
    pub fn to_json(&self) -> Result<String, PlanError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| PlanError::Catalog(crate::error::Error::Serialization(e.to_string())))
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for step in &self.steps {
            write!(f, "{} {}", step.id, step.operation)?;
            if !step.dependencies.is_empty() {
                let deps: Vec<String> = step.dependencies.iter().map(|d| d.to_string()).collect();
                write!(f, " after {}", deps.join(", "))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
