//! Migration planning.
//!
//! The planner turns a path of schema operations into a [`Plan`]: the ghost
//! tables to create and the ordered steps that fill them with data. Steps
//! copy tables in foreign key order and break reference cycles with
//! placeholder rows.

mod error;
mod graph;
mod plan;
mod planning;
mod progress;

pub use error::PlanError;
pub use graph::{GraphResult, LeastOutgoingMostIncoming, SchedulingHeuristic, Selection, TableGraph, TableNode};
pub use plan::{Plan, PlanBuilder, Step, StepId, StepKind, StepOperation};
pub use planning::{MigrationPlanner, PlanningOutcome};
pub use progress::{MigrationProgress, Progress};
