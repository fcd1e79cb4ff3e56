//! Foreign key graph over the tables a migration must populate.

use super::progress::{MigrationProgress, Progress};
use crate::error::Error;
use crate::schema::Catalog;
use std::collections::{BTreeMap, BTreeSet};

/// A table of the graph with its foreign key edges to other graph tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNode {
    /// Table ref-id.
    pub ref_id: String,
    /// Referenced table to number of foreign keys.
    pub outgoing: BTreeMap<String, usize>,
    /// Referencing table to number of foreign keys.
    pub incoming: BTreeMap<String, usize>,
}

/// Answer of a graph query: the tied tables and their count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphResult {
    /// Number of edges counted for each table.
    pub count: usize,
    /// Every table with that count.
    pub tables: BTreeSet<String>,
}

/// Foreign key graph. Edges to tables outside the graph are not recorded.
#[derive(Debug, Clone, Default)]
pub struct TableGraph {
    nodes: BTreeMap<String, TableNode>,
}

impl TableGraph {
    /// Build the graph over the given tables.
    pub fn from_catalog(catalog: &Catalog, ref_ids: &BTreeSet<String>) -> Result<Self, Error> {
        let mut nodes: BTreeMap<String, TableNode> = ref_ids
            .iter()
            .map(|id| {
                (
                    id.clone(),
                    TableNode {
                        ref_id: id.clone(),
                        outgoing: BTreeMap::new(),
                        incoming: BTreeMap::new(),
                    },
                )
            })
            .collect();

        for ref_id in ref_ids {
            let table = catalog.table(ref_id)?;
            for fk in &table.foreign_keys {
                if !ref_ids.contains(&fk.referred_table) {
                    continue;
                }
                if let Some(node) = nodes.get_mut(ref_id) {
                    *node.outgoing.entry(fk.referred_table.clone()).or_default() += 1;
                }
                if let Some(node) = nodes.get_mut(&fk.referred_table) {
                    *node.incoming.entry(ref_id.clone()).or_default() += 1;
                }
            }
        }
        Ok(Self { nodes })
    }

    /// Check if a table is part of the graph.
    pub fn contains(&self, ref_id: &str) -> bool {
        self.nodes.contains_key(ref_id)
    }

    /// Look up a node.
    pub fn node(&self, ref_id: &str) -> Option<&TableNode> {
        self.nodes.get(ref_id)
    }

    /// Ref-ids of every table.
    pub fn ref_ids(&self) -> BTreeSet<String> {
        self.nodes.keys().cloned().collect()
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the graph has no tables.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Among the candidates, the tables with the fewest foreign keys into
    /// other tables that are still pending. Self references never count.
    pub fn least_outgoing_foreign_keys(
        &self,
        candidates: &BTreeSet<String>,
        progress: &MigrationProgress,
    ) -> Option<GraphResult> {
        select(candidates, false, |id| {
            self.nodes.get(id).map(|node| {
                node.outgoing
                    .iter()
                    .filter(|(target, _)| *target != id && progress.progress(target) == Progress::Pending)
                    .map(|(_, count)| *count)
                    .sum()
            })
        })
    }

    /// Among the candidates, the tables referenced by the most foreign keys
    /// from other tables that are not yet migrated. Self references never
    /// count.
    pub fn most_incoming_foreign_keys(
        &self,
        candidates: &BTreeSet<String>,
        progress: &MigrationProgress,
    ) -> Option<GraphResult> {
        select(candidates, true, |id| {
            self.nodes.get(id).map(|node| {
                node.incoming
                    .iter()
                    .filter(|(source, _)| *source != id && progress.progress(source) != Progress::Migrated)
                    .map(|(_, count)| *count)
                    .sum()
            })
        })
    }
}

fn select(
    candidates: &BTreeSet<String>,
    maximize: bool,
    count: impl Fn(&str) -> Option<usize>,
) -> Option<GraphResult> {
    let mut best: Option<GraphResult> = None;
    for id in candidates {
        let Some(n) = count(id) else { continue };
        let better = match &best {
            None => true,
            Some(result) if maximize => n > result.count,
            Some(result) => n < result.count,
        };
        if better {
            best = Some(GraphResult {
                count: n,
                tables: BTreeSet::from([id.clone()]),
            });
        } else if let Some(result) = best.as_mut().filter(|r| r.count == n) {
            result.tables.insert(id.clone());
        }
    }
    best
}

/// Tables chosen for the next scheduling round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Tables with no pending foreign key targets.
    Unblocked(BTreeSet<String>),
    /// Every candidate waits on a pending table: copy these first. The
    /// count is the number of foreign keys into them from tables not yet
    /// migrated.
    CycleBreaking(GraphResult),
}

/// Policy choosing which tables to schedule next.
pub trait SchedulingHeuristic: Send + Sync {
    /// Pick the next tables among `todo`. `None` when `todo` holds no table
    /// of the graph.
    fn select(
        &self,
        graph: &TableGraph,
        progress: &MigrationProgress,
        todo: &BTreeSet<String>,
    ) -> Option<Selection>;
}

/// Default policy: tables with the fewest pending outgoing foreign keys;
/// when all of them wait on something, the ones among them most depended
/// upon.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeastOutgoingMostIncoming;

impl SchedulingHeuristic for LeastOutgoingMostIncoming {
    fn select(
        &self,
        graph: &TableGraph,
        progress: &MigrationProgress,
        todo: &BTreeSet<String>,
    ) -> Option<Selection> {
        let least = graph.least_outgoing_foreign_keys(todo, progress)?;
        if least.count == 0 {
            return Some(Selection::Unblocked(least.tables));
        }
        let most = graph.most_incoming_foreign_keys(&least.tables, progress)?;
        Some(Selection::CycleBreaking(most))
    }
}
