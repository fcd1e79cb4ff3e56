//! Per-table copy progress tracked while a plan is built.

use crate::error::Error;
use crate::schema::Catalog;
use std::collections::{BTreeMap, BTreeSet};

/// How far the data of a table has been scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Progress {
    /// No column scheduled.
    Pending,
    /// Some columns scheduled.
    Migrating,
    /// Every column scheduled.
    Migrated,
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Progress::Pending => write!(f, "pending"),
            Progress::Migrating => write!(f, "migrating"),
            Progress::Migrated => write!(f, "migrated"),
        }
    }
}

#[derive(Debug, Clone)]
struct TableProgress {
    columns: Vec<String>,
    migrated: BTreeSet<String>,
}

impl TableProgress {
    fn progress(&self) -> Progress {
        if self.migrated.is_empty() {
            Progress::Pending
        } else if self.columns.iter().all(|c| self.migrated.contains(c)) {
            Progress::Migrated
        } else {
            Progress::Migrating
        }
    }
}

/// Copy progress of every table of a migration.
#[derive(Debug, Clone, Default)]
pub struct MigrationProgress {
    tables: BTreeMap<String, TableProgress>,
}

impl MigrationProgress {
    /// Track the given tables, all pending.
    pub fn new<'a>(
        catalog: &Catalog,
        ref_ids: impl IntoIterator<Item = &'a String>,
    ) -> Result<Self, Error> {
        let mut tables = BTreeMap::new();
        for ref_id in ref_ids {
            let table = catalog.table(ref_id)?;
            tables.insert(
                ref_id.clone(),
                TableProgress {
                    columns: table.column_names(),
                    migrated: BTreeSet::new(),
                },
            );
        }
        Ok(Self { tables })
    }

    /// Progress of a table. Untracked tables count as migrated: their data
    /// is never copied by this migration.
    pub fn progress(&self, ref_id: &str) -> Progress {
        self.tables
            .get(ref_id)
            .map(TableProgress::progress)
            .unwrap_or(Progress::Migrated)
    }

    /// Record columns as scheduled.
    pub fn record_copy(&mut self, ref_id: &str, columns: &[String]) {
        if let Some(table) = self.tables.get_mut(ref_id) {
            table.migrated.extend(columns.iter().cloned());
        }
    }

    /// Columns already scheduled for a table.
    pub fn migrated_columns(&self, ref_id: &str) -> BTreeSet<String> {
        self.tables
            .get(ref_id)
            .map(|t| t.migrated.clone())
            .unwrap_or_default()
    }

    /// Columns not yet scheduled for a table, in declaration order.
    pub fn remaining_columns(&self, ref_id: &str) -> Vec<String> {
        self.tables
            .get(ref_id)
            .map(|t| {
                t.columns
                    .iter()
                    .filter(|c| !t.migrated.contains(*c))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Tables with the given progress.
    pub fn tables_with(&self, progress: Progress) -> BTreeSet<String> {
        self.tables
            .iter()
            .filter(|(_, t)| t.progress() == progress)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Check if every tracked table is migrated.
    pub fn is_complete(&self) -> bool {
        self.tables
            .values()
            .all(|t| t.progress() == Progress::Migrated)
    }
}
