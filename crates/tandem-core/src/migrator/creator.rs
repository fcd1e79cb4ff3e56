//! DDL for ghost tables and views.

use crate::changelog::VersionId;
use crate::error::Error;
use crate::reflog::RefLog;
use crate::rewrite::QueryRewriter;
use crate::schema::{quote_ident, Table, View};
use std::collections::BTreeSet;

/// Generates the statements creating ghost tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableCreator;

impl TableCreator {
    /// Sequences, tables and foreign keys. Constraints are added after every
    /// table exists so ghost tables may reference each other in any order.
    pub fn create_statements(&self, tables: &[Table]) -> Vec<String> {
        let sequences: BTreeSet<&str> = tables
            .iter()
            .flat_map(|t| t.columns.iter())
            .filter_map(|c| c.sequence.as_deref())
            .collect();

        let mut statements: Vec<String> = sequences
            .into_iter()
            .map(|s| format!("CREATE SEQUENCE IF NOT EXISTS {}", quote_ident(s)))
            .collect();
        statements.extend(tables.iter().map(Table::create_sql));
        for table in tables {
            for fk in &table.foreign_keys {
                statements.push(fk.drop_constraint_sql());
                statements.push(fk.add_constraint_sql());
            }
        }
        statements
    }

    /// Index statements, run once the tables are populated.
    pub fn index_statements(&self, tables: &[Table]) -> Vec<String> {
        tables
            .iter()
            .flat_map(|t| t.indexes.iter().map(move |i| i.create_sql(&t.name)))
            .collect()
    }
}

/// Generates the statements creating views of a version.
pub struct ViewCreator<'a> {
    rewriter: &'a dyn QueryRewriter,
}

impl<'a> ViewCreator<'a> {
    /// Create a view creator using `rewriter` for view queries.
    pub fn new(rewriter: &'a dyn QueryRewriter) -> Self {
        Self { rewriter }
    }

    /// CREATE OR REPLACE VIEW statements, with the queries pointed at the
    /// tables and views visible at `version`.
    pub fn create_statements(
        &self,
        views: &[View],
        ref_log: &RefLog,
        version: &VersionId,
    ) -> Result<Vec<String>, Error> {
        let mapping = ref_log.name_mapping(version);
        views
            .iter()
            .map(|view| {
                let query = self.rewriter.rewrite(&view.query, &mapping)?;
                Ok(format!("CREATE OR REPLACE VIEW {} AS {}", quote_ident(&view.name), query))
            })
            .collect()
    }
}
