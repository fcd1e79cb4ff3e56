//! Batched copy of rows from an original table into its ghost.

use super::error::MigrationError;
use super::report::ExecutionStage;
use crate::backend::Connection;
use crate::error::Error;
use crate::reflog::ColumnMapping;
use crate::schema::{join_idents, quote_ident, Catalog, Column, Table};
use std::collections::BTreeSet;
use tracing::debug;

/// Copies columns of a ghost table from the table it was derived from.
///
/// The first copy of a table inserts rows that the ghost does not hold yet;
/// later copies fill the remaining columns of rows already present. Both
/// run in batches of `batch_size` rows until a batch comes back short, and
/// both skip rows that are already up to date, so rows written by a
/// synchronizer in the meantime are never copied twice.
#[derive(Debug, Clone, Copy)]
pub struct TableDataCopier {
    batch_size: usize,
}

impl TableDataCopier {
    /// Create a copier.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    /// Rows per batch.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Copy `columns` of `target` from `source`. `mapping` is source column
    /// to target column; `copied` are the target columns copied earlier.
    /// Returns the number of rows reported by the database.
    #[allow(clippy::too_many_arguments)]
    pub fn copy(
        &self,
        conn: &mut dyn Connection,
        catalog: &Catalog,
        source: &Table,
        target: &Table,
        mapping: &ColumnMapping,
        columns: &[String],
        copied: &BTreeSet<String>,
    ) -> Result<u64, MigrationError> {
        let sql = if copied.is_empty() {
            self.insert_sql(catalog, source, target, mapping, columns)?
        } else {
            self.update_sql(source, target, mapping, columns)?
        };
        let Some(sql) = sql else {
            return Ok(0);
        };

        let mut total = 0;
        loop {
            let rows = conn
                .execute(&sql)
                .map_err(|source| MigrationError::StageFailed {
                    stage: ExecutionStage::StepsExecuting,
                    source,
                })?;
            total += rows;
            if rows < self.batch_size as u64 {
                break;
            }
        }
        debug!(source = %source.name, target = %target.name, rows = total, "copied");
        Ok(total)
    }

    /// One batch inserting missing rows. Required target columns that are
    /// not copied yet take their sentinel unless they have a default.
    /// `None` when none of the columns has a source.
    pub fn insert_sql(
        &self,
        catalog: &Catalog,
        source: &Table,
        target: &Table,
        mapping: &ColumnMapping,
        columns: &[String],
    ) -> Result<Option<String>, Error> {
        let pairs = source_columns(source, target, mapping, columns);
        if pairs.is_empty() {
            return Ok(None);
        }
        let key = key_columns(source, target, mapping)?;

        let mut names = Vec::new();
        let mut values = Vec::new();
        for column in &target.columns {
            if let Some((_, source_column)) = pairs.iter().find(|(t, _)| t.name == column.name) {
                names.push(column.name.clone());
                values.push(cast(&format!("s.{}", quote_ident(&source_column.name)), source_column, column));
            } else if column.not_null && column.default_sql().is_none() {
                names.push(column.name.clone());
                values.push(catalog.sentinel(target, column).to_string());
            }
        }

        let matches = key
            .iter()
            .map(|(t, s)| format!("g.{} = s.{}", quote_ident(t), quote_ident(s)))
            .collect::<Vec<_>>()
            .join(" AND ");
        let order = key
            .iter()
            .map(|(_, s)| format!("s.{}", quote_ident(s)))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(Some(format!(
            "INSERT INTO {target} ({names}) SELECT {values} FROM {source} AS s \
             WHERE NOT EXISTS (SELECT 1 FROM {target} AS g WHERE {matches}) \
             ORDER BY {order} LIMIT {limit} ON CONFLICT DO NOTHING",
            target = quote_ident(&target.name),
            names = join_idents(&names),
            values = values.join(", "),
            source = quote_ident(&source.name),
            limit = self.batch_size,
        )))
    }

    /// One batch updating rows whose copied columns differ from the source.
    /// `None` when none of the columns has a source.
    pub fn update_sql(
        &self,
        source: &Table,
        target: &Table,
        mapping: &ColumnMapping,
        columns: &[String],
    ) -> Result<Option<String>, Error> {
        let pairs = source_columns(source, target, mapping, columns);
        if pairs.is_empty() {
            return Ok(None);
        }
        let key = key_columns(source, target, mapping)?;

        let mut selected = Vec::new();
        let mut join = Vec::new();
        let mut outer = Vec::new();
        for (i, (t, s)) in key.iter().enumerate() {
            selected.push(format!("o.{} AS \"k{}\"", quote_ident(s), i));
            join.push(format!("x.{} = o.{}", quote_ident(t), quote_ident(s)));
            outer.push(format!("g.{} = s.\"k{}\"", quote_ident(t), i));
        }
        let mut assignments = Vec::new();
        let mut current = Vec::new();
        let mut wanted = Vec::new();
        for (i, (target_column, source_column)) in pairs.iter().enumerate() {
            let value = cast(&format!("o.{}", quote_ident(&source_column.name)), source_column, target_column);
            selected.push(format!("{} AS \"v{}\"", value, i));
            assignments.push(format!("{} = s.\"v{}\"", quote_ident(&target_column.name), i));
            current.push(format!("x.{}", quote_ident(&target_column.name)));
            wanted.push(value);
        }
        let order = key
            .iter()
            .map(|(_, s)| format!("o.{}", quote_ident(s)))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(Some(format!(
            "UPDATE {target} AS g SET {assignments} FROM (SELECT {selected} FROM {source} AS o \
             JOIN {target} AS x ON {join} WHERE ({current}) IS DISTINCT FROM ({wanted}) \
             ORDER BY {order} LIMIT {limit}) AS s WHERE {outer}",
            target = quote_ident(&target.name),
            assignments = assignments.join(", "),
            selected = selected.join(", "),
            source = quote_ident(&source.name),
            join = join.join(" AND "),
            current = current.join(", "),
            wanted = wanted.join(", "),
            limit = self.batch_size,
            outer = outer.join(" AND "),
        )))
    }
}

/// Target columns among `columns` paired with the source column feeding
/// them, in target declaration order.
fn source_columns<'a>(
    source: &'a Table,
    target: &'a Table,
    mapping: &ColumnMapping,
    columns: &[String],
) -> Vec<(&'a Column, &'a Column)> {
    target
        .columns
        .iter()
        .filter(|c| columns.contains(&c.name))
        .filter_map(|c| {
            mapping
                .iter()
                .find(|(_, t)| *t == &c.name)
                .and_then(|(s, _)| source.column(s))
                .map(|s| (c, s))
        })
        .collect()
}

/// Target key columns with their source columns.
fn key_columns(source: &Table, target: &Table, mapping: &ColumnMapping) -> Result<Vec<(String, String)>, Error> {
    target
        .primary_key_names()
        .into_iter()
        .map(|t| {
            mapping
                .iter()
                .find(|(_, mapped)| **mapped == t)
                .map(|(s, _)| (t.clone(), s.clone()))
                .ok_or_else(|| {
                    Error::InvalidData(format!(
                        "cannot copy {} into {}: key column {} has no source",
                        source.name, target.name, t
                    ))
                })
        })
        .collect()
}

fn cast(value: &str, source: &Column, target: &Column) -> String {
    if source.column_type == target.column_type {
        value.to_string()
    } else {
        format!("CAST({} AS {})", value, target.column_type.sql())
    }
}
