//! Placeholder ("null") rows.
//!
//! A table being populated may be referenced through required or
//! self-referencing foreign keys before the referenced rows have been
//! copied. Such tables get one placeholder row whose key is built from
//! sentinel literals; referencing rows point at it until the real values
//! arrive. Every sentinel comes from [`Catalog::sentinel`], so a reference
//! always carries the literal of the key it points at.

use crate::error::Error;
use crate::schema::{join_idents, quote_ident, Catalog, Table};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Tracks which tables hold a placeholder row and generates the statements
/// adding and removing them.
#[derive(Debug, Clone, Default)]
pub struct NullRecords {
    seeded: BTreeSet<String>,
}

impl NullRecords {
    /// Create a tracker with no placeholders.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a table holds a placeholder row.
    pub fn is_seeded(&self, table: &str) -> bool {
        self.seeded.contains(table)
    }

    /// Tables holding a placeholder row.
    pub fn seeded(&self) -> &BTreeSet<String> {
        &self.seeded
    }

    /// INSERT statements adding a placeholder to each table, ordered so that
    /// a placeholder is inserted after the placeholders it references.
    /// The tables are recorded as seeded.
    pub fn insert_statements(
        &mut self,
        catalog: &Catalog,
        tables: &BTreeSet<String>,
    ) -> Result<Vec<String>, Error> {
        let mut available = self.seeded.clone();
        available.extend(tables.iter().cloned());

        let mut statements = Vec::with_capacity(tables.len());
        for name in insertion_order(catalog, tables)? {
            let table = catalog.table(&name)?;
            let values = placeholder_values(catalog, table, &available)?;
            let columns: Vec<String> = values.keys().cloned().collect();
            let literals: Vec<String> = values.into_values().collect();
            statements.push(format!(
                "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT DO NOTHING",
                quote_ident(&name),
                join_idents(&columns),
                literals.join(", "),
            ));
            debug!(table = %name, "placeholder row");
            self.seeded.insert(name);
        }
        Ok(statements)
    }

    /// DELETE statements removing the placeholder of each table, in reverse
    /// insertion order. The tables are no longer recorded as seeded.
    pub fn delete_statements(
        &mut self,
        catalog: &Catalog,
        tables: &BTreeSet<String>,
    ) -> Result<Vec<String>, Error> {
        let mut order = insertion_order(catalog, tables)?;
        order.reverse();

        let mut statements = Vec::with_capacity(order.len());
        for name in order {
            let table = catalog.table(&name)?;
            let condition = table
                .primary_key_columns()
                .iter()
                .map(|c| format!("{} = {}", quote_ident(&c.name), catalog.sentinel(table, c)))
                .collect::<Vec<_>>()
                .join(" AND ");
            statements.push(format!("DELETE FROM {} WHERE {}", quote_ident(&name), condition));
            self.seeded.remove(&name);
        }
        Ok(statements)
    }
}

/// Values of the placeholder row of `table`, by column. Key columns take
/// their sentinel. Foreign key columns point at the placeholder of the
/// referenced table when it has one, or when they are required. Other
/// required columns take their default, falling back to the sentinel.
/// Remaining columns are left to the database.
fn placeholder_values(
    catalog: &Catalog,
    table: &Table,
    available: &BTreeSet<String>,
) -> Result<BTreeMap<String, String>, Error> {
    let mut values = BTreeMap::new();
    for column in &table.columns {
        if column.primary_key {
            values.insert(column.name.clone(), catalog.sentinel(table, column).to_string());
            continue;
        }
        if let Some(fk) = table.foreign_key_for_column(&column.name) {
            if column.not_null || available.contains(&fk.referred_table) {
                values.insert(column.name.clone(), catalog.sentinel(table, column).to_string());
            }
            continue;
        }
        if column.not_null {
            let value = column
                .default_expression
                .clone()
                .unwrap_or_else(|| catalog.sentinel(table, column).to_string());
            values.insert(column.name.clone(), value);
        }
    }
    Ok(values)
}

/// Order tables so that each comes after the tables its foreign keys point
/// at. Cycles are broken by taking the smallest remaining name.
fn insertion_order(catalog: &Catalog, tables: &BTreeSet<String>) -> Result<Vec<String>, Error> {
    let mut pending: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for name in tables {
        let table = catalog.table(name)?;
        let parents = table
            .foreign_keys
            .iter()
            .filter(|fk| !fk.is_self_referencing() && tables.contains(&fk.referred_table))
            .map(|fk| fk.referred_table.clone())
            .collect();
        pending.insert(name.clone(), parents);
    }

    let mut order = Vec::with_capacity(pending.len());
    while !pending.is_empty() {
        let next = pending
            .iter()
            .find(|(_, parents)| parents.is_empty())
            .or_else(|| pending.iter().next())
            .map(|(name, _)| name.clone());
        let Some(next) = next else { break };
        pending.remove(&next);
        for parents in pending.values_mut() {
            parents.remove(&next);
        }
        order.push(next);
    }
    Ok(order)
}
