//! Applies schema operations to the catalog and ref log.
//!
//! Every operation forks its version from the parent and then ghosts the
//! tables it touches: a ghost is a new physical table that backs the logical
//! name from that version on. Ghosting a table also ghosts every table that
//! references it at that version, so that foreign keys of the new version
//! never point into tables of the old one. Tables already created during
//! the same session are changed in place.

use super::{ColumnChanges, SchemaOperation};
use crate::changelog::{Version, VersionId};
use crate::error::Error;
use crate::reflog::RefLog;
use crate::schema::{Catalog, Column, ForeignKey, Hint, Index, Table, View};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

/// Applies schema operations version by version.
pub struct SchemaMigrator<'a> {
    catalog: &'a mut Catalog,
    ref_log: &'a mut RefLog,
    created_tables: BTreeSet<String>,
    created_views: BTreeSet<String>,
}

impl<'a> SchemaMigrator<'a> {
    /// Create a migrator over a catalog and ref log.
    pub fn new(catalog: &'a mut Catalog, ref_log: &'a mut RefLog) -> Self {
        Self {
            catalog,
            ref_log,
            created_tables: BTreeSet::new(),
            created_views: BTreeSet::new(),
        }
    }

    /// Ref-ids of the tables created so far.
    pub fn created_tables(&self) -> &BTreeSet<String> {
        &self.created_tables
    }

    /// Ref-ids of the views created so far.
    pub fn created_views(&self) -> &BTreeSet<String> {
        &self.created_views
    }

    /// Apply the operation that produced `version`.
    pub fn migrate(&mut self, version: &Version, operation: &SchemaOperation) -> Result<(), Error> {
        self.ref_log.fork(version)?;
        let v = &version.id;
        debug!(version = %v, operation = %operation, "applying schema operation");

        match operation {
            SchemaOperation::CreateTable { name, columns } => self.create_table(v, name, columns)?,
            SchemaOperation::DropTable { name } => self.drop_table(v, name)?,
            SchemaOperation::RenameTable { name, new_name } => {
                let ref_id = self.ensure_ghost(v, name)?;
                self.ref_log.rename_table(&ref_id, new_name)?;
            }
            SchemaOperation::CopyTable { source, target } => self.copy_table(v, source, target)?,
            SchemaOperation::AddColumn { table, column } => {
                let ref_id = self.ensure_ghost(v, table)?;
                let column = self.with_sequence(&ref_id, column.clone());
                self.catalog.table_mut(&ref_id)?.add_column(column.clone())?;
                self.ref_log.add_column(&ref_id, &column.name)?;
            }
            SchemaOperation::AlterColumn {
                table,
                column,
                changes,
            } => {
                let ref_id = self.ensure_ghost(v, table)?;
                self.alter_column(&ref_id, column, changes)?;
            }
            SchemaOperation::DropColumn { table, column } => {
                let ref_id = self.ensure_ghost(v, table)?;
                self.catalog.table_mut(&ref_id)?.remove_column(column)?;
                self.ref_log.drop_column(&ref_id, column)?;
            }
            SchemaOperation::AddForeignKey {
                table,
                name,
                columns,
                referred_table,
                referred_columns,
                on_update,
                on_delete,
            } => {
                let ref_id = self.ensure_ghost(v, table)?;
                let referred = self.ref_log.table_ref(v, referred_table)?.ref_id.clone();
                let foreign_key = ForeignKey::new(
                    name.clone(),
                    ref_id.clone(),
                    columns.clone(),
                    referred,
                    referred_columns.clone(),
                )
                .on_update(*on_update)
                .on_delete(*on_delete);
                self.catalog.table_mut(&ref_id)?.add_foreign_key(foreign_key)?;
            }
            SchemaOperation::DropForeignKey { table, name } => {
                let ref_id = self.ensure_ghost(v, table)?;
                self.catalog.table_mut(&ref_id)?.remove_foreign_key(name)?;
            }
            SchemaOperation::CreateIndex {
                table,
                name,
                columns,
                unique,
            } => {
                let ref_id = self.ensure_ghost(v, table)?;
                let mut index = Index::new(name.clone(), columns.clone());
                if *unique {
                    index = index.unique();
                }
                self.catalog.table_mut(&ref_id)?.add_index(index)?;
            }
            SchemaOperation::DropIndex { table, name } => {
                let ref_id = self.ensure_ghost(v, table)?;
                self.catalog.table_mut(&ref_id)?.remove_index(name)?;
            }
            SchemaOperation::CreateView { name, query } => {
                let ref_id = self.ref_log.generate_view_ref_id();
                self.catalog.add_view(View::new(ref_id.clone(), query.clone()))?;
                self.ref_log.add_view(name, &ref_id, v)?;
                self.created_views.insert(ref_id);
            }
            SchemaOperation::DropView { name } => {
                let ref_id = self.ref_log.view_ref(v, name)?.ref_id.clone();
                self.ref_log.remove_view_version(&ref_id, v)?;
                if self.created_views.remove(&ref_id) {
                    self.catalog.remove_view(&ref_id)?;
                    self.ref_log.drop_view(&ref_id)?;
                }
            }
        }

        self.repoint_foreign_keys(v)
    }

    fn create_table(&mut self, v: &VersionId, name: &str, columns: &[Column]) -> Result<(), Error> {
        let ref_id = self.ref_log.generate_table_ref_id();
        let mut table = Table::new(ref_id.clone());
        for column in columns {
            table.add_column(self.with_sequence(&ref_id, column.clone()))?;
        }
        let names = table.column_names();
        self.catalog.add_table(table)?;
        self.ref_log.add_table(name, &ref_id, v, names)?;
        self.created_tables.insert(ref_id);
        Ok(())
    }

    fn copy_table(&mut self, v: &VersionId, source: &str, target: &str) -> Result<(), Error> {
        let source_id = self.ref_log.table_ref(v, source)?.ref_id.clone();
        let ref_id = self.ref_log.generate_table_ref_id();
        let copy = self.catalog.table(&source_id)?.copy_as(ref_id.clone());
        self.catalog.add_table(copy)?;
        self.ref_log.copy_table(&source_id, target, &ref_id, v)?;
        self.created_tables.insert(ref_id);
        Ok(())
    }

    fn drop_table(&mut self, v: &VersionId, name: &str) -> Result<(), Error> {
        let original = self.ref_log.table_ref(v, name)?.ref_id.clone();
        let referencing: Vec<String> = self
            .catalog
            .tables_referencing(&original)
            .into_iter()
            .filter(|r| r != &original && self.is_at(r, v))
            .collect();
        for ref_id in referencing {
            let referencing_name = self.ref_log.table_ref_by_id(&ref_id)?.name.clone();
            self.ensure_ghost(v, &referencing_name)?;
        }

        let current = self.ref_log.table_ref(v, name)?.ref_id.clone();
        for ref_id in self.created_tables.clone() {
            if ref_id == current || !self.is_at(&ref_id, v) {
                continue;
            }
            let table = self.catalog.table_mut(&ref_id)?;
            table
                .foreign_keys
                .retain(|fk| fk.referred_table != current && fk.referred_table != original);
        }

        self.ref_log.remove_version(&current, v)?;
        if self.created_tables.remove(&current) {
            self.catalog.remove_table(&current)?;
            self.ref_log.drop_table(&current)?;
        }
        Ok(())
    }

    fn alter_column(&mut self, ref_id: &str, column: &str, changes: &ColumnChanges) -> Result<(), Error> {
        let mut name = column.to_string();
        if let Some(new_name) = &changes.new_name {
            self.catalog.table_mut(ref_id)?.rename_column(&name, new_name)?;
            self.ref_log.rename_column(ref_id, &name, new_name)?;
            name = new_name.clone();
        }

        let needs_sequence = changes.add_hints.contains(&Hint::AutoIncrement);
        let sequence_name = format!("{ref_id}_{name}_seq");
        let target = self.catalog.table_mut(ref_id)?.column_mut(&name)?;
        if let Some(column_type) = &changes.new_type {
            target.column_type = column_type.clone();
        }
        if let Some(default_expression) = &changes.default_expression {
            target.default_expression = default_expression.clone();
        }
        for hint in &changes.drop_hints {
            target.drop_hint(*hint);
        }
        for hint in &changes.add_hints {
            target.add_hint(*hint);
        }
        if needs_sequence && target.sequence.is_none() {
            target.sequence = Some(sequence_name.clone());
            self.catalog.add_sequence(sequence_name);
        }
        Ok(())
    }

    /// Give auto-increment columns without a sequence one named after the table.
    fn with_sequence(&mut self, ref_id: &str, mut column: Column) -> Column {
        if column.auto_increment && column.sequence.is_none() && column.default_expression.is_none() {
            let sequence = format!("{}_{}_seq", ref_id, column.name);
            self.catalog.add_sequence(sequence.clone());
            column.sequence = Some(sequence);
        }
        column
    }

    /// Make sure the table backing `name` at `v` was created in this session,
    /// ghosting it and everything that references it if not. Returns the
    /// ref-id now backing `name`.
    fn ensure_ghost(&mut self, v: &VersionId, name: &str) -> Result<String, Error> {
        let current = self.ref_log.table_ref(v, name)?.ref_id.clone();
        if self.created_tables.contains(&current) {
            return Ok(current);
        }

        let mut ghosts = BTreeMap::new();
        let mut queue = VecDeque::from([current.clone()]);
        while let Some(ref_id) = queue.pop_front() {
            if ghosts.contains_key(&ref_id) || self.created_tables.contains(&ref_id) {
                continue;
            }
            let ghost_id = self.ref_log.generate_table_ref_id();
            self.ref_log.ghost_table(&ref_id, &ghost_id, v)?;
            let ghost = self.catalog.table(&ref_id)?.copy_as(ghost_id.clone());
            self.catalog.add_table(ghost)?;
            debug!(version = %v, from = %ref_id, ghost = %ghost_id, "ghosted table");
            self.created_tables.insert(ghost_id.clone());
            ghosts.insert(ref_id.clone(), ghost_id);

            for referencing in self.catalog.tables_referencing(&ref_id) {
                if self.is_at(&referencing, v) && !self.created_tables.contains(&referencing) {
                    queue.push_back(referencing);
                }
            }
        }

        self.repoint_foreign_keys(v)?;
        ghosts
            .remove(&current)
            .ok_or(Error::UnknownRefId(current))
    }

    /// Point the foreign keys of tables created in this session at the
    /// tables visible at `v`.
    fn repoint_foreign_keys(&mut self, v: &VersionId) -> Result<(), Error> {
        for ref_id in &self.created_tables {
            let mut updates = Vec::new();
            for (position, fk) in self.catalog.table(ref_id)?.foreign_keys.iter().enumerate() {
                if let Some(target) = self.ref_log.descendant_at(&fk.referred_table, v) {
                    if target.ref_id != fk.referred_table {
                        updates.push((position, target.ref_id.clone()));
                    }
                }
            }
            let table = self.catalog.table_mut(ref_id)?;
            for (position, target) in updates {
                table.foreign_keys[position].referred_table = target;
            }
        }
        Ok(())
    }

    fn is_at(&self, ref_id: &str, v: &VersionId) -> bool {
        self.ref_log
            .table_ref_by_id(ref_id)
            .map(|t| t.is_at(v))
            .unwrap_or(false)
    }
}
