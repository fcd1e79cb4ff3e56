//! Synchronizers: trigger functions propagating writes between two physical
//! tables that back the same logical table at different versions.
//!
//! Function and trigger names are derived from the source and target
//! ref-ids, so installing a synchronizer again with more columns replaces
//! the existing one in place.

use crate::error::Error;
use crate::ids;
use crate::reflog::{ColumnMapping, SyncDirection, SyncRef};
use crate::schema::{join_idents, quote_ident, Catalog, Column, Table};
use std::collections::{BTreeMap, BTreeSet};

/// Prefix of synchronizer function names.
pub const FUNCTION_PREFIX: &str = "sync_";
/// Prefix of synchronizer trigger names.
pub const TRIGGER_PREFIX: &str = "trig_";

/// Function name of the synchronizer from `source` to `target`.
pub fn function_name(source: &str, target: &str) -> String {
    ids::derive(FUNCTION_PREFIX, &[source, target])
}

/// Trigger name of the synchronizer from `source` to `target`.
pub fn trigger_name(source: &str, target: &str) -> String {
    ids::derive(TRIGGER_PREFIX, &[source, target])
}

/// Statements removing an installed synchronizer.
pub fn drop_statements(sync: &SyncRef) -> Vec<String> {
    vec![
        format!(
            "DROP TRIGGER IF EXISTS {} ON {}",
            quote_ident(&sync.trigger_name),
            quote_ident(&sync.source)
        ),
        format!("DROP FUNCTION IF EXISTS {}()", quote_ident(&sync.function_name)),
    ]
}

/// Definition of one directional synchronizer, not yet installed.
#[derive(Debug, Clone)]
pub struct SyncFunction {
    source: Table,
    target: Table,
    direction: SyncDirection,
    column_mapping: ColumnMapping,
    columns: BTreeSet<String>,
    function_name: String,
    trigger_name: String,
    /// Stand-in values for required target columns with no source.
    sentinels: BTreeMap<String, &'static str>,
}

impl SyncFunction {
    /// Define a synchronizer from `source` to `target`. No column is kept in
    /// sync until [`add_columns`](Self::add_columns) is called. Foreign key
    /// columns of `target` are resolved against an empty catalog; use
    /// [`from_catalog`](Self::from_catalog) for tables that reference others.
    pub fn new(source: &Table, target: &Table, direction: SyncDirection, column_mapping: ColumnMapping) -> Self {
        Self::with_catalog(&Catalog::default(), source, target, direction, column_mapping)
    }

    /// Define a synchronizer between two catalog tables.
    pub fn from_catalog(
        catalog: &Catalog,
        source: &str,
        target: &str,
        direction: SyncDirection,
        column_mapping: ColumnMapping,
    ) -> Result<Self, Error> {
        Ok(Self::with_catalog(
            catalog,
            catalog.table(source)?,
            catalog.table(target)?,
            direction,
            column_mapping,
        ))
    }

    fn with_catalog(
        catalog: &Catalog,
        source: &Table,
        target: &Table,
        direction: SyncDirection,
        column_mapping: ColumnMapping,
    ) -> Self {
        Self {
            sentinels: target
                .columns
                .iter()
                .map(|c| (c.name.clone(), catalog.sentinel(target, c)))
                .collect(),
            function_name: function_name(&source.name, &target.name),
            trigger_name: trigger_name(&source.name, &target.name),
            source: source.clone(),
            target: target.clone(),
            direction,
            column_mapping,
            columns: BTreeSet::new(),
        }
    }

    /// Keep more source columns in sync. Columns without a mapping are
    /// ignored.
    pub fn add_columns<I, S>(&mut self, columns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for column in columns {
            let column = column.into();
            if self.column_mapping.contains_key(&column) {
                self.columns.insert(column);
            }
        }
    }

    /// Keep every mapped column in sync.
    pub fn with_all_columns(mut self) -> Self {
        self.columns = self.column_mapping.keys().cloned().collect();
        self
    }

    /// Source columns currently kept in sync.
    pub fn columns(&self) -> &BTreeSet<String> {
        &self.columns
    }

    /// Function name.
    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    /// Trigger name.
    pub fn trigger_name(&self) -> &str {
        &self.trigger_name
    }

    /// Mapping restricted to the columns kept in sync.
    pub fn effective_mapping(&self) -> ColumnMapping {
        self.column_mapping
            .iter()
            .filter(|(source, _)| self.columns.contains(*source))
            .map(|(s, t)| (s.clone(), t.clone()))
            .collect()
    }

    /// The ref log record of this synchronizer.
    pub fn to_sync_ref(&self) -> SyncRef {
        SyncRef {
            trigger_name: self.trigger_name.clone(),
            function_name: self.function_name.clone(),
            source: self.source.name.clone(),
            target: self.target.name.clone(),
            direction: self.direction,
            column_mapping: self.effective_mapping(),
        }
    }

    /// Statements (re)installing the function and its trigger.
    pub fn install_statements(&self) -> Result<Vec<String>, Error> {
        Ok(vec![
            self.function_sql()?,
            format!(
                "DROP TRIGGER IF EXISTS {} ON {}",
                quote_ident(&self.trigger_name),
                quote_ident(&self.source.name)
            ),
            format!(
                "CREATE TRIGGER {} AFTER INSERT OR UPDATE OR DELETE ON {} FOR EACH ROW EXECUTE PROCEDURE {}()",
                quote_ident(&self.trigger_name),
                quote_ident(&self.source.name),
                quote_ident(&self.function_name)
            ),
        ])
    }

    /// Statements removing the function and its trigger.
    pub fn drop_statements(&self) -> Vec<String> {
        drop_statements(&self.to_sync_ref())
    }

    fn function_sql(&self) -> Result<String, Error> {
        let mapping = self.effective_mapping();
        let target = quote_ident(&self.target.name);

        // Target key column with the source column feeding it.
        let mut key = Vec::new();
        for column in self.target.primary_key_columns() {
            let source = mapping
                .iter()
                .find(|(_, t)| *t == &column.name)
                .map(|(s, _)| s.clone())
                .ok_or_else(|| {
                    Error::InvalidData(format!(
                        "synchronizer {} -> {} does not map key column {}",
                        self.source.name, self.target.name, column.name
                    ))
                })?;
            key.push((column.name.clone(), source));
        }

        let mut columns = Vec::new();
        let mut values = Vec::new();
        let mut assignments = Vec::new();
        for column in &self.target.columns {
            let source = mapping.iter().find(|(_, t)| *t == &column.name).map(|(s, _)| s);
            match source {
                Some(source) => {
                    let value = self.new_value(source, column);
                    columns.push(column.name.clone());
                    values.push(value.clone());
                    assignments.push(format!("{} = {}", quote_ident(&column.name), value));
                }
                None if column.not_null && column.default_sql().is_none() => {
                    let sentinel = self
                        .sentinels
                        .get(&column.name)
                        .copied()
                        .unwrap_or_else(|| column.column_type.sentinel());
                    columns.push(column.name.clone());
                    values.push(sentinel.to_string());
                }
                None => {}
            }
        }

        let key_names: Vec<String> = key.iter().map(|(t, _)| t.clone()).collect();
        let old_key = key
            .iter()
            .map(|(t, s)| format!("{} = OLD.{}", quote_ident(t), quote_ident(s)))
            .collect::<Vec<_>>()
            .join(" AND ");
        let upsert: Vec<String> = columns
            .iter()
            .filter(|c| !key_names.contains(c) && mapping.values().any(|t| t == *c))
            .map(|c| format!("{} = EXCLUDED.{}", quote_ident(c), quote_ident(c)))
            .collect();
        let on_conflict = if upsert.is_empty() {
            format!("ON CONFLICT ({}) DO NOTHING", join_idents(&key_names))
        } else {
            format!(
                "ON CONFLICT ({}) DO UPDATE SET {}",
                join_idents(&key_names),
                upsert.join(", ")
            )
        };
        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            target,
            join_idents(&columns),
            values.join(", ")
        );

        Ok(format!(
            "CREATE OR REPLACE FUNCTION {function}() RETURNS TRIGGER AS $$\n\
             BEGIN\n\
             \x20 IF pg_trigger_depth() > 1 THEN\n\
             \x20   RETURN NULL;\n\
             \x20 END IF;\n\
             \x20 IF TG_OP = 'INSERT' THEN\n\
             \x20   {insert} {on_conflict};\n\
             \x20 ELSIF TG_OP = 'UPDATE' THEN\n\
             \x20   UPDATE {target} SET {assignments} WHERE {old_key};\n\
             \x20   IF NOT FOUND THEN\n\
             \x20     {insert} ON CONFLICT DO NOTHING;\n\
             \x20   END IF;\n\
             \x20 ELSIF TG_OP = 'DELETE' THEN\n\
             \x20   DELETE FROM {target} WHERE {old_key};\n\
             \x20 END IF;\n\
             \x20 RETURN NULL;\n\
             END;\n\
             $$ LANGUAGE plpgsql",
            function = quote_ident(&self.function_name),
            assignments = assignments.join(", "),
        ))
    }

    /// `NEW.<source>` cast to the target column type when the types differ.
    fn new_value(&self, source: &str, target: &Column) -> String {
        let value = format!("NEW.{}", quote_ident(source));
        match self.source.column(source) {
            Some(column) if column.column_type != target.column_type => {
                format!("CAST({} AS {})", value, target.column_type.sql())
            }
            _ => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;

    fn tables() -> (Table, Table) {
        let old = Table::new("customers")
            .with_column(Column::new("id", ColumnType::Integer).primary_key())
            .with_column(Column::new("name", ColumnType::Varchar(64)))
            .with_column(Column::new("age", ColumnType::SmallInt));
        let ghost = Table::new("table_0a1b2c3d4e")
            .with_column(Column::new("id", ColumnType::Integer).primary_key())
            .with_column(Column::new("full_name", ColumnType::Text))
            .with_column(Column::new("age", ColumnType::SmallInt))
            .with_column(Column::new("email", ColumnType::Text).not_null());
        (old, ghost)
    }

    fn mapping() -> ColumnMapping {
        ColumnMapping::from([
            ("id".to_string(), "id".to_string()),
            ("name".to_string(), "full_name".to_string()),
            ("age".to_string(), "age".to_string()),
        ])
    }

    #[test]
    fn test_names_are_deterministic() {
        let (old, ghost) = tables();
        let a = SyncFunction::new(&old, &ghost, SyncDirection::Forwards, mapping());
        let b = SyncFunction::new(&old, &ghost, SyncDirection::Forwards, ColumnMapping::new());
        let back = SyncFunction::new(&ghost, &old, SyncDirection::Backwards, mapping());
        assert_eq!(a.function_name(), b.function_name());
        assert_eq!(a.trigger_name(), trigger_name("customers", "table_0a1b2c3d4e"));
        assert_ne!(a.function_name(), back.function_name());
        assert!(a.function_name().starts_with(FUNCTION_PREFIX));
    }

    #[test]
    fn test_only_selected_columns_are_synchronized() {
        let (old, ghost) = tables();
        let mut sync = SyncFunction::new(&old, &ghost, SyncDirection::Forwards, mapping());
        sync.add_columns(["id", "name", "unmapped"]);
        assert_eq!(sync.columns().len(), 2);

        let statements = sync.install_statements().unwrap();
        assert_eq!(statements.len(), 3);
        let function = &statements[0];
        assert!(function.contains("pg_trigger_depth() > 1"));
        assert!(function.contains(
            "INSERT INTO \"table_0a1b2c3d4e\" (\"id\", \"full_name\", \"email\") \
             VALUES (NEW.\"id\", CAST(NEW.\"name\" AS text), '')"
        ));
        assert!(function.contains("ON CONFLICT (\"id\") DO UPDATE SET \"full_name\" = EXCLUDED.\"full_name\""));
        assert!(function.contains("DELETE FROM \"table_0a1b2c3d4e\" WHERE \"id\" = OLD.\"id\""));
        assert!(!function.contains("\"age\""));
        assert!(statements[2].starts_with("CREATE TRIGGER"));

        sync.add_columns(["age"]);
        assert!(sync.install_statements().unwrap()[0].contains("\"age\" = NEW.\"age\""));
        assert_eq!(sync.to_sync_ref().column_mapping.len(), 3);
    }

    #[test]
    fn test_unmapped_key_is_rejected() {
        let (old, ghost) = tables();
        let mut sync = SyncFunction::new(&old, &ghost, SyncDirection::Forwards, mapping());
        sync.add_columns(["name"]);
        assert!(matches!(sync.install_statements(), Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_drop_statements() {
        let (old, ghost) = tables();
        let sync = SyncFunction::new(&old, &ghost, SyncDirection::Forwards, mapping()).with_all_columns();
        let statements = sync.drop_statements();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("DROP TRIGGER IF EXISTS"));
        assert!(statements[0].ends_with("ON \"customers\""));
        assert!(statements[1].starts_with("DROP FUNCTION IF EXISTS"));
    }

    #[test]
    fn test_unsynced_reference_uses_sentinel_of_referenced_key() {
        let staff = Table::new("staff").with_column(Column::new("id", ColumnType::Integer).primary_key());
        let old = Table::new("stores").with_column(Column::new("id", ColumnType::Integer).primary_key());
        let mut ghost = Table::new("table_3333333333")
            .with_column(Column::new("id", ColumnType::Integer).primary_key())
            .with_column(Column::new("manager_id", ColumnType::BigInt).not_null());
        ghost
            .add_foreign_key(crate::schema::ForeignKey::new(
                "stores_manager",
                "table_3333333333",
                vec!["manager_id".into()],
                "staff",
                vec!["id".into()],
            ))
            .unwrap();
        let catalog = Catalog::new("db")
            .with_table(staff)
            .unwrap()
            .with_table(old)
            .unwrap()
            .with_table(ghost)
            .unwrap();
        let mapping = ColumnMapping::from([("id".to_string(), "id".to_string())]);

        let sync = SyncFunction::from_catalog(
            &catalog,
            "stores",
            "table_3333333333",
            SyncDirection::Forwards,
            mapping,
        )
        .unwrap()
        .with_all_columns();
        let function = &sync.install_statements().unwrap()[0];
        assert!(function.contains("(\"id\", \"manager_id\") VALUES (NEW.\"id\", -2147483648)"));
    }
}
