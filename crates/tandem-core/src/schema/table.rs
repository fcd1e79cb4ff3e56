//! Tables, foreign keys and indexes.

use super::column::Column;
use super::quote_ident;
use crate::error::Error;
use serde::{Deserialize, Serialize};

/// Referential action of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ForeignKeyAction {
    /// NO ACTION.
    #[default]
    NoAction,
    /// RESTRICT.
    Restrict,
    /// CASCADE.
    Cascade,
    /// SET NULL.
    SetNull,
    /// SET DEFAULT.
    SetDefault,
}

impl ForeignKeyAction {
    /// SQL spelling of the action.
    pub fn sql(&self) -> &'static str {
        match self {
            ForeignKeyAction::NoAction => "NO ACTION",
            ForeignKeyAction::Restrict => "RESTRICT",
            ForeignKeyAction::Cascade => "CASCADE",
            ForeignKeyAction::SetNull => "SET NULL",
            ForeignKeyAction::SetDefault => "SET DEFAULT",
        }
    }
}

/// A foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name.
    pub name: String,
    /// Physical name of the table holding the constraint.
    pub referencing_table: String,
    /// Columns of the referencing table.
    pub referencing_columns: Vec<String>,
    /// Physical name of the referenced table.
    pub referred_table: String,
    /// Columns of the referenced table.
    pub referred_columns: Vec<String>,
    /// ON UPDATE action.
    pub on_update: ForeignKeyAction,
    /// ON DELETE action.
    pub on_delete: ForeignKeyAction,
    /// The referencing table extends the referenced one. Rows of the
    /// referencing table can never exist without their parent row.
    pub inheritance: bool,
}

impl ForeignKey {
    /// Create a foreign key with NO ACTION semantics.
    pub fn new(
        name: impl Into<String>,
        referencing_table: impl Into<String>,
        referencing_columns: Vec<String>,
        referred_table: impl Into<String>,
        referred_columns: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            referencing_table: referencing_table.into(),
            referencing_columns,
            referred_table: referred_table.into(),
            referred_columns,
            on_update: ForeignKeyAction::NoAction,
            on_delete: ForeignKeyAction::NoAction,
            inheritance: false,
        }
    }

    /// Set the ON UPDATE action.
    pub fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = action;
        self
    }

    /// Set the ON DELETE action.
    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = action;
        self
    }

    /// Mark as an inheritance relation.
    pub fn inheritance(mut self) -> Self {
        self.inheritance = true;
        self
    }

    /// Check if the constraint points back at its own table.
    pub fn is_self_referencing(&self) -> bool {
        self.referencing_table == self.referred_table
    }

    /// Check if the constraint covers the column.
    pub fn covers(&self, column: &str) -> bool {
        self.referencing_columns.iter().any(|c| c == column)
    }

    /// ALTER TABLE statement adding the constraint. Constraints are deferred
    /// so that placeholder rows and batched copies can satisfy them by the
    /// end of each transaction.
    pub fn add_constraint_sql(&self) -> String {
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON UPDATE {} ON DELETE {} DEFERRABLE INITIALLY DEFERRED",
            quote_ident(&self.referencing_table),
            quote_ident(&self.name),
            join_idents(&self.referencing_columns),
            quote_ident(&self.referred_table),
            join_idents(&self.referred_columns),
            self.on_update.sql(),
            self.on_delete.sql(),
        )
    }

    /// ALTER TABLE statement removing the constraint if present.
    pub fn drop_constraint_sql(&self) -> String {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {}",
            quote_ident(&self.referencing_table),
            quote_ident(&self.name),
        )
    }
}

/// A secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    /// Logical index name, unique per table.
    pub name: String,
    /// Indexed columns.
    pub columns: Vec<String>,
    /// UNIQUE index.
    pub unique: bool,
}

impl Index {
    /// Create a non-unique index.
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            unique: false,
        }
    }

    /// Mark as unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Physical index name on a given table. Index names are global in
    /// PostgreSQL, so they are qualified by the table's physical name.
    pub fn physical_name(&self, table: &str) -> String {
        format!("{}_{}", table, self.name)
    }

    /// CREATE INDEX statement for the index on a table.
    pub fn create_sql(&self, table: &str) -> String {
        format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
            if self.unique { "UNIQUE " } else { "" },
            quote_ident(&self.physical_name(table)),
            quote_ident(table),
            join_idents(&self.columns),
        )
    }
}

/// A table. The name is the physical name (its ref-id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Physical name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<Column>,
    /// Outgoing foreign keys.
    pub foreign_keys: Vec<ForeignKey>,
    /// Secondary indexes.
    pub indexes: Vec<Index>,
}

impl Table {
    /// Create an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Add a column (builder style). Later columns with the same name are ignored.
    pub fn with_column(mut self, column: Column) -> Self {
        if self.column(&column.name).is_none() {
            self.columns.push(column);
        }
        self
    }

    /// Add an index (builder style).
    pub fn with_index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    /// Look up a column.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Look up a column mutably.
    pub fn column_mut(&mut self, name: &str) -> Result<&mut Column, Error> {
        let table = self.name.clone();
        self.columns
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::UnknownColumn {
                table,
                column: name.to_string(),
            })
    }

    /// Check if the table has a column.
    pub fn contains_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Primary key columns in declaration order.
    pub fn primary_key_columns(&self) -> Vec<&Column> {
        self.columns.iter().filter(|c| c.primary_key).collect()
    }

    /// Primary key column names in declaration order.
    pub fn primary_key_names(&self) -> Vec<String> {
        self.primary_key_columns()
            .into_iter()
            .map(|c| c.name.clone())
            .collect()
    }

    /// Add a column.
    pub fn add_column(&mut self, column: Column) -> Result<(), Error> {
        if self.contains_column(&column.name) {
            return Err(Error::DuplicateColumn {
                table: self.name.clone(),
                column: column.name,
            });
        }
        self.columns.push(column);
        Ok(())
    }

    /// Remove a column together with the constraints and indexes covering it.
    pub fn remove_column(&mut self, name: &str) -> Result<Column, Error> {
        let position = self
            .columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| Error::UnknownColumn {
                table: self.name.clone(),
                column: name.to_string(),
            })?;
        self.foreign_keys.retain(|fk| !fk.covers(name));
        self.indexes.retain(|idx| !idx.columns.iter().any(|c| c == name));
        Ok(self.columns.remove(position))
    }

    /// Rename a column, following the rename through constraints and indexes.
    pub fn rename_column(&mut self, name: &str, new_name: &str) -> Result<(), Error> {
        if self.contains_column(new_name) {
            return Err(Error::DuplicateColumn {
                table: self.name.clone(),
                column: new_name.to_string(),
            });
        }
        self.column_mut(name)?.name = new_name.to_string();
        let rename = |columns: &mut Vec<String>| {
            for column in columns.iter_mut() {
                if column == name {
                    *column = new_name.to_string();
                }
            }
        };
        for fk in &mut self.foreign_keys {
            rename(&mut fk.referencing_columns);
            if fk.is_self_referencing() {
                rename(&mut fk.referred_columns);
            }
        }
        for index in &mut self.indexes {
            rename(&mut index.columns);
        }
        Ok(())
    }

    /// Add a foreign key. Every referencing column must exist.
    pub fn add_foreign_key(&mut self, foreign_key: ForeignKey) -> Result<(), Error> {
        for column in &foreign_key.referencing_columns {
            if !self.contains_column(column) {
                return Err(Error::UnknownColumn {
                    table: self.name.clone(),
                    column: column.clone(),
                });
            }
        }
        if self.foreign_keys.iter().any(|fk| fk.name == foreign_key.name) {
            return Err(Error::Duplicate(foreign_key.name));
        }
        self.foreign_keys.push(foreign_key);
        Ok(())
    }

    /// Remove a foreign key by name.
    pub fn remove_foreign_key(&mut self, name: &str) -> Result<ForeignKey, Error> {
        let position = self
            .foreign_keys
            .iter()
            .position(|fk| fk.name == name)
            .ok_or_else(|| Error::UnknownForeignKey {
                table: self.name.clone(),
                name: name.to_string(),
            })?;
        Ok(self.foreign_keys.remove(position))
    }

    /// The foreign key covering a column, if any.
    pub fn foreign_key_for_column(&self, column: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|fk| fk.covers(column))
    }

    /// Check if a foreign key must always point at an existing row: every
    /// referencing column is NOT NULL.
    pub fn is_required(&self, foreign_key: &ForeignKey) -> bool {
        foreign_key
            .referencing_columns
            .iter()
            .all(|name| self.column(name).map(|c| c.not_null).unwrap_or(false))
    }

    /// Check if any foreign key points at the given table.
    pub fn references(&self, table: &str) -> bool {
        self.foreign_keys.iter().any(|fk| fk.referred_table == table)
    }

    /// Add an index.
    pub fn add_index(&mut self, index: Index) -> Result<(), Error> {
        if self.indexes.iter().any(|i| i.name == index.name) {
            return Err(Error::Duplicate(index.name));
        }
        for column in &index.columns {
            if !self.contains_column(column) {
                return Err(Error::UnknownColumn {
                    table: self.name.clone(),
                    column: column.clone(),
                });
            }
        }
        self.indexes.push(index);
        Ok(())
    }

    /// Remove an index by name.
    pub fn remove_index(&mut self, name: &str) -> Result<Index, Error> {
        let position = self
            .indexes
            .iter()
            .position(|i| i.name == name)
            .ok_or_else(|| Error::UnknownIndex {
                table: self.name.clone(),
                name: name.to_string(),
            })?;
        Ok(self.indexes.remove(position))
    }

    /// Copy the table under a new physical name. Foreign keys keep their
    /// targets; the self-referencing ones are moved to the copy.
    pub fn copy_as(&self, name: impl Into<String>) -> Table {
        let name = name.into();
        let foreign_keys = self
            .foreign_keys
            .iter()
            .map(|fk| {
                let mut fk = fk.clone();
                if fk.is_self_referencing() {
                    fk.referred_table = name.clone();
                }
                fk.referencing_table = name.clone();
                fk
            })
            .collect();
        Table {
            name,
            columns: self.columns.clone(),
            foreign_keys,
            indexes: self.indexes.clone(),
        }
    }

    /// Validate the table shape.
    pub fn validate(&self) -> Result<(), Error> {
        if self.columns.is_empty() {
            return Err(Error::EmptyTable(self.name.clone()));
        }
        if self.primary_key_columns().is_empty() {
            return Err(Error::MissingPrimaryKey(self.name.clone()));
        }
        Ok(())
    }

    /// CREATE TABLE statement, without foreign keys.
    pub fn create_sql(&self) -> String {
        let mut parts: Vec<String> = self.columns.iter().map(|c| c.definition_sql()).collect();
        let primary_key = self.primary_key_names();
        if !primary_key.is_empty() {
            parts.push(format!("PRIMARY KEY ({})", join_idents(&primary_key)));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&self.name),
            parts.join(", ")
        )
    }
}

/// Quote and comma-join identifiers.
pub(crate) fn join_idents(names: &[String]) -> String {
    names
        .iter()
        .map(|n| quote_ident(n))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;

    fn employees() -> Table {
        let mut table = Table::new("employees")
            .with_column(Column::new("id", ColumnType::Integer).primary_key())
            .with_column(Column::new("name", ColumnType::Text).not_null())
            .with_column(Column::new("manager_id", ColumnType::Integer))
            .with_index(Index::new("by_manager", vec!["manager_id".to_string()]));
        table
            .add_foreign_key(ForeignKey::new(
                "employees_manager_fk",
                "employees",
                vec!["manager_id".to_string()],
                "employees",
                vec!["id".to_string()],
            ))
            .unwrap();
        table
    }

    #[test]
    fn test_copy_moves_self_references() {
        let copy = employees().copy_as("table_abc");
        let fk = &copy.foreign_keys[0];
        assert_eq!(fk.referencing_table, "table_abc");
        assert_eq!(fk.referred_table, "table_abc");
        assert_eq!(copy.columns.len(), 3);
    }

    #[test]
    fn test_rename_column_follows_constraints() {
        let mut table = employees();
        table.rename_column("manager_id", "boss_id").unwrap();
        assert_eq!(table.foreign_keys[0].referencing_columns, vec!["boss_id"]);
        assert_eq!(table.indexes[0].columns, vec!["boss_id"]);
        assert!(table.rename_column("boss_id", "name").is_err());
    }

    #[test]
    fn test_remove_column_drops_covering_constraints() {
        let mut table = employees();
        table.remove_column("manager_id").unwrap();
        assert!(table.foreign_keys.is_empty());
        assert!(table.indexes.is_empty());
        assert!(matches!(
            table.remove_column("manager_id"),
            Err(Error::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_required_foreign_key() {
        let mut table = employees();
        let fk = table.foreign_keys[0].clone();
        assert!(!table.is_required(&fk));
        table.column_mut("manager_id").unwrap().not_null = true;
        assert!(table.is_required(&fk));
    }

    #[test]
    fn test_validate() {
        assert!(employees().validate().is_ok());
        assert!(matches!(
            Table::new("empty").validate(),
            Err(Error::EmptyTable(_))
        ));
        let no_pk = Table::new("t").with_column(Column::new("a", ColumnType::Text));
        assert!(matches!(no_pk.validate(), Err(Error::MissingPrimaryKey(_))));
    }

    #[test]
    fn test_create_sql() {
        let sql = employees().create_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"employees\""));
        assert!(sql.ends_with("PRIMARY KEY (\"id\"))"));
        let fk_sql = employees().foreign_keys[0].add_constraint_sql();
        assert!(fk_sql.contains("DEFERRABLE INITIALLY DEFERRED"));
    }
}
