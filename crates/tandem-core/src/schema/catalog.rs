//! Physical catalog: every table, view and sequence that exists in the
//! database, keyed by physical name.

use super::column::Column;
use super::table::{ForeignKey, Table};
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A view over one or more tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    /// Physical name.
    pub name: String,
    /// Defining query, written against logical table names.
    pub query: String,
}

impl View {
    /// Create a view.
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
        }
    }
}

/// A sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    /// Sequence name.
    pub name: String,
}

/// The physical catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Database name.
    pub name: String,
    tables: BTreeMap<String, Table>,
    views: BTreeMap<String, View>,
    sequences: BTreeMap<String, Sequence>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a table (builder style).
    pub fn with_table(mut self, table: Table) -> Result<Self, Error> {
        self.add_table(table)?;
        Ok(self)
    }

    /// Add a table. Sequences used by its columns are registered as well.
    pub fn add_table(&mut self, table: Table) -> Result<(), Error> {
        table.validate()?;
        if self.tables.contains_key(&table.name) || self.views.contains_key(&table.name) {
            return Err(Error::Duplicate(table.name));
        }
        for column in &table.columns {
            if let Some(sequence) = &column.sequence {
                self.sequences
                    .entry(sequence.clone())
                    .or_insert_with(|| Sequence {
                        name: sequence.clone(),
                    });
            }
        }
        self.tables.insert(table.name.clone(), table);
        Ok(())
    }

    /// Look up a table by physical name.
    pub fn table(&self, name: &str) -> Result<&Table, Error> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    /// Look up a table mutably.
    pub fn table_mut(&mut self, name: &str) -> Result<&mut Table, Error> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    /// Check if a table exists.
    pub fn contains_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Remove a table.
    pub fn remove_table(&mut self, name: &str) -> Result<Table, Error> {
        self.tables
            .remove(name)
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    /// All tables, ordered by physical name.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    /// Physical names of the tables with a foreign key into `name`,
    /// including `name` itself when it references itself.
    pub fn tables_referencing(&self, name: &str) -> BTreeSet<String> {
        self.tables
            .values()
            .filter(|t| t.references(name))
            .map(|t| t.name.clone())
            .collect()
    }

    /// Every foreign key pointing at `name`.
    pub fn foreign_keys_into(&self, name: &str) -> Vec<&ForeignKey> {
        self.tables
            .values()
            .flat_map(|t| t.foreign_keys.iter())
            .filter(|fk| fk.referred_table == name)
            .collect()
    }

    /// Add a view.
    pub fn add_view(&mut self, view: View) -> Result<(), Error> {
        if self.tables.contains_key(&view.name) || self.views.contains_key(&view.name) {
            return Err(Error::Duplicate(view.name));
        }
        self.views.insert(view.name.clone(), view);
        Ok(())
    }

    /// Look up a view by physical name.
    pub fn view(&self, name: &str) -> Result<&View, Error> {
        self.views
            .get(name)
            .ok_or_else(|| Error::UnknownView(name.to_string()))
    }

    /// Remove a view.
    pub fn remove_view(&mut self, name: &str) -> Result<View, Error> {
        self.views
            .remove(name)
            .ok_or_else(|| Error::UnknownView(name.to_string()))
    }

    /// All views.
    pub fn views(&self) -> impl Iterator<Item = &View> {
        self.views.values()
    }

    /// Register a sequence.
    pub fn add_sequence(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.sequences
            .entry(name.clone())
            .or_insert(Sequence { name });
    }

    /// Look up a sequence.
    pub fn sequence(&self, name: &str) -> Result<&Sequence, Error> {
        self.sequences
            .get(name)
            .ok_or_else(|| Error::UnknownSequence(name.to_string()))
    }

    /// Remove a sequence.
    pub fn remove_sequence(&mut self, name: &str) -> Result<Sequence, Error> {
        self.sequences
            .remove(name)
            .ok_or_else(|| Error::UnknownSequence(name.to_string()))
    }

    /// All sequences.
    pub fn sequences(&self) -> impl Iterator<Item = &Sequence> {
        self.sequences.values()
    }

    /// Physical names of the tables whose columns draw from a sequence.
    pub fn tables_using_sequence(&self, sequence: &str) -> Vec<(String, String)> {
        self.tables
            .values()
            .flat_map(|t| {
                t.columns
                    .iter()
                    .filter(|c| c.sequence.as_deref() == Some(sequence))
                    .map(|c| (t.name.clone(), c.name.clone()))
            })
            .collect()
    }

    /// Table and column that `column` of `table` points at through a
    /// foreign key.
    pub fn referenced_column<'a>(&'a self, table: &'a Table, column: &str) -> Option<(&'a Table, &'a Column)> {
        let fk = table.foreign_key_for_column(column)?;
        let position = fk.referencing_columns.iter().position(|c| c == column)?;
        let name = fk.referred_columns.get(position)?;
        let referred = if fk.referred_table == table.name {
            table
        } else {
            self.table(&fk.referred_table).ok()?
        };
        Some((referred, referred.column(name)?))
    }

    /// Sentinel literal for `column` of `table`. A foreign key column takes
    /// the sentinel of the key it references, so it matches the placeholder
    /// row of the referenced table.
    pub fn sentinel(&self, table: &Table, column: &Column) -> &'static str {
        match self.referenced_column(table, &column.name) {
            Some((referred, key)) => self.key_sentinel(referred, key),
            None => self.key_sentinel(table, column),
        }
    }

    /// Integer keys take the sentinel of the narrowest integer type among
    /// the key and the columns referencing it, so the literal fits each of
    /// them.
    fn key_sentinel(&self, table: &Table, key: &Column) -> &'static str {
        let mut narrowest = &key.column_type;
        let local = !self.tables.contains_key(&table.name);
        let referencing = self
            .tables
            .values()
            .chain(local.then_some(table))
            .flat_map(|t| t.foreign_keys.iter().map(move |fk| (t, fk)))
            .filter(|(_, fk)| fk.referred_table == table.name);
        for (referencing_table, fk) in referencing {
            let columns = fk.referencing_columns.iter().zip(&fk.referred_columns);
            for (column, _) in columns.filter(|(_, referred)| **referred == key.name) {
                let Some(column) = referencing_table.column(column) else {
                    continue;
                };
                if let (Some(width), Some(current)) = (column.column_type.integer_bits(), narrowest.integer_bits()) {
                    if width < current {
                        narrowest = &column.column_type;
                    }
                }
            }
        }
        narrowest.sentinel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ColumnType};

    fn catalog() -> Catalog {
        let mut staff = Table::new("staff")
            .with_column(Column::new("id", ColumnType::Integer).primary_key().with_sequence("staff_id_seq"))
            .with_column(Column::new("store_id", ColumnType::Integer));
        staff
            .add_foreign_key(ForeignKey::new(
                "staff_store_fk",
                "staff",
                vec!["store_id".into()],
                "stores",
                vec!["id".into()],
            ))
            .unwrap();
        let stores = Table::new("stores")
            .with_column(Column::new("id", ColumnType::Integer).primary_key());
        Catalog::new("shop")
            .with_table(stores)
            .unwrap()
            .with_table(staff)
            .unwrap()
    }

    #[test]
    fn test_lookup_and_references() {
        let catalog = catalog();
        assert!(catalog.contains_table("stores"));
        assert!(matches!(catalog.table("nope"), Err(Error::UnknownTable(_))));
        let referencing = catalog.tables_referencing("stores");
        assert_eq!(referencing.into_iter().collect::<Vec<_>>(), vec!["staff"]);
        assert_eq!(catalog.foreign_keys_into("stores").len(), 1);
        assert!(catalog.foreign_keys_into("staff").is_empty());
    }

    #[test]
    fn test_sequences_registered_with_tables() {
        let catalog = catalog();
        assert!(catalog.sequence("staff_id_seq").is_ok());
        assert_eq!(
            catalog.tables_using_sequence("staff_id_seq"),
            vec![("staff".to_string(), "id".to_string())]
        );
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut catalog = catalog();
        let dup = Table::new("stores").with_column(Column::new("id", ColumnType::Integer).primary_key());
        assert!(matches!(catalog.add_table(dup), Err(Error::Duplicate(_))));
        assert!(matches!(
            catalog.add_view(View::new("staff", "SELECT 1")),
            Err(Error::Duplicate(_))
        ));
    }
}
