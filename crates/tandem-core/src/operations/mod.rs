//! Schema operations and how they transform the catalog and ref log.

mod migrator;

pub use migrator::SchemaMigrator;

use crate::schema::{Column, ColumnType, ForeignKeyAction, Hint};
use serde::{Deserialize, Serialize};

/// Changes applied to a column by [`SchemaOperation::AlterColumn`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnChanges {
    /// New column name.
    pub new_name: Option<String>,
    /// New column type.
    pub new_type: Option<ColumnType>,
    /// New default expression. `Some(None)` removes the default.
    pub default_expression: Option<Option<String>>,
    /// Hints to set.
    pub add_hints: Vec<Hint>,
    /// Hints to clear.
    pub drop_hints: Vec<Hint>,
}

impl ColumnChanges {
    /// Rename the column.
    pub fn rename(mut self, name: impl Into<String>) -> Self {
        self.new_name = Some(name.into());
        self
    }

    /// Change the type.
    pub fn modify_type(mut self, column_type: ColumnType) -> Self {
        self.new_type = Some(column_type);
        self
    }

    /// Set the default expression.
    pub fn set_default(mut self, expression: impl Into<String>) -> Self {
        self.default_expression = Some(Some(expression.into()));
        self
    }

    /// Remove the default expression.
    pub fn drop_default(mut self) -> Self {
        self.default_expression = Some(None);
        self
    }

    /// Set a hint.
    pub fn add_hint(mut self, hint: Hint) -> Self {
        self.add_hints.push(hint);
        self
    }

    /// Clear a hint.
    pub fn drop_hint(mut self, hint: Hint) -> Self {
        self.drop_hints.push(hint);
        self
    }
}

/// A schema-changing operation, expressed in logical names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaOperation {
    /// Create a table.
    CreateTable {
        /// Table name.
        name: String,
        /// Columns.
        columns: Vec<Column>,
    },
    /// Drop a table.
    DropTable {
        /// Table name.
        name: String,
    },
    /// Rename a table.
    RenameTable {
        /// Current name.
        name: String,
        /// New name.
        new_name: String,
    },
    /// Create a new table with the structure and data of an existing one.
    CopyTable {
        /// Source table.
        source: String,
        /// Name of the copy.
        target: String,
    },
    /// Add a column.
    AddColumn {
        /// Table name.
        table: String,
        /// Column definition.
        column: Column,
    },
    /// Alter a column.
    AlterColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Changes to apply.
        changes: ColumnChanges,
    },
    /// Drop a column.
    DropColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// Add a foreign key.
    AddForeignKey {
        /// Referencing table.
        table: String,
        /// Constraint name.
        name: String,
        /// Referencing columns.
        columns: Vec<String>,
        /// Referenced table.
        referred_table: String,
        /// Referenced columns.
        referred_columns: Vec<String>,
        /// ON UPDATE action.
        on_update: ForeignKeyAction,
        /// ON DELETE action.
        on_delete: ForeignKeyAction,
    },
    /// Drop a foreign key.
    DropForeignKey {
        /// Table name.
        table: String,
        /// Constraint name.
        name: String,
    },
    /// Create an index.
    CreateIndex {
        /// Table name.
        table: String,
        /// Index name.
        name: String,
        /// Indexed columns.
        columns: Vec<String>,
        /// UNIQUE index.
        unique: bool,
    },
    /// Drop an index.
    DropIndex {
        /// Table name.
        table: String,
        /// Index name.
        name: String,
    },
    /// Create a view.
    CreateView {
        /// View name.
        name: String,
        /// Defining query against logical names.
        query: String,
    },
    /// Drop a view.
    DropView {
        /// View name.
        name: String,
    },
}

impl SchemaOperation {
    /// Create a table.
    pub fn create_table(name: impl Into<String>, columns: Vec<Column>) -> Self {
        SchemaOperation::CreateTable {
            name: name.into(),
            columns,
        }
    }

    /// Drop a table.
    pub fn drop_table(name: impl Into<String>) -> Self {
        SchemaOperation::DropTable { name: name.into() }
    }

    /// Rename a table.
    pub fn rename_table(name: impl Into<String>, new_name: impl Into<String>) -> Self {
        SchemaOperation::RenameTable {
            name: name.into(),
            new_name: new_name.into(),
        }
    }

    /// Copy a table.
    pub fn copy_table(source: impl Into<String>, target: impl Into<String>) -> Self {
        SchemaOperation::CopyTable {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Add a column.
    pub fn add_column(table: impl Into<String>, column: Column) -> Self {
        SchemaOperation::AddColumn {
            table: table.into(),
            column,
        }
    }

    /// Alter a column.
    pub fn alter_column(
        table: impl Into<String>,
        column: impl Into<String>,
        changes: ColumnChanges,
    ) -> Self {
        SchemaOperation::AlterColumn {
            table: table.into(),
            column: column.into(),
            changes,
        }
    }

    /// Drop a column.
    pub fn drop_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        SchemaOperation::DropColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Add a foreign key with NO ACTION semantics.
    pub fn add_foreign_key(
        table: impl Into<String>,
        name: impl Into<String>,
        columns: &[&str],
        referred_table: impl Into<String>,
        referred_columns: &[&str],
    ) -> Self {
        SchemaOperation::AddForeignKey {
            table: table.into(),
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            referred_table: referred_table.into(),
            referred_columns: referred_columns.iter().map(|c| c.to_string()).collect(),
            on_update: ForeignKeyAction::NoAction,
            on_delete: ForeignKeyAction::NoAction,
        }
    }

    /// Drop a foreign key.
    pub fn drop_foreign_key(table: impl Into<String>, name: impl Into<String>) -> Self {
        SchemaOperation::DropForeignKey {
            table: table.into(),
            name: name.into(),
        }
    }

    /// Create an index.
    pub fn create_index(
        table: impl Into<String>,
        name: impl Into<String>,
        unique: bool,
        columns: &[&str],
    ) -> Self {
        SchemaOperation::CreateIndex {
            table: table.into(),
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique,
        }
    }

    /// Drop an index.
    pub fn drop_index(table: impl Into<String>, name: impl Into<String>) -> Self {
        SchemaOperation::DropIndex {
            table: table.into(),
            name: name.into(),
        }
    }

    /// Create a view.
    pub fn create_view(name: impl Into<String>, query: impl Into<String>) -> Self {
        SchemaOperation::CreateView {
            name: name.into(),
            query: query.into(),
        }
    }

    /// Drop a view.
    pub fn drop_view(name: impl Into<String>) -> Self {
        SchemaOperation::DropView { name: name.into() }
    }
}

impl std::fmt::Display for SchemaOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaOperation::CreateTable { name, .. } => write!(f, "create table {name}"),
            SchemaOperation::DropTable { name } => write!(f, "drop table {name}"),
            SchemaOperation::RenameTable { name, new_name } => {
                write!(f, "rename table {name} to {new_name}")
            }
            SchemaOperation::CopyTable { source, target } => {
                write!(f, "copy table {source} to {target}")
            }
            SchemaOperation::AddColumn { table, column } => {
                write!(f, "add column {}.{}", table, column.name)
            }
            SchemaOperation::AlterColumn { table, column, .. } => {
                write!(f, "alter column {table}.{column}")
            }
            SchemaOperation::DropColumn { table, column } => {
                write!(f, "drop column {table}.{column}")
            }
            SchemaOperation::AddForeignKey { table, name, .. } => {
                write!(f, "add foreign key {name} on {table}")
            }
            SchemaOperation::DropForeignKey { table, name } => {
                write!(f, "drop foreign key {name} on {table}")
            }
            SchemaOperation::CreateIndex { table, name, .. } => {
                write!(f, "create index {name} on {table}")
            }
            SchemaOperation::DropIndex { table, name } => {
                write!(f, "drop index {name} on {table}")
            }
            SchemaOperation::CreateView { name, .. } => write!(f, "create view {name}"),
            SchemaOperation::DropView { name } => write!(f, "drop view {name}"),
        }
    }
}
