//! Column definitions.

use super::types::ColumnType;
use serde::{Deserialize, Serialize};

/// Column constraint hints that can be added or dropped by an alter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Hint {
    /// Part of the primary key.
    PrimaryKey,
    /// NOT NULL.
    NotNull,
    /// Value drawn from a sequence.
    AutoIncrement,
}

/// A column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Data type.
    pub column_type: ColumnType,
    /// Default value expression, as SQL.
    pub default_expression: Option<String>,
    /// Sequence feeding an auto-increment column.
    pub sequence: Option<String>,
    /// Part of the primary key.
    pub primary_key: bool,
    /// NOT NULL.
    pub not_null: bool,
    /// Value drawn from a sequence.
    pub auto_increment: bool,
}

impl Column {
    /// Create a nullable column without hints.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            default_expression: None,
            sequence: None,
            primary_key: false,
            not_null: false,
            auto_increment: false,
        }
    }

    /// Mark as primary key column. Primary key columns are never null.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.not_null = true;
        self
    }

    /// Mark as NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Mark as auto-increment.
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Set the default expression.
    pub fn with_default(mut self, expression: impl Into<String>) -> Self {
        self.default_expression = Some(expression.into());
        self
    }

    /// Attach a sequence.
    pub fn with_sequence(mut self, sequence: impl Into<String>) -> Self {
        self.sequence = Some(sequence.into());
        self.auto_increment = true;
        self
    }

    /// Check whether a hint is set.
    pub fn has_hint(&self, hint: Hint) -> bool {
        match hint {
            Hint::PrimaryKey => self.primary_key,
            Hint::NotNull => self.not_null,
            Hint::AutoIncrement => self.auto_increment,
        }
    }

    /// Set a hint.
    pub fn add_hint(&mut self, hint: Hint) {
        match hint {
            Hint::PrimaryKey => {
                self.primary_key = true;
                self.not_null = true;
            }
            Hint::NotNull => self.not_null = true,
            Hint::AutoIncrement => self.auto_increment = true,
        }
    }

    /// Clear a hint.
    pub fn drop_hint(&mut self, hint: Hint) {
        match hint {
            Hint::PrimaryKey => self.primary_key = false,
            Hint::NotNull => self.not_null = false,
            Hint::AutoIncrement => {
                self.auto_increment = false;
                self.sequence = None;
            }
        }
    }

    /// The effective DEFAULT clause value, if any.
    pub fn default_sql(&self) -> Option<String> {
        if let Some(expression) = &self.default_expression {
            return Some(expression.clone());
        }
        self.sequence
            .as_ref()
            .map(|sequence| format!("nextval('{sequence}')"))
    }

    /// Column definition as it appears in CREATE TABLE.
    pub fn definition_sql(&self) -> String {
        let mut sql = format!(
            "{} {}",
            super::quote_ident(&self.name),
            self.column_type.sql()
        );
        if self.not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = self.default_sql() {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default);
        }
        sql
    }
}
