//! Physical schema model.
//!
//! Tables, views and sequences are keyed by their physical name, which for
//! tables and views is the ref-id assigned by the [`RefLog`](crate::reflog::RefLog).

mod catalog;
mod column;
mod table;
mod types;

pub use catalog::{Catalog, Sequence, View};
pub use column::{Column, Hint};
pub use table::{ForeignKey, ForeignKeyAction, Index, Table};
pub use types::ColumnType;

pub(crate) use table::join_idents;

/// Quote an SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
