//! Rewriting of user SQL from logical names to physical ref-ids.

use crate::error::Error;
use crate::schema::quote_ident;
use std::collections::BTreeMap;

/// Rewrites a query so that the logical table and view names it mentions
/// refer to physical objects. `mapping` is logical name to ref-id.
pub trait QueryRewriter: Send + Sync {
    /// Rewrite `query`.
    fn rewrite(&self, query: &str, mapping: &BTreeMap<String, String>) -> Result<String, Error>;
}

/// Identifier-level rewriter. Every unqualified identifier naming a mapped
/// table or view is replaced. String literals, comments, and identifiers
/// following a `.` are left untouched. Unquoted identifiers match
/// case-insensitively.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableNameRewriter;

impl QueryRewriter for TableNameRewriter {
    fn rewrite(&self, query: &str, mapping: &BTreeMap<String, String>) -> Result<String, Error> {
        let chars: Vec<char> = query.chars().collect();
        let mut out = String::with_capacity(query.len());
        let mut i = 0;
        // Last significant character emitted, to spot qualified names.
        let mut previous: Option<char> = None;

        while i < chars.len() {
            let c = chars[i];
            if c == '\'' {
                let end = scan_quoted(&chars, i, '\'')
                    .ok_or_else(|| Error::InvalidData(format!("unterminated string literal in: {query}")))?;
                out.extend(&chars[i..end]);
                previous = Some('\'');
                i = end;
            } else if c == '"' {
                let end = scan_quoted(&chars, i, '"')
                    .ok_or_else(|| Error::InvalidData(format!("unterminated identifier in: {query}")))?;
                let name: String = chars[i + 1..end - 1].iter().collect::<String>().replace("\"\"", "\"");
                match mapping.get(&name).filter(|_| previous != Some('.')) {
                    Some(target) => out.push_str(&identifier(target)),
                    None => out.extend(&chars[i..end]),
                }
                previous = Some('"');
                i = end;
            } else if c == '-' && chars.get(i + 1) == Some(&'-') {
                let end = chars[i..]
                    .iter()
                    .position(|c| *c == '\n')
                    .map(|p| i + p)
                    .unwrap_or(chars.len());
                out.extend(&chars[i..end]);
                i = end;
            } else if c.is_alphabetic() || c == '_' {
                let end = chars[i..]
                    .iter()
                    .position(|c| !(c.is_alphanumeric() || *c == '_' || *c == '$'))
                    .map(|p| i + p)
                    .unwrap_or(chars.len());
                let word: String = chars[i..end].iter().collect();
                let target = if previous == Some('.') {
                    None
                } else {
                    mapping
                        .get(&word)
                        .or_else(|| mapping.get(&word.to_lowercase()))
                };
                match target {
                    Some(target) if target != &word => out.push_str(&identifier(target)),
                    _ => out.push_str(&word),
                }
                previous = Some('a');
                i = end;
            } else {
                out.push(c);
                if !c.is_whitespace() {
                    previous = Some(c);
                }
                i += 1;
            }
        }
        Ok(out)
    }
}

/// Index just past the closing quote of the quoted run starting at `start`.
/// Doubled quotes are escapes.
fn scan_quoted(chars: &[char], start: usize, quote: char) -> Option<usize> {
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Some(i + 1);
        }
        i += 1;
    }
    None
}

/// Render a ref-id, quoting it only when needed.
fn identifier(name: &str) -> String {
    let plain = name
        .chars()
        .next()
        .map(|c| c.is_ascii_lowercase() || c == '_')
        .unwrap_or(false)
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if plain {
        name.to_string()
    } else {
        quote_ident(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("users".to_string(), "table_1a2b3c4d5e".to_string()),
            ("orders".to_string(), "table_ffeeddccbb".to_string()),
            ("unchanged".to_string(), "unchanged".to_string()),
        ])
    }

    #[test]
    fn test_rewrites_table_names() {
        let sql = "UPDATE users SET name = 'users' WHERE id IN (SELECT user_id FROM \"orders\")";
        assert_eq!(
            TableNameRewriter.rewrite(sql, &mapping()).unwrap(),
            "UPDATE table_1a2b3c4d5e SET name = 'users' WHERE id IN (SELECT user_id FROM table_ffeeddccbb)"
        );
    }

    #[test]
    fn test_keeps_qualified_columns_and_comments() {
        let sql = "SELECT o.users FROM Orders o -- users\nJOIN unchanged u ON u.id = o.id";
        assert_eq!(
            TableNameRewriter.rewrite(sql, &mapping()).unwrap(),
            "SELECT o.users FROM table_ffeeddccbb o -- users\nJOIN unchanged u ON u.id = o.id"
        );
    }

    #[test]
    fn test_escaped_quotes_and_errors() {
        let sql = "INSERT INTO users (note) VALUES ('it''s users')";
        assert_eq!(
            TableNameRewriter.rewrite(sql, &mapping()).unwrap(),
            "INSERT INTO table_1a2b3c4d5e (note) VALUES ('it''s users')"
        );
        assert!(TableNameRewriter.rewrite("SELECT 'open", &mapping()).is_err());
    }
}
