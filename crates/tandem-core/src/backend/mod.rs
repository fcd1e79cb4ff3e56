//! Database access used by the migrator.
//!
//! A [`Backend`] hands out [`Connection`]s that execute SQL statements one
//! at a time. The migrator wraps every multi-statement change in
//! [`transaction`], which rolls back when the body fails.

mod dry_run;
mod memory;

pub use dry_run::DryRunBackend;
pub use memory::MemoryBackend;

use thiserror::Error;
use tracing::{debug, warn};

/// Errors reported by a backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Could not obtain a connection.
    #[error("connection failed: {0}")]
    Connection(String),

    /// A statement was rejected by the database.
    #[error("statement failed: {message} (statement: {statement})")]
    Statement {
        /// The statement.
        statement: String,
        /// Database error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A scoped database connection. Released when dropped.
pub trait Connection {
    /// Execute a statement and return the number of affected rows.
    fn execute(&mut self, sql: &str) -> Result<u64, BackendError>;

    /// Start a transaction.
    fn begin(&mut self) -> Result<(), BackendError> {
        self.execute("BEGIN").map(|_| ())
    }

    /// Commit the current transaction.
    fn commit(&mut self) -> Result<(), BackendError> {
        self.execute("COMMIT").map(|_| ())
    }

    /// Roll back the current transaction.
    fn rollback(&mut self) -> Result<(), BackendError> {
        self.execute("ROLLBACK").map(|_| ())
    }
}

/// A database the migrator can connect to.
pub trait Backend {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Open a connection.
    fn connect(&self) -> Result<Box<dyn Connection + '_>, BackendError>;
}

/// Run `body` inside a transaction on `conn`. Commits when `body` succeeds
/// and rolls back when it fails. A failing rollback is logged; the error of
/// `body` is returned.
pub fn transaction<T, E, F>(conn: &mut dyn Connection, body: F) -> Result<T, E>
where
    E: From<BackendError>,
    F: FnOnce(&mut dyn Connection) -> Result<T, E>,
{
    conn.begin()?;
    match body(conn) {
        Ok(value) => {
            conn.commit()?;
            debug!("transaction committed");
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = conn.rollback() {
                warn!(error = %rollback, "rollback failed");
            } else {
                warn!("transaction rolled back");
            }
            Err(err)
        }
    }
}

/// Execute statements in order, stopping at the first failure.
pub fn execute_all<I, S>(conn: &mut dyn Connection, statements: I) -> Result<u64, BackendError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut affected = 0;
    for statement in statements {
        let statement = statement.as_ref();
        debug!(sql = %statement, "execute");
        affected += conn.execute(statement)?;
    }
    Ok(affected)
}
