//! In-memory backend recording every statement.

use super::{Backend, BackendError, Connection};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Journal {
    statements: Vec<String>,
    committed: Vec<Vec<String>>,
    rolled_back: Vec<Vec<String>>,
    open: Option<Vec<String>>,
    fail_after: Option<usize>,
    fail_when_contains: Option<String>,
}

impl Journal {
    fn check(&self, sql: &str) -> Result<(), BackendError> {
        let exhausted = self
            .fail_after
            .map(|n| self.statements.len() >= n)
            .unwrap_or(false);
        let matched = self
            .fail_when_contains
            .as_deref()
            .map(|needle| sql.contains(needle))
            .unwrap_or(false);
        if exhausted || matched {
            return Err(BackendError::Statement {
                statement: sql.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

/// Backend that executes nothing. Statements are recorded, grouped by the
/// transaction that committed or rolled them back, and report zero affected
/// rows. Failures can be injected to exercise rollback paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    journal: Arc<Mutex<Journal>>,
}

impl MemoryBackend {
    /// Create a backend without injected failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every statement once `n` statements have succeeded.
    pub fn fail_after(self, n: usize) -> Self {
        self.journal.lock().fail_after = Some(n);
        self
    }

    /// Fail every statement containing `needle`.
    pub fn fail_when_contains(self, needle: impl Into<String>) -> Self {
        self.journal.lock().fail_when_contains = Some(needle.into());
        self
    }

    /// Remove injected failures.
    pub fn clear_failures(&self) {
        let mut journal = self.journal.lock();
        journal.fail_after = None;
        journal.fail_when_contains = None;
    }

    /// Every statement that succeeded, in order, transaction control
    /// excluded.
    pub fn statements(&self) -> Vec<String> {
        self.journal.lock().statements.clone()
    }

    /// Statements of each committed transaction.
    pub fn committed(&self) -> Vec<Vec<String>> {
        self.journal.lock().committed.clone()
    }

    /// Statements of each rolled back transaction.
    pub fn rolled_back(&self) -> Vec<Vec<String>> {
        self.journal.lock().rolled_back.clone()
    }

    /// Forget everything recorded so far.
    pub fn reset(&self) {
        let mut journal = self.journal.lock();
        journal.statements.clear();
        journal.committed.clear();
        journal.rolled_back.clear();
        journal.open = None;
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn connect(&self) -> Result<Box<dyn Connection + '_>, BackendError> {
        Ok(Box::new(MemoryConnection {
            journal: Arc::clone(&self.journal),
        }))
    }
}

struct MemoryConnection {
    journal: Arc<Mutex<Journal>>,
}

impl Connection for MemoryConnection {
    fn execute(&mut self, sql: &str) -> Result<u64, BackendError> {
        let mut journal = self.journal.lock();
        journal.check(sql)?;
        journal.statements.push(sql.to_string());
        if let Some(open) = journal.open.as_mut() {
            open.push(sql.to_string());
        }
        Ok(0)
    }

    fn begin(&mut self) -> Result<(), BackendError> {
        self.journal.lock().open = Some(Vec::new());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), BackendError> {
        let mut journal = self.journal.lock();
        if let Some(open) = journal.open.take() {
            journal.committed.push(open);
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), BackendError> {
        let mut journal = self.journal.lock();
        if let Some(open) = journal.open.take() {
            journal.rolled_back.push(open);
        }
        Ok(())
    }
}
