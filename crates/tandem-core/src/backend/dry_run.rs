//! Backend writing statements to a file instead of executing them.

use super::{Backend, BackendError, Connection};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Writes every statement, transaction control included, to a script file.
/// Statements report zero affected rows.
#[derive(Debug, Clone)]
pub struct DryRunBackend {
    path: PathBuf,
    writer: Arc<Mutex<BufWriter<File>>>,
}

impl DryRunBackend {
    /// Create (or truncate) the script file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            path,
            writer: Arc::new(Mutex::new(BufWriter::new(file))),
        })
    }

    /// Path of the script file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush buffered statements to the file.
    pub fn flush(&self) -> Result<(), BackendError> {
        self.writer.lock().flush()?;
        Ok(())
    }
}

impl Backend for DryRunBackend {
    fn name(&self) -> &str {
        "dry-run"
    }

    fn connect(&self) -> Result<Box<dyn Connection + '_>, BackendError> {
        Ok(Box::new(DryRunConnection { backend: self }))
    }
}

struct DryRunConnection<'a> {
    backend: &'a DryRunBackend,
}

impl Connection for DryRunConnection<'_> {
    fn execute(&mut self, sql: &str) -> Result<u64, BackendError> {
        let mut writer = self.backend.writer.lock();
        writeln!(writer, "{};", sql.trim_end_matches(';'))?;
        Ok(0)
    }
}

impl Drop for DryRunConnection<'_> {
    fn drop(&mut self) {
        let _ = self.backend.writer.lock().flush();
    }
}
