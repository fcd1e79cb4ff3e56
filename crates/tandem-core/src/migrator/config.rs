//! Migrator configuration.

/// Migrator configuration.
#[derive(Debug, Clone)]
pub struct MigratorConfig {
    /// Rows copied per statement when populating ghost tables.
    pub copy_batch_size: usize,
    /// Plan and validate, report the plan, execute nothing.
    pub dry_run: bool,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            copy_batch_size: 1000,
            dry_run: false,
        }
    }
}

impl MigratorConfig {
    /// Set the copy batch size. Zero is treated as one.
    pub fn with_copy_batch_size(mut self, size: usize) -> Self {
        self.copy_batch_size = size.max(1);
        self
    }

    /// Enable or disable dry-run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}
