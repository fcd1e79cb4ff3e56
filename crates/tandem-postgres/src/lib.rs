//! PostgreSQL backend for tandem.
//!
//! The migrator is synchronous, so the backend owns a tokio runtime and
//! blocks on every `sqlx` call. Each [`Connection`] holds one pooled
//! connection for its whole lifetime, which keeps `BEGIN`/`COMMIT` on the
//! same session.
//!
//! ```ignore
//! let backend = PostgresBackend::open(PostgresConfig::from_env()?)?;
//! let migrator = Migrator::new(backend, store);
//! migrator.apply_schema_changes(&mut state, &from, &to)?;
//! ```

mod config;

pub use config::PostgresConfig;

use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};
use tandem_core::{Backend, BackendError, Connection};
use tokio::runtime::Runtime;
use tracing::{debug, info};

/// A PostgreSQL database reached through a connection pool.
pub struct PostgresBackend {
    pool: PgPool,
    rt: Runtime,
    config: PostgresConfig,
}

impl PostgresBackend {
    /// Open a pool with the given settings.
    pub fn open(config: PostgresConfig) -> Result<Self, BackendError> {
        let rt = Runtime::new()?;
        let pool = rt
            .block_on(
                PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(&config.database_url),
            )
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        info!(
            url = %config.redacted_url(),
            max_connections = config.max_connections,
            "connected to postgres"
        );
        Ok(Self { pool, rt, config })
    }

    /// Open a pool using `DATABASE_URL`.
    pub fn from_env() -> Result<Self, BackendError> {
        Self::open(PostgresConfig::from_env()?)
    }

    /// The settings the pool was opened with.
    pub fn config(&self) -> &PostgresConfig {
        &self.config
    }
}

impl Backend for PostgresBackend {
    fn name(&self) -> &str {
        "postgres"
    }

    fn connect(&self) -> Result<Box<dyn Connection + '_>, BackendError> {
        let conn = self
            .rt
            .block_on(self.pool.acquire())
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        debug!("acquired postgres connection");
        Ok(Box::new(PostgresConnection { conn, rt: &self.rt }))
    }
}

impl Drop for PostgresBackend {
    fn drop(&mut self) {
        self.rt.block_on(self.pool.close());
    }
}

struct PostgresConnection<'a> {
    conn: PoolConnection<Postgres>,
    rt: &'a Runtime,
}

impl Connection for PostgresConnection<'_> {
    fn execute(&mut self, sql: &str) -> Result<u64, BackendError> {
        let conn = &mut *self.conn;
        let result = self
            .rt
            .block_on(sqlx::raw_sql(sql).execute(conn))
            .map_err(|e| BackendError::Statement {
                statement: sql.to_string(),
                message: e.to_string(),
            })?;
        Ok(result.rows_affected())
    }
}
