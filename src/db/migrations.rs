//! Store bootstrap: connection options and the idempotent schema.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::Executor;
use std::path::Path;
use std::time::Duration;
use tracing::info;

const SCHEMA: &str = include_str!("schema.sql");

/// Bumped whenever `schema.sql` changes shape; stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 2;

/// Connection settings for the ledger store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// How long a writer waits on SQLite's lock before the call fails as a
    /// retryable storage conflict.
    pub busy_timeout: Duration,
    pub max_connections: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(5_000),
            max_connections: 5,
        }
    }
}

/// Open the store at `db_path` with default options.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    open_store(db_path, StoreOptions::default()).await
}

/// Open (creating if needed) the store at `db_path` and apply the schema.
///
/// # Errors
/// `Io` when the parent directory cannot be created; any connect or schema
/// error otherwise.
pub async fn open_store(db_path: &str, options: StoreOptions) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
        }
    }

    let connect = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(options.busy_timeout);

    let pool = SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(connect)
        .await?;

    apply_schema(&pool).await?;

    info!(
        path = %db_path,
        busy_timeout_ms = options.busy_timeout.as_millis() as u64,
        max_connections = options.max_connections,
        "ledger store ready"
    );
    Ok(pool)
}

/// Apply `schema.sql` and stamp `SCHEMA_VERSION`, all or nothing.
async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    (&mut *tx).execute(SCHEMA).await?;
    (&mut *tx)
        .execute(format!("PRAGMA user_version = {}", SCHEMA_VERSION).as_str())
        .await?;
    tx.commit().await?;
    info!(version = SCHEMA_VERSION, "schema applied");
    Ok(())
}
