//! Database connection and migration management.
//!
//! Opens the SQLite file in WAL mode so readers keep working while the single
//! writer commits, and applies the SQLx migrations before returning the pool.

use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

use crate::error::StoreError;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Run database migrations.
///
/// This is idempotent - migrations that have already been applied will be skipped.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), StoreError> {
    log::debug!("checking database migration state");
    MIGRATOR.run(pool).await?;
    log::debug!("database migrations up to date");
    Ok(())
}

/// Open (creating if needed) the database at `path` and migrate it.
pub async fn connect(path: impl AsRef<Path>) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::new()
        .filename(path.as_ref())
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;
    log::info!("opened message store at {}", path.as_ref().display());
    Ok(pool)
}
