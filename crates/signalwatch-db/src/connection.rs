//! Connection pool setup.

use crate::error::{DatabaseError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;

/// Connections kept by a file-backed pool.
const MAX_CONNECTIONS: u32 = 5;

/// Open a `SQLite` pool at `path`, creating the file if missing.
///
/// `:memory:` opens a private in-memory database on a single connection so
/// every query sees the same data.
pub async fn open_pool(path: impl AsRef<Path>) -> Result<Pool<Sqlite>> {
    let path_str = path.as_ref().to_str().ok_or_else(|| {
        DatabaseError::Open("invalid database path: not valid UTF-8".to_string())
    })?;
    let in_memory = path_str == ":memory:";

    let mut options = SqliteConnectOptions::from_str(path_str)
        .map_err(|e| DatabaseError::Open(format!("invalid connection string: {e}")))?
        .foreign_keys(true)
        .create_if_missing(true);
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let mut pool_options = SqlitePoolOptions::new().max_connections(MAX_CONNECTIONS);
    if in_memory {
        // The database lives and dies with its only connection.
        pool_options = pool_options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }

    let pool = pool_options
        .connect_with(options)
        .await
        .map_err(|e| DatabaseError::Open(format!("failed to open {path_str}: {e}")))?;

    tracing::info!(path = path_str, "database pool created");
    Ok(pool)
}
