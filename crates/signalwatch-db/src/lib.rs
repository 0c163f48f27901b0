//! SignalWatch results store
//!
//! Optional `SQLite` persistence for scan outcomes: the scan job lifecycle,
//! recorded mismatch findings and the director graph edges. The scan itself
//! never depends on it for progress; that lives in the checkpoint file.
//!
//! # Example
//!
//! ```ignore
//! use signalwatch_db::Database;
//!
//! let db = Database::new("signalwatch.db").await?;
//! db.run_migrations().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod connection;
pub mod error;
pub mod findings;
/// Director → company edges discovered during a scan.
pub mod graph_edges;
pub mod migrations;
/// Scan job lifecycle tracking.
pub mod scan_jobs;

pub use error::{DatabaseError, Result};
pub use findings::{NewFinding, StoredFinding};
pub use scan_jobs::{ScanJob, ScanJobStatus, ScanProgress};

use sqlx::{Pool, Sqlite};
use std::path::Path;

/// High-level database handle with migrations.
#[derive(Debug, Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Open the database at `path` (or `:memory:`).
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let pool = connection::open_pool(path).await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run all pending migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run_migrations(&self.pool).await
    }

    /// Number of applied migrations.
    pub async fn get_schema_version(&self) -> Result<i64> {
        migrations::get_schema_version(&self.pool).await
    }

    /// Underlying `SQLx` pool.
    #[must_use]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Close the pool gracefully.
    pub async fn close(self) {
        self.pool.close().await;
    }
}
