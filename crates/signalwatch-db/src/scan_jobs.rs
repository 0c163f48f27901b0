use crate::error::{DatabaseError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// A scan job row tracking one scan across resumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanJob {
    /// Scan id (the checkpoint's scan id)
    pub id: String,
    /// When the scan first started
    pub started_at: DateTime<Utc>,
    /// Last progress update
    pub updated_at: DateTime<Utc>,
    /// When the scan reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
    /// Current status
    pub status: ScanJobStatus,
    /// Companies processed
    pub visited_count: u64,
    /// Companies pending
    pub frontier_size: u64,
    /// Findings recorded
    pub findings_count: u64,
    /// Error message if the scan failed
    pub error_message: Option<String>,
}

/// Status of a scan job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScanJobStatus {
    /// Scan is processing companies
    Running,
    /// Scan is paused with its progress checkpointed
    Checkpointed,
    /// Frontier exhausted
    Completed,
    /// Scan stopped on a fatal error
    Failed,
}

impl std::fmt::Display for ScanJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Checkpointed => write!(f, "Checkpointed"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

impl std::str::FromStr for ScanJobStatus {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Running" => Ok(Self::Running),
            "Checkpointed" => Ok(Self::Checkpointed),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            other => Err(DatabaseError::Decode(format!("invalid scan job status '{other}'"))),
        }
    }
}

/// Progress counters reported with every status change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanProgress {
    /// Companies processed
    pub visited: u64,
    /// Companies pending
    pub frontier: u64,
    /// Findings recorded
    pub findings: u64,
}

/// Create the job, or mark an existing one `Running` again on resume.
pub async fn start_scan_job(pool: &SqlitePool, id: &str, progress: ScanProgress) -> Result<()> {
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r"
        INSERT INTO scan_jobs (id, started_at, updated_at, status, visited_count, frontier_size, findings_count)
        VALUES (?, ?, ?, 'Running', ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            status = 'Running',
            updated_at = excluded.updated_at,
            completed_at = NULL,
            error_message = NULL,
            visited_count = excluded.visited_count,
            frontier_size = excluded.frontier_size,
            findings_count = excluded.findings_count
        ",
    )
    .bind(id)
    .bind(&now)
    .bind(&now)
    .bind(to_i64(progress.visited))
    .bind(to_i64(progress.frontier))
    .bind(to_i64(progress.findings))
    .execute(pool)
    .await?;

    Ok(())
}

/// Record progress and a non-terminal status.
pub async fn update_progress(
    pool: &SqlitePool,
    id: &str,
    status: ScanJobStatus,
    progress: ScanProgress,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE scan_jobs SET status = ?, updated_at = ?, visited_count = ?, frontier_size = ?, findings_count = ? WHERE id = ?",
    )
    .bind(status.to_string())
    .bind(Utc::now().to_rfc3339())
    .bind(to_i64(progress.visited))
    .bind(to_i64(progress.frontier))
    .bind(to_i64(progress.findings))
    .bind(id)
    .execute(pool)
    .await?;

    ensure_updated(result.rows_affected(), id)
}

/// Mark a scan job as completed.
pub async fn complete_scan_job(pool: &SqlitePool, id: &str, progress: ScanProgress) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        "UPDATE scan_jobs SET status = 'Completed', updated_at = ?, completed_at = ?, visited_count = ?, frontier_size = ?, findings_count = ? WHERE id = ?",
    )
    .bind(&now)
    .bind(&now)
    .bind(to_i64(progress.visited))
    .bind(to_i64(progress.frontier))
    .bind(to_i64(progress.findings))
    .bind(id)
    .execute(pool)
    .await?;

    ensure_updated(result.rows_affected(), id)
}

/// Mark a scan job as failed.
pub async fn fail_scan_job(pool: &SqlitePool, id: &str, error_message: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        "UPDATE scan_jobs SET status = 'Failed', updated_at = ?, completed_at = ?, error_message = ? WHERE id = ?",
    )
    .bind(&now)
    .bind(&now)
    .bind(error_message)
    .bind(id)
    .execute(pool)
    .await?;

    ensure_updated(result.rows_affected(), id)
}

/// Fetch a scan job by id.
pub async fn get_scan_job(pool: &SqlitePool, id: &str) -> Result<Option<ScanJob>> {
    let row = sqlx::query(
        "SELECT id, started_at, updated_at, completed_at, status, visited_count, frontier_size, findings_count, error_message
         FROM scan_jobs WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let status: String = row.try_get("status")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;

    Ok(Some(ScanJob {
        id: row.try_get("id")?,
        started_at: parse_time(&row.try_get::<String, _>("started_at")?)?,
        updated_at: parse_time(&row.try_get::<String, _>("updated_at")?)?,
        completed_at: completed_at.as_deref().map(parse_time).transpose()?,
        status: status.parse()?,
        visited_count: to_u64(row.try_get("visited_count")?),
        frontier_size: to_u64(row.try_get("frontier_size")?),
        findings_count: to_u64(row.try_get("findings_count")?),
        error_message: row.try_get("error_message")?,
    }))
}

fn ensure_updated(rows: u64, id: &str) -> Result<()> {
    if rows == 0 {
        return Err(DatabaseError::NotFound(format!("Scan job '{id}' not found")));
    }
    Ok(())
}

pub(crate) fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Decode(format!("invalid timestamp '{value}': {e}")))
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
