//! Persisted mismatch findings.
//!
//! The db crate stores findings as plain columns; the scanner converts its
//! `MismatchFinding` into a [`NewFinding`] before inserting.

use crate::error::{DatabaseError, Result};
use crate::scan_jobs::parse_time;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Row, Sqlite};

/// Finding to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFinding {
    /// Company number
    pub company_number: String,
    /// Filing the extracted value came from
    pub filing_id: String,
    /// `name`, `date` or `name_change_date`
    pub field: String,
    /// Value on the record
    pub expected: String,
    /// Value read from the document
    pub extracted: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// `mismatch`, `ambiguous` or `multiple_name_changes`
    pub kind: String,
    /// Other filings agreeing with the extracted value
    pub corroborating_filings: Vec<String>,
}

/// A stored finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFinding {
    /// Row id
    pub id: String,
    /// Scan the finding belongs to
    pub scan_id: String,
    /// Company number
    pub company_number: String,
    /// Source filing
    pub filing_id: String,
    /// `name`, `date` or `name_change_date`
    pub field: String,
    /// Value on the record
    pub expected: String,
    /// Value read from the document
    pub extracted: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// `mismatch`, `ambiguous` or `multiple_name_changes`
    pub kind: String,
    /// Other filings agreeing with the extracted value
    pub corroborating_filings: Vec<String>,
    /// When the finding was recorded
    pub discovered_at: DateTime<Utc>,
}

/// Insert a finding, replacing any earlier finding for the same company, field and kind.
pub async fn upsert_finding(pool: &Pool<Sqlite>, scan_id: &str, finding: &NewFinding) -> Result<()> {
    let corroborating = serde_json::to_string(&finding.corroborating_filings)
        .map_err(|e| DatabaseError::Decode(e.to_string()))?;

    sqlx::query(
        r"
        INSERT INTO findings (id, scan_id, company_number, filing_id, field, expected, extracted,
                              confidence, kind, corroborating_filings, discovered_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(scan_id, company_number, field, kind) DO UPDATE SET
            filing_id = excluded.filing_id,
            expected = excluded.expected,
            extracted = excluded.extracted,
            confidence = excluded.confidence,
            corroborating_filings = excluded.corroborating_filings,
            discovered_at = excluded.discovered_at
        ",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(scan_id)
    .bind(&finding.company_number)
    .bind(&finding.filing_id)
    .bind(&finding.field)
    .bind(&finding.expected)
    .bind(&finding.extracted)
    .bind(finding.confidence)
    .bind(&finding.kind)
    .bind(corroborating)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// All findings of a scan, ordered by company then field.
pub async fn get_by_scan(pool: &Pool<Sqlite>, scan_id: &str) -> Result<Vec<StoredFinding>> {
    let rows = sqlx::query(
        r"
        SELECT id, scan_id, company_number, filing_id, field, expected, extracted,
               confidence, kind, corroborating_filings, discovered_at
        FROM findings
        WHERE scan_id = ?
        ORDER BY company_number, field
        ",
    )
    .bind(scan_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| -> Result<StoredFinding> {
            let corroborating: String = row.try_get("corroborating_filings")?;
            let discovered_at: String = row.try_get("discovered_at")?;
            Ok(StoredFinding {
                id: row.try_get("id")?,
                scan_id: row.try_get("scan_id")?,
                company_number: row.try_get("company_number")?,
                filing_id: row.try_get("filing_id")?,
                field: row.try_get("field")?,
                expected: row.try_get("expected")?,
                extracted: row.try_get("extracted")?,
                confidence: row.try_get("confidence")?,
                kind: row.try_get("kind")?,
                corroborating_filings: serde_json::from_str(&corroborating)
                    .map_err(|e| DatabaseError::Decode(e.to_string()))?,
                discovered_at: parse_time(&discovered_at)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan_jobs::{start_scan_job, ScanProgress};
    use crate::Database;

    async fn setup_test_db() -> Database {
        let db = Database::new(":memory:").await.expect("create test database");
        db.run_migrations().await.expect("run migrations");
        start_scan_job(db.pool(), "scan-1", ScanProgress::default())
            .await
            .expect("create scan job");
        db
    }

    fn finding(extracted: &str, confidence: f64) -> NewFinding {
        NewFinding {
            company_number: "01234567".to_string(),
            filing_id: "MzAx".to_string(),
            field: "name".to_string(),
            expected: "John Smith".to_string(),
            extracted: extracted.to_string(),
            confidence,
            kind: "mismatch".to_string(),
            corroborating_filings: vec!["MzAy".to_string()],
        }
    }

    #[tokio::test]
    async fn test_upsert_and_list() {
        let db = setup_test_db().await;
        upsert_finding(db.pool(), "scan-1", &finding("Jon Smith", 0.92))
            .await
            .expect("insert");

        let stored = get_by_scan(db.pool(), "scan-1").await.expect("list");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].extracted, "Jon Smith");
        assert_eq!(stored[0].corroborating_filings, vec!["MzAy"]);
        assert!((stored[0].confidence - 0.92).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_reprocessed_company_replaces_finding() {
        let db = setup_test_db().await;
        upsert_finding(db.pool(), "scan-1", &finding("Jon Smith", 0.85))
            .await
            .expect("insert");
        upsert_finding(db.pool(), "scan-1", &finding("Jon Smith", 0.92))
            .await
            .expect("replace");

        let stored = get_by_scan(db.pool(), "scan-1").await.expect("list");
        assert_eq!(stored.len(), 1);
        assert!((stored[0].confidence - 0.92).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_name_change_flag_kept_beside_mismatch() {
        let db = setup_test_db().await;
        upsert_finding(db.pool(), "scan-1", &finding("Jon Smith", 0.92))
            .await
            .expect("insert mismatch");
        let flag = NewFinding {
            extracted: "ALPHA LTD; BETA LTD; GAMMA LTD".to_string(),
            kind: "multiple_name_changes".to_string(),
            corroborating_filings: Vec::new(),
            ..finding("", 0.9)
        };
        upsert_finding(db.pool(), "scan-1", &flag)
            .await
            .expect("insert flag");

        let kinds: Vec<String> = get_by_scan(db.pool(), "scan-1")
            .await
            .expect("list")
            .into_iter()
            .map(|f| f.kind)
            .collect();
        assert_eq!(kinds.len(), 2);
        assert!(kinds.contains(&"multiple_name_changes".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_scan_rejected() {
        let db = setup_test_db().await;
        let result = upsert_finding(db.pool(), "no-such-scan", &finding("Jon Smith", 0.9)).await;
        assert!(result.is_err());
    }
}
