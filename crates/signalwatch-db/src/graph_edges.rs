use crate::error::Result;
use sqlx::{Pool, Sqlite};

/// Record director → company edges. Existing edges are left alone.
pub async fn insert_edges(
    pool: &Pool<Sqlite>,
    scan_id: &str,
    edges: &[(String, String)],
) -> Result<()> {
    let mut tx = pool.begin().await?;
    for (director_id, company_number) in edges {
        sqlx::query(
            "INSERT OR IGNORE INTO graph_edges (scan_id, director_id, company_number) VALUES (?, ?, ?)",
        )
        .bind(scan_id)
        .bind(director_id)
        .bind(company_number)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Edges of a scan as `(director_id, company_number)`, ordered.
pub async fn get_by_scan(pool: &Pool<Sqlite>, scan_id: &str) -> Result<Vec<(String, String)>> {
    let edges = sqlx::query_as::<_, (String, String)>(
        "SELECT director_id, company_number FROM graph_edges WHERE scan_id = ? ORDER BY director_id, company_number",
    )
    .bind(scan_id)
    .fetch_all(pool)
    .await?;
    Ok(edges)
}
