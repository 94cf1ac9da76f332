//! Download-statistics rollups backing the CLI reports and the
//! read-only control surface. SELECT-only; every figure here reduces to
//! counting `http_responses` rows, never in-memory counters.

use anyhow::{Context, Result};
use serde::Serialize;

use super::{empty_on_missing_column, Storage};

/// Global download statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DownloadStats {
    pub verified_downloads: i64,
    pub failed_attempts: i64,
    pub bytes_downloaded: i64,
    pub distinct_urls: i64,
    pub distinct_hosts: i64,
}

/// Per-host verified-download count.
#[derive(Debug, Clone, Serialize)]
pub struct HostDownloadCount {
    pub host: String,
    pub verified: i64,
    pub bytes: i64,
}

/// Time-bounded statistics for a `[start, end]` window.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WindowStats {
    pub verified: i64,
    pub failed: i64,
    pub bytes: i64,
}

impl Storage {
    /// Global download stats across the whole store.
    pub async fn download_stats(&self) -> Result<DownloadStats> {
        let row: (i64, i64, i64, i64, i64) = empty_on_missing_column(
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(CASE WHEN http_status = 200 AND bytes_downloaded > 0
                               AND fetched_at IS NOT NULL THEN 1 END),
                    COUNT(CASE WHEN http_status != 200 OR bytes_downloaded = 0 THEN 1 END),
                    COALESCE(SUM(CASE WHEN http_status = 200 THEN bytes_downloaded ELSE 0 END), 0),
                    COUNT(DISTINCT url_id),
                    (SELECT COUNT(DISTINCT host) FROM urls)
                FROM http_responses
                "#,
            )
            .fetch_one(self.readers())
            .await
            .map(|r: (i64, i64, i64, i64, i64)| r),
        )
        .context("Failed to compute download stats")?;

        Ok(DownloadStats {
            verified_downloads: row.0,
            failed_attempts: row.1,
            bytes_downloaded: row.2,
            distinct_urls: row.3,
            distinct_hosts: row.4,
        })
    }

    /// Verified/failed/bytes inside a time window (unix ms bounds).
    pub async fn window_stats(&self, start_ms: i64, end_ms: i64) -> Result<WindowStats> {
        let row: (i64, i64, i64) = empty_on_missing_column(
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(CASE WHEN http_status = 200 AND bytes_downloaded > 0
                               AND fetched_at IS NOT NULL THEN 1 END),
                    COUNT(CASE WHEN http_status != 200 OR bytes_downloaded = 0 THEN 1 END),
                    COALESCE(SUM(CASE WHEN http_status = 200 THEN bytes_downloaded ELSE 0 END), 0)
                FROM http_responses
                WHERE fetched_at >= ? AND fetched_at <= ?
                "#,
            )
            .bind(start_ms)
            .bind(end_ms)
            .fetch_one(self.readers())
            .await
            .map(|r: (i64, i64, i64)| r),
        )
        .context("Failed to compute window stats")?;

        Ok(WindowStats {
            verified: row.0,
            failed: row.1,
            bytes: row.2,
        })
    }

    /// Per-host verified-download counts, optionally filtered to hosts
    /// at or above a threshold.
    pub async fn verified_counts_by_host(&self, threshold: i64) -> Result<Vec<HostDownloadCount>> {
        let rows: Vec<(String, i64, i64)> = empty_on_missing_column(
            sqlx::query_as(
                r#"
                SELECT u.host,
                       COUNT(*),
                       COALESCE(SUM(r.bytes_downloaded), 0)
                FROM http_responses r
                JOIN urls u ON u.id = r.url_id
                WHERE r.http_status = 200
                  AND r.bytes_downloaded > 0
                  AND r.fetched_at IS NOT NULL
                GROUP BY u.host
                HAVING COUNT(*) >= ?
                ORDER BY COUNT(*) DESC
                "#,
            )
            .bind(threshold)
            .fetch_all(self.readers())
            .await,
        )
        .context("Failed to compute per-host counts")?;

        Ok(rows
            .into_iter()
            .map(|(host, verified, bytes)| HostDownloadCount {
                host,
                verified,
                bytes,
            })
            .collect())
    }

    /// Hub-archive coverage: verified hubs per host with depth figures.
    pub async fn hub_archive_stats(&self) -> Result<Vec<(String, i64, i64, Option<i64>)>> {
        let rows: Vec<(String, i64, i64, Option<i64>)> = empty_on_missing_column(
            sqlx::query_as(
                r#"
                SELECT host,
                       COUNT(*),
                       COUNT(CASE WHEN max_page_depth IS NOT NULL THEN 1 END),
                       MAX(max_page_depth)
                FROM place_page_mappings
                WHERE status = 'verified' AND presence = 'present'
                GROUP BY host
                ORDER BY COUNT(*) DESC
                "#,
            )
            .fetch_all(self.readers())
            .await,
        )
        .context("Failed to compute hub archive stats")?;
        Ok(rows)
    }
}
