//! URL registry adapter.

use anyhow::{Context, Result};

use super::{now_ms, Storage};
use crate::util::urls::normalize_url;

/// A row from the `urls` table.
#[derive(Debug, Clone)]
pub struct UrlRow {
    pub id: i64,
    pub normalized: String,
    pub host: String,
    pub path: String,
    pub first_seen_at: i64,
}

impl Storage {
    /// Intern a URL, returning its id. Idempotent: an existing normalized
    /// form returns the original row's id and leaves `first_seen_at` alone.
    pub async fn intern_url(&self, raw_url: &str, host: &str) -> Result<i64> {
        let normalized = normalize_url(raw_url);
        if let Some(id) = self.cached_url_id(&normalized) {
            return Ok(id);
        }
        let path = url::Url::parse(&normalized)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| "/".to_string());

        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO urls (normalized, host, path, first_seen_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(normalized) DO UPDATE SET host = host
            RETURNING id
            "#,
        )
        .bind(&normalized)
        .bind(host)
        .bind(&path)
        .bind(now_ms())
        .fetch_one(self.writer())
        .await
        .context("Failed to intern URL")?;

        self.cache_url_id(&normalized, row.0);
        Ok(row.0)
    }

    /// Look up a URL id by its normalized form.
    pub async fn url_id(&self, raw_url: &str) -> Result<Option<i64>> {
        let normalized = normalize_url(raw_url);
        if let Some(id) = self.cached_url_id(&normalized) {
            return Ok(Some(id));
        }
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM urls WHERE normalized = ?")
            .bind(&normalized)
            .fetch_optional(self.readers())
            .await
            .context("Failed to look up URL id")?;
        if let Some((id,)) = row {
            self.cache_url_id(&normalized, id);
        }
        Ok(row.map(|(id,)| id))
    }

    /// Fetch a URL row by id.
    pub async fn url_by_id(&self, id: i64) -> Result<Option<UrlRow>> {
        let row: Option<(i64, String, String, String, i64)> = sqlx::query_as(
            "SELECT id, normalized, host, path, first_seen_at FROM urls WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.readers())
        .await
        .context("Failed to fetch URL row")?;

        Ok(row.map(|(id, normalized, host, path, first_seen_at)| UrlRow {
            id,
            normalized,
            host,
            path,
            first_seen_at,
        }))
    }

    /// All URLs for a host whose latest response was a verified download.
    /// Used by seed-from-cache replay.
    pub async fn cached_urls_for_host(&self, host: &str) -> Result<Vec<UrlRow>> {
        let rows: Vec<(i64, String, String, String, i64)> = sqlx::query_as(
            r#"
            SELECT DISTINCT u.id, u.normalized, u.host, u.path, u.first_seen_at
            FROM urls u
            JOIN http_responses r ON r.url_id = u.id
            WHERE u.host = ?
              AND r.http_status = 200
              AND r.bytes_downloaded > 0
              AND r.fetched_at IS NOT NULL
            ORDER BY u.id
            "#,
        )
        .bind(host)
        .fetch_all(self.readers())
        .await
        .context("Failed to list cached URLs for host")?;

        Ok(rows
            .into_iter()
            .map(|(id, normalized, host, path, first_seen_at)| UrlRow {
                id,
                normalized,
                host,
                path,
                first_seen_at,
            })
            .collect())
    }
}
