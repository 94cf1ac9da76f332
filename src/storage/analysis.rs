//! Content-analysis adapter: latest-wins per stored body.

use anyhow::{Context, Result};

use super::{now_ms, Storage};

#[derive(Debug, Clone)]
pub struct StoredAnalysis {
    pub content_id: i64,
    pub classification: String,
    pub confidence: f64,
    pub signals_json: String,
    pub analyzed_at: i64,
}

impl Storage {
    /// Record (or re-record) the classification of a stored body.
    pub async fn upsert_analysis(
        &self,
        content_id: i64,
        classification: &str,
        confidence: f64,
        signals_json: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO content_analysis (content_id, classification, confidence, signals_json, analyzed_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(content_id) DO UPDATE SET
                classification = excluded.classification,
                confidence = excluded.confidence,
                signals_json = excluded.signals_json,
                analyzed_at = excluded.analyzed_at
            "#,
        )
        .bind(content_id)
        .bind(classification)
        .bind(confidence)
        .bind(signals_json)
        .bind(now_ms())
        .execute(self.writer())
        .await
        .context("Failed to upsert content analysis")?;
        Ok(())
    }

    /// Latest analysis for a stored body, if any.
    pub async fn analysis_for_content(&self, content_id: i64) -> Result<Option<StoredAnalysis>> {
        let row: Option<(i64, String, f64, String, i64)> = sqlx::query_as(
            r#"
            SELECT content_id, classification, confidence, signals_json, analyzed_at
            FROM content_analysis WHERE content_id = ?
            "#,
        )
        .bind(content_id)
        .fetch_optional(self.readers())
        .await
        .context("Failed to fetch content analysis")?;

        Ok(row.map(
            |(content_id, classification, confidence, signals_json, analyzed_at)| StoredAnalysis {
                content_id,
                classification,
                confidence,
                signals_json,
                analyzed_at,
            },
        ))
    }

    /// URLs on a host with a verified content classification, newest
    /// analysis per URL. Feeds the pattern learner.
    pub async fn verified_classifications_for_host(
        &self,
        host: &str,
    ) -> Result<Vec<(i64, String, String)>> {
        let rows: Vec<(i64, String, String)> = sqlx::query_as(
            r#"
            SELECT u.id, u.normalized, a.classification
            FROM urls u
            JOIN http_responses r ON r.url_id = u.id
            JOIN content_storage c ON c.http_response_id = r.id
            JOIN content_analysis a ON a.content_id = c.id
            WHERE u.host = ?
            GROUP BY u.id
            HAVING a.analyzed_at = MAX(a.analyzed_at)
            "#,
        )
        .bind(host)
        .fetch_all(self.readers())
        .await
        .context("Failed to list verified classifications")?;
        Ok(rows)
    }
}
