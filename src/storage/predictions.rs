//! Pre-fetch classification prediction adapter.
//!
//! One row per `(url_id, prediction_source)`. Rows are written at
//! discovery time and mutated exactly once more, when the fetched
//! content's classification verifies (or contradicts) the prediction.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::{now_ms, Storage};

/// Where a prediction came from, in decreasing order of confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionSource {
    LearnedPattern,
    SimilarUrl,
    DomainProfile,
    UrlSignals,
}

impl PredictionSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LearnedPattern => "learned_pattern",
            Self::SimilarUrl => "similar_url",
            Self::DomainProfile => "domain_profile",
            Self::UrlSignals => "url_signals",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoredPrediction {
    pub url_id: i64,
    pub predicted_classification: String,
    pub confidence: f64,
    pub prediction_source: String,
    pub pattern_matched: Option<String>,
    pub similar_url_id: Option<i64>,
    pub verified_classification: Option<String>,
    pub verification_match: Option<bool>,
}

impl Storage {
    /// Upsert a prediction for `(url, source)`.
    pub async fn upsert_prediction(
        &self,
        url_id: i64,
        classification: &str,
        confidence: f64,
        source: PredictionSource,
        pattern_matched: Option<&str>,
        similar_url_id: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO url_classifications
                (url_id, predicted_classification, confidence, prediction_source,
                 pattern_matched, similar_url_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url_id, prediction_source) DO UPDATE SET
                predicted_classification = excluded.predicted_classification,
                confidence = excluded.confidence,
                pattern_matched = excluded.pattern_matched,
                similar_url_id = excluded.similar_url_id
            "#,
        )
        .bind(url_id)
        .bind(classification)
        .bind(confidence)
        .bind(source.as_str())
        .bind(pattern_matched)
        .bind(similar_url_id)
        .bind(now_ms())
        .execute(self.writer())
        .await
        .context("Failed to upsert prediction")?;
        Ok(())
    }

    /// Mark every open prediction for a URL as verified against the
    /// content classification. Returns the matched pattern ids whose
    /// accuracy should be updated, paired with whether they were correct.
    pub async fn verify_predictions(
        &self,
        url_id: i64,
        verified_classification: &str,
    ) -> Result<Vec<(String, bool)>> {
        let open: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT prediction_source, predicted_classification
            FROM url_classifications
            WHERE url_id = ? AND verified_at IS NULL
            "#,
        )
        .bind(url_id)
        .fetch_all(self.readers())
        .await
        .context("Failed to list open predictions")?;

        sqlx::query(
            r#"
            UPDATE url_classifications
            SET verified_at = ?,
                verified_classification = ?,
                verification_match = (predicted_classification = ?)
            WHERE url_id = ? AND verified_at IS NULL
            "#,
        )
        .bind(now_ms())
        .bind(verified_classification)
        .bind(verified_classification)
        .bind(url_id)
        .execute(self.writer())
        .await
        .context("Failed to verify predictions")?;

        Ok(open
            .into_iter()
            .map(|(source, predicted)| (source, predicted == verified_classification))
            .collect())
    }

    /// Best (highest-confidence) stored prediction for a URL.
    pub async fn best_prediction(&self, url_id: i64) -> Result<Option<StoredPrediction>> {
        let row: Option<(
            i64,
            String,
            f64,
            String,
            Option<String>,
            Option<i64>,
            Option<String>,
            Option<i64>,
        )> = sqlx::query_as(
            r#"
            SELECT url_id, predicted_classification, confidence, prediction_source,
                   pattern_matched, similar_url_id, verified_classification, verification_match
            FROM url_classifications
            WHERE url_id = ?
            ORDER BY confidence DESC
            LIMIT 1
            "#,
        )
        .bind(url_id)
        .fetch_optional(self.readers())
        .await
        .context("Failed to fetch best prediction")?;

        Ok(row.map(
            |(
                url_id,
                predicted_classification,
                confidence,
                prediction_source,
                pattern_matched,
                similar_url_id,
                verified_classification,
                verification_match,
            )| StoredPrediction {
                url_id,
                predicted_classification,
                confidence,
                prediction_source,
                pattern_matched,
                similar_url_id,
                verified_classification,
                verification_match: verification_match.map(|v| v != 0),
            },
        ))
    }

    /// Verified URLs structurally usable as similar-URL references:
    /// every URL on the host with a verified prediction outcome.
    pub async fn verified_urls_for_host(&self, host: &str) -> Result<Vec<(i64, String, String)>> {
        let rows: Vec<(i64, String, String)> = sqlx::query_as(
            r#"
            SELECT u.id, u.normalized, uc.verified_classification
            FROM urls u
            JOIN url_classifications uc ON uc.url_id = u.id
            WHERE u.host = ?
              AND uc.verified_classification IS NOT NULL
            GROUP BY u.id
            "#,
        )
        .bind(host)
        .fetch_all(self.readers())
        .await
        .context("Failed to list verified URLs for host")?;
        Ok(rows)
    }
}
