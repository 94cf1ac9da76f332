//! Hub mapping and URL-pattern adapters.
//!
//! Lifecycle: candidate → pending → verified(present | absent). A
//! mapping may only claim `presence = present` once it is verified, and
//! verification always leaves an event in the task-event stream.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::{now_ms, Storage};

/// Kind of hub page a mapping points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageKind {
    CountryHub,
    PlaceHub,
    TopicHub,
    SectionHub,
}

impl PageKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CountryHub => "country-hub",
            Self::PlaceHub => "place-hub",
            Self::TopicHub => "topic-hub",
            Self::SectionHub => "section-hub",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "country-hub" => Some(Self::CountryHub),
            "place-hub" => Some(Self::PlaceHub),
            "topic-hub" => Some(Self::TopicHub),
            "section-hub" => Some(Self::SectionHub),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingStatus {
    Candidate,
    Pending,
    Verified,
}

impl MappingStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Candidate => "candidate",
            Self::Pending => "pending",
            Self::Verified => "verified",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Present,
    Absent,
}

impl Presence {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
        }
    }
}

/// A `site_url_patterns` row.
#[derive(Debug, Clone, Serialize)]
pub struct PatternRow {
    pub id: i64,
    pub template: String,
    pub classification: String,
    pub sample_count: i64,
    pub verified_count: i64,
    pub accuracy: f64,
    pub last_verified_at: Option<i64>,
}

/// A `place_page_mappings` row.
#[derive(Debug, Clone, Serialize)]
pub struct HubMapping {
    pub id: i64,
    pub place_id: i64,
    pub host: String,
    pub url: String,
    pub page_kind: String,
    pub status: String,
    pub presence: Option<String>,
    pub pattern_id: Option<i64>,
    pub confidence: f64,
    pub max_page_depth: Option<i64>,
    pub oldest_content_date: Option<i64>,
    pub last_depth_check_at: Option<i64>,
    pub depth_check_error: Option<String>,
    pub verified_at: Option<i64>,
}

type MappingRow = (
    i64,
    i64,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<i64>,
    f64,
    Option<i64>,
    Option<i64>,
    Option<i64>,
    Option<String>,
    Option<i64>,
);

fn row_to_mapping(row: MappingRow) -> HubMapping {
    let (
        id,
        place_id,
        host,
        url,
        page_kind,
        status,
        presence,
        pattern_id,
        confidence,
        max_page_depth,
        oldest_content_date,
        last_depth_check_at,
        depth_check_error,
        verified_at,
    ) = row;
    HubMapping {
        id,
        place_id,
        host,
        url,
        page_kind,
        status,
        presence,
        pattern_id,
        confidence,
        max_page_depth,
        oldest_content_date,
        last_depth_check_at,
        depth_check_error,
        verified_at,
    }
}

const MAPPING_COLUMNS: &str = "id, place_id, host, url, page_kind, status, presence, pattern_id, \
     confidence, max_page_depth, oldest_content_date, last_depth_check_at, \
     depth_check_error, verified_at";

impl Storage {
    /// Insert a candidate mapping. Re-seeding the same (place, host, url)
    /// is a no-op so the hub seeder is idempotent.
    pub async fn insert_candidate_mapping(
        &self,
        place_id: i64,
        host: &str,
        url: &str,
        page_kind: PageKind,
        pattern_id: Option<i64>,
        confidence: f64,
    ) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO place_page_mappings (place_id, host, url, page_kind, status, pattern_id, confidence)
            VALUES (?, ?, ?, ?, 'candidate', ?, ?)
            ON CONFLICT(place_id, host, url) DO UPDATE SET confidence = MAX(confidence, excluded.confidence)
            RETURNING id
            "#,
        )
        .bind(place_id)
        .bind(host)
        .bind(url)
        .bind(page_kind.as_str())
        .bind(pattern_id)
        .bind(confidence)
        .fetch_one(self.writer())
        .await
        .context("Failed to insert candidate mapping")?;
        Ok(row.0)
    }

    /// Move a mapping to `pending` while a probe is in flight.
    pub async fn mark_mapping_pending(&self, mapping_id: i64) -> Result<()> {
        sqlx::query("UPDATE place_page_mappings SET status = 'pending' WHERE id = ?")
            .bind(mapping_id)
            .execute(self.writer())
            .await
            .context("Failed to mark mapping pending")?;
        Ok(())
    }

    /// Verify a mapping as present or absent.
    pub async fn verify_mapping(&self, mapping_id: i64, presence: Presence) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE place_page_mappings
            SET status = 'verified', presence = ?, verified_at = ?
            WHERE id = ?
            "#,
        )
        .bind(presence.as_str())
        .bind(now_ms())
        .bind(mapping_id)
        .execute(self.writer())
        .await
        .context("Failed to verify mapping")?;
        Ok(())
    }

    /// Record the outcome of a depth probe.
    pub async fn record_depth_result(
        &self,
        mapping_id: i64,
        max_page_depth: Option<i64>,
        oldest_content_date: Option<i64>,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE place_page_mappings
            SET max_page_depth = ?,
                oldest_content_date = ?,
                last_depth_check_at = ?,
                depth_check_error = ?
            WHERE id = ?
            "#,
        )
        .bind(max_page_depth)
        .bind(oldest_content_date)
        .bind(now_ms())
        .bind(error)
        .bind(mapping_id)
        .execute(self.writer())
        .await
        .context("Failed to record depth result")?;
        Ok(())
    }

    /// Verified-present hubs, optionally restricted to a host.
    pub async fn verified_hubs(&self, host: Option<&str>, limit: i64) -> Result<Vec<HubMapping>> {
        let rows: Vec<MappingRow> = sqlx::query_as(&format!(
            r#"
            SELECT {MAPPING_COLUMNS}
            FROM place_page_mappings
            WHERE status = 'verified' AND presence = 'present'
              AND (? IS NULL OR host = ?)
            ORDER BY host, url
            LIMIT ?
            "#
        ))
        .bind(host)
        .bind(host)
        .bind(limit)
        .fetch_all(self.readers())
        .await
        .context("Failed to list verified hubs")?;

        Ok(rows.into_iter().map(row_to_mapping).collect())
    }

    /// Candidate mappings awaiting probing.
    pub async fn candidate_mappings(&self, limit: i64) -> Result<Vec<HubMapping>> {
        let rows: Vec<MappingRow> = sqlx::query_as(&format!(
            r#"
            SELECT {MAPPING_COLUMNS}
            FROM place_page_mappings
            WHERE status = 'candidate'
            ORDER BY confidence DESC
            LIMIT ?
            "#
        ))
        .bind(limit)
        .fetch_all(self.readers())
        .await
        .context("Failed to list candidate mappings")?;

        Ok(rows.into_iter().map(row_to_mapping).collect())
    }

    pub async fn mapping_by_id(&self, id: i64) -> Result<Option<HubMapping>> {
        let row: Option<MappingRow> = sqlx::query_as(&format!(
            "SELECT {MAPPING_COLUMNS} FROM place_page_mappings WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.readers())
        .await
        .context("Failed to fetch mapping")?;
        Ok(row.map(row_to_mapping))
    }

    // --- Learned URL patterns ---

    /// Upsert a learned pattern; counts and accuracy are replaced, not
    /// accumulated, so re-running the learner on the same data is
    /// idempotent.
    pub async fn upsert_pattern(
        &self,
        host: &str,
        template: &str,
        classification: &str,
        sample_count: i64,
        verified_count: i64,
        accuracy: f64,
    ) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO site_url_patterns
                (host, template, classification, sample_count, verified_count, accuracy, last_verified_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(host, template) DO UPDATE SET
                classification = excluded.classification,
                sample_count = excluded.sample_count,
                verified_count = excluded.verified_count,
                accuracy = excluded.accuracy,
                last_verified_at = excluded.last_verified_at
            RETURNING id
            "#,
        )
        .bind(host)
        .bind(template)
        .bind(classification)
        .bind(sample_count)
        .bind(verified_count)
        .bind(accuracy)
        .bind(now_ms())
        .fetch_one(self.writer())
        .await
        .context("Failed to upsert pattern")?;
        Ok(row.0)
    }

    /// Patterns for a host, highest accuracy first.
    pub async fn patterns_for_host(&self, host: &str) -> Result<Vec<PatternRow>> {
        let rows: Vec<(i64, String, String, i64, i64, f64, Option<i64>)> = sqlx::query_as(
            r#"
            SELECT id, template, classification, sample_count, verified_count, accuracy, last_verified_at
            FROM site_url_patterns
            WHERE host = ?
            ORDER BY accuracy DESC, sample_count DESC
            "#,
        )
        .bind(host)
        .fetch_all(self.readers())
        .await
        .context("Failed to list patterns")?;
        Ok(rows
            .into_iter()
            .map(
                |(id, template, classification, sample_count, verified_count, accuracy, last_verified_at)| {
                    PatternRow {
                        id,
                        template,
                        classification,
                        sample_count,
                        verified_count,
                        accuracy,
                        last_verified_at,
                    }
                },
            )
            .collect())
    }

    /// Fold one verification outcome into a pattern's accuracy.
    pub async fn record_pattern_verification(&self, pattern_id: i64, correct: bool) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE site_url_patterns
            SET verified_count = verified_count + 1,
                accuracy = (accuracy * verified_count + ?) / (verified_count + 1),
                last_verified_at = ?
            WHERE id = ?
            "#,
        )
        .bind(if correct { 1.0 } else { 0.0 })
        .bind(now_ms())
        .bind(pattern_id)
        .execute(self.writer())
        .await
        .context("Failed to record pattern verification")?;
        Ok(())
    }
}
