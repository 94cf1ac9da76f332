//! Response and body adapters: the evidence contract lives here.
//!
//! "Downloaded" may be claimed only when an `http_responses` row exists
//! with status 200, non-zero bytes and a fetch timestamp. The pair
//! (response row, body row) is written in one transaction so a crash can
//! never leave a claimed download without its body or vice versa.

use std::io::{Read, Write};

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::{now_ms, Storage};

/// Bodies below this size are stored uncompressed.
const COMPRESSION_FLOOR_BYTES: usize = 512;

/// A new network attempt, success or failure.
#[derive(Debug, Clone)]
pub struct ResponseRecord {
    pub url_id: i64,
    pub http_status: u16,
    pub bytes_downloaded: u64,
    pub content_type: Option<String>,
    pub ttfb_ms: Option<i64>,
    pub download_ms: Option<i64>,
    /// `network` or `headless`. Cache hits never reach this adapter.
    pub fetch_source: String,
    /// Best-effort diagnostic for failed attempts.
    pub diagnostic: Option<String>,
}

/// A stored body read back for cache replay or re-classification.
#[derive(Debug, Clone)]
pub struct StoredBody {
    pub response_id: i64,
    pub content_id: i64,
    pub fetched_at: i64,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

fn compress_body(body: &[u8]) -> Result<(Vec<u8>, &'static str)> {
    if body.len() < COMPRESSION_FLOOR_BYTES {
        return Ok((body.to_vec(), "none"));
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(3));
    encoder.write_all(body).context("gzip write failed")?;
    let compressed = encoder.finish().context("gzip finish failed")?;
    Ok((compressed, "gzip"))
}

fn decompress_body(stored: &[u8], kind: &str) -> Result<Vec<u8>> {
    match kind {
        "none" => Ok(stored.to_vec()),
        "gzip" => {
            let mut decoder = GzDecoder::new(stored);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .context("gzip decode failed")?;
            Ok(out)
        }
        other => anyhow::bail!("unknown compression kind: {other}"),
    }
}

impl Storage {
    /// Append one response row for a failed or bodyless attempt.
    ///
    /// Exactly one row per network attempt; callers must not invoke this
    /// for cache hits or intentional skips.
    pub async fn record_response(&self, record: &ResponseRecord) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO http_responses
                (url_id, http_status, bytes_downloaded, content_type,
                 ttfb_ms, download_ms, fetched_at, fetch_source, diagnostic)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(record.url_id)
        .bind(i64::from(record.http_status))
        .bind(record.bytes_downloaded as i64)
        .bind(&record.content_type)
        .bind(record.ttfb_ms)
        .bind(record.download_ms)
        .bind(now_ms())
        .bind(&record.fetch_source)
        .bind(&record.diagnostic)
        .fetch_one(self.writer())
        .await
        .context("Failed to record response")?;

        Ok(row.0)
    }

    /// Append a successful response together with its stored body, in a
    /// single transaction. Returns `(response_id, content_id)`.
    pub async fn record_response_with_body(
        &self,
        record: &ResponseRecord,
        body: &[u8],
    ) -> Result<(i64, i64)> {
        let (stored, kind) = compress_body(body)?;
        let body_hash = format!("{:x}", xxhash_rust::xxh3::xxh3_64(body));

        let mut tx = self
            .writer()
            .begin()
            .await
            .context("Failed to begin response transaction")?;

        let response_row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO http_responses
                (url_id, http_status, bytes_downloaded, content_type,
                 ttfb_ms, download_ms, fetched_at, fetch_source, diagnostic)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL)
            RETURNING id
            "#,
        )
        .bind(record.url_id)
        .bind(i64::from(record.http_status))
        .bind(body.len() as i64)
        .bind(&record.content_type)
        .bind(record.ttfb_ms)
        .bind(record.download_ms)
        .bind(now_ms())
        .bind(&record.fetch_source)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to insert response row")?;

        let content_row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO content_storage (http_response_id, body, compression_kind, body_hash)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(response_row.0)
        .bind(&stored)
        .bind(kind)
        .bind(&body_hash)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to insert content row")?;

        tx.commit()
            .await
            .context("Failed to commit response transaction")?;

        Ok((response_row.0, content_row.0))
    }

    /// Timestamp of the most recent verified download for a URL, if any.
    pub async fn latest_verified_fetch(&self, url_id: i64) -> Result<Option<(i64, i64)>> {
        let row: Option<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT id, fetched_at FROM http_responses
            WHERE url_id = ?
              AND http_status = 200
              AND bytes_downloaded > 0
              AND fetched_at IS NOT NULL
            ORDER BY fetched_at DESC
            LIMIT 1
            "#,
        )
        .bind(url_id)
        .fetch_optional(self.readers())
        .await
        .context("Failed to query latest verified fetch")?;
        Ok(row)
    }

    /// Read back the most recently stored body for a URL, decompressed.
    pub async fn cached_body(&self, url_id: i64) -> Result<Option<StoredBody>> {
        let row: Option<(i64, i64, i64, Option<String>, Vec<u8>, String)> = sqlx::query_as(
            r#"
            SELECT r.id, c.id, r.fetched_at, r.content_type, c.body, c.compression_kind
            FROM http_responses r
            JOIN content_storage c ON c.http_response_id = r.id
            WHERE r.url_id = ? AND r.fetched_at IS NOT NULL
            ORDER BY r.fetched_at DESC
            LIMIT 1
            "#,
        )
        .bind(url_id)
        .fetch_optional(self.readers())
        .await
        .context("Failed to read cached body")?;

        match row {
            None => Ok(None),
            Some((response_id, content_id, fetched_at, content_type, stored, kind)) => {
                let body = decompress_body(&stored, &kind)?;
                Ok(Some(StoredBody {
                    response_id,
                    content_id,
                    fetched_at,
                    content_type,
                    body,
                }))
            }
        }
    }

    /// Count of verified downloads, optionally bounded to a window.
    /// This is the query every "downloaded N pages" claim must reduce to.
    pub async fn count_verified(&self, start_ms: Option<i64>, end_ms: Option<i64>) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM http_responses
            WHERE http_status = 200
              AND bytes_downloaded > 0
              AND fetched_at IS NOT NULL
              AND fetched_at >= COALESCE(?, -9223372036854775808)
              AND fetched_at <= COALESCE(?, 9223372036854775807)
            "#,
        )
        .bind(start_ms)
        .bind(end_ms)
        .fetch_one(self.readers())
        .await
        .context("Failed to count verified downloads")?;
        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_bodies_stay_uncompressed() {
        let (stored, kind) = compress_body(b"tiny").unwrap();
        assert_eq!(kind, "none");
        assert_eq!(stored, b"tiny");
    }

    #[test]
    fn test_large_bodies_round_trip_gzip() {
        let body = vec![b'a'; 4096];
        let (stored, kind) = compress_body(&body).unwrap();
        assert_eq!(kind, "gzip");
        assert!(stored.len() < body.len());
        assert_eq!(decompress_body(&stored, kind).unwrap(), body);
    }
}
