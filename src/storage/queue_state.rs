//! Durable queue-state adapter.
//!
//! The in-memory queue is authoritative during a run; this table makes
//! leases crash-safe and lets a restarted crawl resume where it stopped.
//! Lease acquisition is a single conditional UPDATE on the writer
//! connection, so two workers can never lease the same URL.

use anyhow::{Context, Result};

use super::{now_ms, Storage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Queued,
    Leased,
    Done,
    Skipped,
}

impl QueueState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Leased => "LEASED",
            Self::Done => "DONE",
            Self::Skipped => "SKIPPED",
        }
    }
}

impl Storage {
    /// Enqueue a URL (or re-prioritize an existing QUEUED entry).
    pub async fn enqueue_url(&self, url_id: i64, priority: f64, ready_after_ms: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO queue_entries (url_id, priority, enqueued_at, ready_after, state)
            VALUES (?, ?, ?, ?, 'QUEUED')
            ON CONFLICT(url_id) DO UPDATE SET
                priority = MAX(priority, excluded.priority),
                ready_after = excluded.ready_after
            WHERE state = 'QUEUED'
            "#,
        )
        .bind(url_id)
        .bind(priority)
        .bind(now_ms())
        .bind(ready_after_ms)
        .execute(self.writer())
        .await
        .context("Failed to enqueue URL")?;
        Ok(())
    }

    /// Conditionally lease a specific entry. Returns false when the
    /// entry is not currently QUEUED (someone else holds it or it is
    /// finished); the caller must skip the item.
    pub async fn mark_leased(&self, url_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE queue_entries SET state = 'LEASED' WHERE url_id = ? AND state = 'QUEUED'",
        )
        .bind(url_id)
        .execute(self.writer())
        .await
        .context("Failed to mark lease")?;
        Ok(result.rows_affected() > 0)
    }

    /// Atomically lease the best ready entry. Returns the leased url_id.
    pub async fn lease_next(&self) -> Result<Option<i64>> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE queue_entries
            SET state = 'LEASED'
            WHERE url_id = (
                SELECT url_id FROM queue_entries
                WHERE state = 'QUEUED' AND ready_after <= ?
                ORDER BY priority DESC, enqueued_at ASC
                LIMIT 1
            )
            RETURNING url_id
            "#,
        )
        .bind(now_ms())
        .fetch_optional(self.writer())
        .await
        .context("Failed to lease queue entry")?;
        Ok(row.map(|(id,)| id))
    }

    /// Terminal transition for a leased entry.
    pub async fn complete_lease(&self, url_id: i64, state: QueueState) -> Result<()> {
        debug_assert!(matches!(state, QueueState::Done | QueueState::Skipped));
        sqlx::query("UPDATE queue_entries SET state = ? WHERE url_id = ? AND state = 'LEASED'")
            .bind(state.as_str())
            .bind(url_id)
            .execute(self.writer())
            .await
            .context("Failed to complete lease")?;
        Ok(())
    }

    /// Return a leased entry to QUEUED (breaker deferral), optionally
    /// pushing its ready time into the future.
    pub async fn release_lease(&self, url_id: i64, ready_after_ms: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE queue_entries
            SET state = 'QUEUED', ready_after = ?
            WHERE url_id = ? AND state = 'LEASED'
            "#,
        )
        .bind(ready_after_ms)
        .bind(url_id)
        .execute(self.writer())
        .await
        .context("Failed to release lease")?;
        Ok(())
    }

    /// Recover leases abandoned by a crashed run. Called at startup.
    pub async fn recover_stale_leases(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE queue_entries SET state = 'QUEUED' WHERE state = 'LEASED'")
            .execute(self.writer())
            .await
            .context("Failed to recover stale leases")?;
        Ok(result.rows_affected())
    }

    /// Pending-queue depth for one host.
    pub async fn queue_depth_for_host(&self, host: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM queue_entries q
            JOIN urls u ON u.id = q.url_id
            WHERE u.host = ? AND q.state = 'QUEUED'
            "#,
        )
        .bind(host)
        .fetch_one(self.readers())
        .await
        .context("Failed to count host queue depth")?;
        Ok(row.0)
    }

    /// Total pending-queue depth.
    pub async fn queue_depth(&self) -> Result<i64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM queue_entries WHERE state = 'QUEUED'")
                .fetch_one(self.readers())
                .await
                .context("Failed to count queue depth")?;
        Ok(row.0)
    }
}
