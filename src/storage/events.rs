//! Task-event adapter: append-only writes, filtered reads.

use anyhow::{Context, Result};

use super::{empty_on_missing_column, Storage};
use crate::events::TaskEventRecord;

impl Storage {
    /// Append a batch of task events in one transaction.
    pub async fn insert_events(&self, events: &[TaskEventRecord]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .writer()
            .begin()
            .await
            .context("Failed to begin event batch")?;

        for event in events {
            sqlx::query(
                r#"
                INSERT INTO task_events
                    (task_id, event_type, severity, scope, target, payload_json,
                     duration_ms, http_status, item_count, emitted_at, seq)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&event.task_id)
            .bind(&event.event_type)
            .bind(&event.severity)
            .bind(&event.scope)
            .bind(&event.target)
            .bind(&event.payload_json)
            .bind(event.duration_ms)
            .bind(event.http_status.map(i64::from))
            .bind(event.item_count)
            .bind(event.emitted_at)
            .bind(event.seq)
            .execute(&mut *tx)
            .await
            .context("Failed to insert task event")?;
        }

        tx.commit().await.context("Failed to commit event batch")?;
        Ok(())
    }

    /// Events for a task, oldest first, ordered by timestamp with the
    /// per-writer sequence as tiebreaker.
    pub async fn events_for_task(
        &self,
        task_id: &str,
        event_type: Option<&str>,
        limit: i64,
    ) -> Result<Vec<TaskEventRecord>> {
        let rows: Vec<(
            String,
            String,
            String,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<i64>,
            Option<i64>,
            Option<i64>,
            i64,
            i64,
        )> = empty_on_missing_column(
            sqlx::query_as(
                r#"
                SELECT task_id, event_type, severity, scope, target, payload_json,
                       duration_ms, http_status, item_count, emitted_at, seq
                FROM task_events
                WHERE task_id = ?
                  AND (? IS NULL OR event_type = ?)
                ORDER BY emitted_at ASC, seq ASC
                LIMIT ?
                "#,
            )
            .bind(task_id)
            .bind(event_type)
            .bind(event_type)
            .bind(limit)
            .fetch_all(self.readers())
            .await,
        )
        .context("Failed to query task events")?;

        Ok(rows
            .into_iter()
            .map(
                |(
                    task_id,
                    event_type,
                    severity,
                    scope,
                    target,
                    payload_json,
                    duration_ms,
                    http_status,
                    item_count,
                    emitted_at,
                    seq,
                )| TaskEventRecord {
                    task_id,
                    event_type,
                    severity,
                    scope,
                    target,
                    payload_json,
                    duration_ms,
                    http_status: http_status.map(|s| s as u16),
                    item_count,
                    emitted_at,
                    seq,
                },
            )
            .collect())
    }

    /// Count events of a type emitted for a task (verification checks).
    pub async fn count_events(&self, task_id: &str, event_type: &str) -> Result<i64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM task_events WHERE task_id = ? AND event_type = ?")
                .bind(task_id)
                .bind(event_type)
                .fetch_one(self.readers())
                .await
                .context("Failed to count task events")?;
        Ok(row.0)
    }
}
