//! SQLite-backed crawl store.
//!
//! All reads and writes are brokered through the named adapter functions
//! on [`Storage`]; upper layers never issue ad-hoc queries. Writes go
//! through a single-connection writer pool, so insert order is total and
//! the atomic response+body pair of the evidence contract is a plain
//! transaction. Readers run concurrently against a separate pool (WAL).
//!
//! `http_responses`, `content_storage` and `task_events` are append-only.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::SqlitePool;

pub mod analysis;
pub mod events;
pub mod mappings;
pub mod predictions;
pub mod queue_state;
pub mod responses;
pub mod schema;
pub mod stats;
pub mod urls;

pub use analysis::StoredAnalysis;
pub use mappings::{HubMapping, MappingStatus, PageKind, PatternRow, Presence};
pub use predictions::{PredictionSource, StoredPrediction};
pub use queue_state::QueueState;
pub use responses::{ResponseRecord, StoredBody};
pub use stats::{DownloadStats, HostDownloadCount, WindowStats};

/// Handle to the crawl store.
///
/// Cheap to clone; both pools are internally reference-counted. The
/// URL-id cache serves the fetch pipeline's cache tie-break, which hits
/// the same normalized URLs over and over.
#[derive(Clone)]
pub struct Storage {
    writer: SqlitePool,
    readers: SqlitePool,
    url_id_cache: std::sync::Arc<parking_lot::Mutex<lru::LruCache<String, i64>>>,
}

fn new_url_id_cache() -> std::sync::Arc<parking_lot::Mutex<lru::LruCache<String, i64>>> {
    std::sync::Arc::new(parking_lot::Mutex::new(lru::LruCache::new(
        std::num::NonZeroUsize::new(4096).expect("nonzero cache size"),
    )))
}

impl Storage {
    /// Open (or create) the store at `db_path` and apply migrations.
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create store directory")?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        // Single writer connection: all INSERT/UPDATE serialize here.
        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options.clone())
            .await
            .context("Failed to open SQLite store (writer)")?;

        let readers = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .context("Failed to open SQLite store (readers)")?;

        sqlx::query(schema::SCHEMA_SQL)
            .execute(&writer)
            .await
            .context("Failed to apply base schema")?;

        for migration in schema::MIGRATIONS {
            sqlx::query(migration)
                .execute(&writer)
                .await
                .context("Failed to apply migration")?;
        }

        Ok(Self {
            writer,
            readers,
            url_id_cache: new_url_id_cache(),
        })
    }

    /// In-memory store for tests.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .shared_cache(true);

        // In-memory databases are per-connection; a single pool with one
        // connection serves both roles in tests.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to open in-memory store")?;

        sqlx::query(schema::SCHEMA_SQL).execute(&pool).await?;
        for migration in schema::MIGRATIONS {
            sqlx::query(migration).execute(&pool).await?;
        }

        Ok(Self {
            writer: pool.clone(),
            readers: pool,
            url_id_cache: new_url_id_cache(),
        })
    }

    pub(crate) fn writer(&self) -> &SqlitePool {
        &self.writer
    }

    pub(crate) fn readers(&self) -> &SqlitePool {
        &self.readers
    }

    pub(crate) fn cache_url_id(&self, normalized: &str, id: i64) {
        self.url_id_cache
            .lock()
            .put(normalized.to_string(), id);
    }

    pub(crate) fn cached_url_id(&self, normalized: &str) -> Option<i64> {
        self.url_id_cache.lock().get(normalized).copied()
    }

    /// Close both pools. Outstanding queries complete first.
    pub async fn close(&self) {
        self.writer.close().await;
        self.readers.close().await;
    }
}

/// Map "legacy column absent" shape errors to an empty result.
///
/// Adapters backing the read-only control surface must keep working
/// against stores created by older builds; a missing column yields an
/// empty result set rather than an error.
pub(crate) fn empty_on_missing_column<T: Default>(
    result: std::result::Result<T, sqlx::Error>,
) -> std::result::Result<T, sqlx::Error> {
    match result {
        Err(sqlx::Error::ColumnNotFound(_)) => Ok(T::default()),
        Err(sqlx::Error::Database(e)) if e.message().contains("no such column") => Ok(T::default()),
        other => other,
    }
}

/// Current time as unix milliseconds, the store's timestamp encoding.
#[must_use]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
