//! Embedded schema, applied forward-only at open.
//!
//! Every statement is idempotent (`CREATE TABLE IF NOT EXISTS`,
//! `CREATE INDEX IF NOT EXISTS`), so re-running the full script on an
//! existing store is a no-op. Additive migrations append new guarded
//! statements to `MIGRATIONS`; statements are never edited in place.

/// Base schema for the crawl store.
pub const SCHEMA_SQL: &str = r#"
-- Canonical URL registry. Immutable after creation; unique on the
-- normalized form so dedupe is a constraint, not a convention.
CREATE TABLE IF NOT EXISTS urls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    normalized TEXT NOT NULL UNIQUE,
    host TEXT NOT NULL,
    path TEXT NOT NULL,
    first_seen_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_urls_host ON urls(host);

-- One row per network attempt, success or failure. Append-only.
-- Cache hits never create rows here; that is the evidence contract.
CREATE TABLE IF NOT EXISTS http_responses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url_id INTEGER NOT NULL REFERENCES urls(id),
    http_status INTEGER NOT NULL,
    bytes_downloaded INTEGER NOT NULL DEFAULT 0,
    content_type TEXT,
    ttfb_ms INTEGER,
    download_ms INTEGER,
    fetched_at INTEGER,
    fetch_source TEXT NOT NULL DEFAULT 'network',
    diagnostic TEXT
);

CREATE INDEX IF NOT EXISTS idx_responses_url ON http_responses(url_id);
CREATE INDEX IF NOT EXISTS idx_responses_fetched_at ON http_responses(fetched_at);

-- Stored page bodies, 1-1 with a successful response. Append-only.
CREATE TABLE IF NOT EXISTS content_storage (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    http_response_id INTEGER NOT NULL UNIQUE REFERENCES http_responses(id),
    body BLOB NOT NULL,
    compression_kind TEXT NOT NULL,
    body_hash TEXT NOT NULL
);

-- Latest-wins classification per stored body.
CREATE TABLE IF NOT EXISTS content_analysis (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content_id INTEGER NOT NULL UNIQUE REFERENCES content_storage(id),
    classification TEXT NOT NULL,
    confidence REAL NOT NULL,
    signals_json TEXT NOT NULL,
    analyzed_at INTEGER NOT NULL
);

-- Durable queue state. Mutated only by the queue manager.
CREATE TABLE IF NOT EXISTS queue_entries (
    url_id INTEGER PRIMARY KEY REFERENCES urls(id),
    priority REAL NOT NULL,
    enqueued_at INTEGER NOT NULL,
    ready_after INTEGER NOT NULL DEFAULT 0,
    state TEXT NOT NULL DEFAULT 'QUEUED'
        CHECK (state IN ('QUEUED', 'LEASED', 'DONE', 'SKIPPED'))
);

CREATE INDEX IF NOT EXISTS idx_queue_state ON queue_entries(state, priority);

-- Learned per-host URL templates, e.g. "/world/{place}".
CREATE TABLE IF NOT EXISTS site_url_patterns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    host TEXT NOT NULL,
    template TEXT NOT NULL,
    classification TEXT NOT NULL DEFAULT 'unknown',
    sample_count INTEGER NOT NULL DEFAULT 0,
    verified_count INTEGER NOT NULL DEFAULT 0,
    accuracy REAL NOT NULL DEFAULT 0.0,
    last_verified_at INTEGER,
    UNIQUE(host, template)
);

-- Hub candidates and their verification lifecycle.
CREATE TABLE IF NOT EXISTS place_page_mappings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    place_id INTEGER NOT NULL,
    host TEXT NOT NULL,
    url TEXT NOT NULL,
    page_kind TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'candidate'
        CHECK (status IN ('candidate', 'pending', 'verified')),
    presence TEXT
        CHECK (presence IN ('present', 'absent')),
    pattern_id INTEGER REFERENCES site_url_patterns(id),
    confidence REAL NOT NULL DEFAULT 0.0,
    max_page_depth INTEGER,
    oldest_content_date INTEGER,
    last_depth_check_at INTEGER,
    depth_check_error TEXT,
    verified_at INTEGER,
    UNIQUE(place_id, host, url)
);

CREATE INDEX IF NOT EXISTS idx_mappings_host ON place_page_mappings(host);
CREATE INDEX IF NOT EXISTS idx_mappings_status ON place_page_mappings(status);

-- Pre-fetch classification predictions, one row per (url, source).
CREATE TABLE IF NOT EXISTS url_classifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url_id INTEGER NOT NULL REFERENCES urls(id),
    predicted_classification TEXT NOT NULL,
    confidence REAL NOT NULL,
    prediction_source TEXT NOT NULL
        CHECK (prediction_source IN ('learned_pattern', 'similar_url', 'domain_profile', 'url_signals')),
    pattern_matched TEXT,
    similar_url_id INTEGER REFERENCES urls(id),
    created_at INTEGER NOT NULL,
    verified_at INTEGER,
    verified_classification TEXT,
    verification_match INTEGER,
    UNIQUE(url_id, prediction_source)
);

-- Append-only observability stream. Never evidence; http_responses is.
CREATE TABLE IF NOT EXISTS task_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    severity TEXT NOT NULL DEFAULT 'info',
    scope TEXT,
    target TEXT,
    payload_json TEXT,
    duration_ms INTEGER,
    http_status INTEGER,
    item_count INTEGER,
    emitted_at INTEGER NOT NULL,
    seq INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_task ON task_events(task_id);
CREATE INDEX IF NOT EXISTS idx_events_type ON task_events(event_type);
CREATE INDEX IF NOT EXISTS idx_events_emitted ON task_events(emitted_at);
"#;

/// Forward-only additive migrations, applied after the base schema.
/// Each entry must be safe to re-run against a store that already has it.
pub const MIGRATIONS: &[&str] = &[];
