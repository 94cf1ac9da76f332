//! Event type definitions for the crawl telemetry stream.
//!
//! Events are a closed set: every cross-component signal is a variant
//! here, not an ad-hoc string. The stream is observability only; the
//! `http_responses` table remains the sole source of download evidence.

use serde::{Deserialize, Serialize};

/// Where a page's bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchSource {
    Network,
    Headless,
    Cache,
}

impl FetchSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Headless => "headless",
            Self::Cache => "cache",
        }
    }
}

/// Events emitted during crawling. Serialized into the append-only
/// `task_events` table and streamed to live subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    /// One per fetched URL, the compact PAGE line.
    PageFetched {
        url: String,
        source: FetchSource,
        http_status: u16,
        bytes: u64,
        download_ms: i64,
    },
    /// One per failed URL, with the failure category.
    PageFailed {
        url: String,
        category: String,
        detail: String,
    },
    CrawlStarted {
        start_urls: Vec<String>,
    },
    CrawlCompleted {
        pages: u64,
        duration_ms: i64,
    },
    /// No successful fetch across any host for the stall window.
    CrawlStalled {
        idle_ms: i64,
        queue_depth: i64,
        open_breakers: Vec<String>,
        last_errors: Vec<(String, String)>,
    },
    BreakerOpen {
        host: String,
        consecutive_failures: u32,
    },
    BreakerHalfOpen {
        host: String,
    },
    BreakerClosed {
        host: String,
    },
    /// A URL deferred because its host's breaker is open.
    FetchDeferred {
        url: String,
        host: String,
    },
    RateBackoff {
        host: String,
        delay_ms: u64,
        http_status: u16,
    },
    RateRecovered {
        host: String,
        delay_ms: u64,
    },
    DomainPending {
        host: String,
        failures: u32,
    },
    DomainLearned {
        host: String,
    },
    DomainFailureRecorded {
        host: String,
        failures_in_window: u32,
    },
    PoolSessionLaunched {
        session_id: u64,
    },
    PoolSessionAcquired {
        session_id: u64,
    },
    PoolSessionReleased {
        session_id: u64,
    },
    PoolSessionRetired {
        session_id: u64,
        pages_served: u64,
    },
    HubDepthProbed {
        url: String,
        max_page_depth: Option<u32>,
        probes: u32,
    },
    HubSeeded {
        host: String,
        candidates: u64,
    },
    DiscoveryProbe {
        host: String,
        urls_found: u64,
    },
    PatternsLearned {
        host: String,
        patterns: u64,
    },
    PredictionVerified {
        url: String,
        matched: bool,
    },
}

impl TaskEvent {
    /// Categorical event-type string used for filtering and storage.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PageFetched { .. } => "page.fetched",
            Self::PageFailed { .. } => "page.failed",
            Self::CrawlStarted { .. } => "crawl.started",
            Self::CrawlCompleted { .. } => "crawl.completed",
            Self::CrawlStalled { .. } => "crawl.stalled",
            Self::BreakerOpen { .. } => "breaker.open",
            Self::BreakerHalfOpen { .. } => "breaker.half_open",
            Self::BreakerClosed { .. } => "breaker.closed",
            Self::FetchDeferred { .. } => "fetch.deferred",
            Self::RateBackoff { .. } => "rate.backoff",
            Self::RateRecovered { .. } => "rate.recovered",
            Self::DomainPending { .. } => "domain.pending",
            Self::DomainLearned { .. } => "domain.learned",
            Self::DomainFailureRecorded { .. } => "domain.failure_recorded",
            Self::PoolSessionLaunched { .. } => "pool.launched",
            Self::PoolSessionAcquired { .. } => "pool.acquired",
            Self::PoolSessionReleased { .. } => "pool.released",
            Self::PoolSessionRetired { .. } => "pool.retired",
            Self::HubDepthProbed { .. } => "hub.depth.probed",
            Self::HubSeeded { .. } => "hub.seeded",
            Self::DiscoveryProbe { .. } => "discovery.probe",
            Self::PatternsLearned { .. } => "patterns.learned",
            Self::PredictionVerified { .. } => "prediction.verified",
        }
    }

    #[must_use]
    pub fn severity(&self) -> &'static str {
        match self {
            Self::PageFailed { .. } | Self::BreakerOpen { .. } | Self::CrawlStalled { .. } => {
                "warn"
            }
            _ => "info",
        }
    }

    /// The host or URL this event concerns, for scoped queries.
    #[must_use]
    pub fn target(&self) -> Option<String> {
        match self {
            Self::PageFetched { url, .. }
            | Self::PageFailed { url, .. }
            | Self::FetchDeferred { url, .. }
            | Self::HubDepthProbed { url, .. }
            | Self::PredictionVerified { url, .. } => Some(url.clone()),
            Self::BreakerOpen { host, .. }
            | Self::BreakerHalfOpen { host }
            | Self::BreakerClosed { host }
            | Self::RateBackoff { host, .. }
            | Self::RateRecovered { host, .. }
            | Self::DomainPending { host, .. }
            | Self::DomainLearned { host }
            | Self::DomainFailureRecorded { host, .. }
            | Self::HubSeeded { host, .. }
            | Self::DiscoveryProbe { host, .. }
            | Self::PatternsLearned { host, .. } => Some(host.clone()),
            _ => None,
        }
    }
}

/// Flat row shape persisted into `task_events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEventRecord {
    pub task_id: String,
    pub event_type: String,
    pub severity: String,
    pub scope: Option<String>,
    pub target: Option<String>,
    pub payload_json: Option<String>,
    pub duration_ms: Option<i64>,
    pub http_status: Option<u16>,
    pub item_count: Option<i64>,
    pub emitted_at: i64,
    /// Per-writer sequence; consumers order by (emitted_at, seq).
    pub seq: i64,
}

impl TaskEventRecord {
    /// Flatten an event into its storable row.
    #[must_use]
    pub fn from_event(task_id: &str, seq: i64, event: &TaskEvent) -> Self {
        let (duration_ms, http_status, item_count) = match event {
            TaskEvent::PageFetched {
                http_status,
                download_ms,
                ..
            } => (Some(*download_ms), Some(*http_status), None),
            TaskEvent::CrawlCompleted { pages, duration_ms } => {
                (Some(*duration_ms), None, Some(*pages as i64))
            }
            TaskEvent::HubSeeded { candidates, .. } => (None, None, Some(*candidates as i64)),
            TaskEvent::DiscoveryProbe { urls_found, .. } => (None, None, Some(*urls_found as i64)),
            TaskEvent::PatternsLearned { patterns, .. } => (None, None, Some(*patterns as i64)),
            TaskEvent::RateBackoff { http_status, .. } => (None, Some(*http_status), None),
            _ => (None, None, None),
        };

        Self {
            task_id: task_id.to_string(),
            event_type: event.kind().to_string(),
            severity: event.severity().to_string(),
            scope: None,
            target: event.target(),
            payload_json: serde_json::to_string(event).ok(),
            duration_ms,
            http_status,
            item_count,
            emitted_at: chrono::Utc::now().timestamp_millis(),
            seq,
        }
    }
}
