//! Fetch outcome and failure types.
//!
//! The pipeline never surfaces raw errors to its callers; every fetch
//! resolves to a [`FetchOutcome`] carrying the result class and enough
//! diagnostic context to act on it.

use crate::events::FetchSource;
use crate::storage::StoredBody;

/// What kind of page a URL is believed to be, for cache freshness.
/// Hubs churn (new articles appear), so their cached copies age out;
/// articles are immutable once published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlKind {
    Hub,
    Article,
    /// Unknown URLs get hub freshness semantics (the conservative bound).
    Unknown,
}

/// Failure categories for retry and breaker decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeout, DNS, connection refused. Usually transient.
    Network,
    /// Connection reset / TLS handshake failure, the signature of bot
    /// blocking, feeds domain-mode learning.
    ConnectionReset,
    /// HTTP 4xx/5xx carried through.
    Http(u16),
    /// Validator hard failure: stop attempting this host.
    HardContent,
    /// Validator soft failure that survived headless escalation.
    SoftContent,
    /// Headless session failure.
    Headless,
    /// Crawl cancelled mid-fetch.
    Cancelled,
}

impl FailureKind {
    /// Classify a transport error by its message shape.
    #[must_use]
    pub fn classify_transport(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::Network;
        }
        let msg = error.to_string().to_lowercase();
        if msg.contains("connection reset")
            || msg.contains("reset by peer")
            || msg.contains("broken pipe")
            || msg.contains("handshake")
            || msg.contains("certificate")
            || msg.contains("connection closed before")
        {
            return Self::ConnectionReset;
        }
        Self::Network
    }

    /// Whether this failure should count against the host's breaker.
    #[must_use]
    pub fn counts_toward_breaker(&self) -> bool {
        !matches!(self, Self::Cancelled | Self::Http(404))
    }

    /// Short category label for PAGE error lines.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::ConnectionReset => "connection-reset",
            Self::Http(_) => "http",
            Self::HardContent => "content-hard",
            Self::SoftContent => "content-soft",
            Self::Headless => "headless",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Result of one fetch through the pipeline.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Body fetched, validated and persisted. The evidence row exists.
    Fetched {
        response_id: i64,
        content_id: i64,
        http_status: u16,
        body: Vec<u8>,
        source: FetchSource,
        download_ms: i64,
        /// URL after redirects; differs from the request URL on loopback.
        final_url: String,
    },
    /// Served from the store without touching the network. No
    /// `http_responses` row is created for this.
    CacheHit { stored: StoredBody },
    /// Breaker open: not attempted, not a failure.
    Deferred { host: String, retry_in_ms: Option<i64> },
    /// Robots disallow: intentionally skipped, no evidence row.
    RobotsDenied,
    /// Attempted and failed; the attempt's evidence row exists unless
    /// the failure happened before any network I/O.
    Failed {
        kind: FailureKind,
        detail: String,
        response_id: Option<i64>,
    },
}

impl FetchOutcome {
    /// The page body, when this outcome carries one.
    #[must_use]
    pub fn body(&self) -> Option<&[u8]> {
        match self {
            Self::Fetched { body, .. } => Some(body),
            Self::CacheHit { stored } => Some(&stored.body),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Fetched { .. } | Self::CacheHit { .. })
    }
}
