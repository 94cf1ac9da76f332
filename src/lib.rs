//! newsatlas: a tenacious, place-aware news crawler.
//!
//! Discovers publisher hub pages (e.g. `/world/france`), probes their
//! pagination depth, and archives article corpora with an auditable
//! evidence trail: every claimed download is backed by a persisted HTTP
//! response record.

pub mod api;
pub mod browser_pool;
pub mod classify;
pub mod config;
pub mod crawler;
pub mod discovery;
pub mod domain_mode;
pub mod events;
pub mod fetch;
pub mod gazetteer;
pub mod hub_depth;
pub mod proxy;
pub mod queue;
pub mod rate_limiter;
pub mod resilience;
pub mod robots;
pub mod storage;
pub mod util;
pub mod validator;

pub use browser_pool::{HeadlessPool, HeadlessPoolConfig, RenderedPage, SessionGuard};
pub use classify::{aggregate, classify_content, classify_url, Classification};
pub use config::{CrawlConfig, CrawlConfigBuilder, RunManifest};
pub use crawler::Crawler;
pub use domain_mode::{DomainModeManager, DomainTier};
pub use events::{EventBus, EventRecorder, FetchSource, TaskEvent};
pub use fetch::{FetchOutcome, FetchPipeline, UrlKind};
pub use gazetteer::{Gazetteer, Place, PlaceKind};
pub use hub_depth::HubDepthProber;
pub use queue::{CrawlOrchestrator, CrawlSummary, QueueManager};
pub use rate_limiter::{PolitenessLease, PolitenessScheduler, RateLimiterConfig};
pub use resilience::{CircuitBreaker, CircuitState, ShutdownSignal};
pub use storage::Storage;
