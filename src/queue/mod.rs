//! Queue management and crawl orchestration.

pub mod manager;
pub mod orchestrator;
pub mod retry;

pub use manager::{AdmitDecision, AdmitHints, CrawlItem, QueueManager};
pub use orchestrator::{CrawlOrchestrator, CrawlSummary};
pub use retry::DeferredQueue;
