//! Fetch pipeline: HTTP with conditional headless escalation.

pub mod http;
pub mod pipeline;
pub mod types;

pub use http::{build_client, fetch_url, HttpFetchResult};
pub use pipeline::FetchPipeline;
pub use types::{FailureKind, FetchOutcome, UrlKind};
