//! Crawl configuration: typed config, fluent builder, run manifest.

pub mod builder;
pub mod manifest;
pub mod types;

pub use builder::CrawlConfigBuilder;
pub use manifest::{apply_overrides, RunManifest, Sequence};
pub use types::{ConfigError, CrawlConfig};
