//! Fluent builder for [`CrawlConfig`].

use std::path::PathBuf;
use std::time::Duration;

use super::types::CrawlConfig;

#[derive(Debug, Default)]
pub struct CrawlConfigBuilder {
    config: CrawlConfig,
}

impl CrawlConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.db_path = path.into();
        self
    }

    #[must_use]
    pub fn start_url(mut self, url: impl Into<String>) -> Self {
        self.config.start_urls.push(url.into());
        self
    }

    #[must_use]
    pub fn start_urls(mut self, urls: impl IntoIterator<Item = String>) -> Self {
        self.config.start_urls.extend(urls);
        self
    }

    #[must_use]
    pub fn seed_from_cache(mut self, hosts: impl IntoIterator<Item = String>) -> Self {
        self.config.seed_from_cache.extend(hosts);
        self
    }

    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    #[must_use]
    pub fn page_limit(mut self, limit: usize) -> Self {
        self.config.page_limit = Some(limit);
        self
    }

    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    #[must_use]
    pub fn politeness_min_delay(mut self, delay: Duration) -> Self {
        self.config.politeness_min_delay = delay;
        self
    }

    #[must_use]
    pub fn max_age_hub(mut self, age: Duration) -> Self {
        self.config.max_age_hub = age;
        self
    }

    #[must_use]
    pub fn domain_auto_approve(mut self, auto: bool) -> Self {
        self.config.domain_auto_approve = auto;
        self
    }

    #[must_use]
    pub fn gazetteer_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.gazetteer_path = Some(path.into());
        self
    }

    /// Validate and produce the final configuration.
    pub fn build(self) -> Result<CrawlConfig, super::types::ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_round_trip() {
        let config = CrawlConfigBuilder::new()
            .db_path("/tmp/atlas.sqlite")
            .start_url("https://www.theguardian.com/")
            .workers(8)
            .page_limit(50)
            .build()
            .unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.page_limit, Some(50));
        assert_eq!(config.start_urls.len(), 1);
    }
}
