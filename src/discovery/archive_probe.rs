//! Archive and sitemap probing.
//!
//! When a host's queue runs shallow (and the per-host cooldown allows),
//! the probe walks the well-known archive surfaces: `/archive`, the
//! sitemap family, `robots.txt` sitemap directives, per-section archive
//! paths, and date-patterned year/month paths. Nested sitemap indexes
//! recurse with a visited set and a hard document cap.

use std::collections::HashSet;
use std::time::Duration;

use dashmap::DashMap;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::time::Instant;

use crate::events::{EventBus, TaskEvent};
use crate::fetch::http::fetch_url;

/// Sitemap documents fetched per host per probe round.
const MAX_SITEMAP_DOCS: usize = 50;

static SITEMAP_LOC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<loc>\s*([^<\s]+)\s*</loc>").expect("valid loc regex"));
static SITEMAP_INDEX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<\s*sitemapindex[\s>]").expect("valid sitemapindex regex"));
static ROBOTS_SITEMAP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*sitemap:\s*(\S+)").expect("valid robots sitemap regex"));

/// Probe configuration.
#[derive(Debug, Clone)]
pub struct ArchiveProbeConfig {
    pub cooldown: Duration,
    /// Probe only when the host's pending queue is below this.
    pub queue_threshold: i64,
    pub max_years_back: u32,
}

impl Default for ArchiveProbeConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(3600),
            queue_threshold: 10,
            max_years_back: 2,
        }
    }
}

/// Per-host archive prober with cooldown tracking.
pub struct ArchiveProbe {
    config: ArchiveProbeConfig,
    client: reqwest::Client,
    last_probe: DashMap<String, Instant>,
}

impl ArchiveProbe {
    #[must_use]
    pub fn new(config: ArchiveProbeConfig, client: reqwest::Client) -> Self {
        Self {
            config,
            client,
            last_probe: DashMap::new(),
        }
    }

    /// Whether this host is due a probe round.
    #[must_use]
    pub fn is_due(&self, host: &str, queue_depth: i64) -> bool {
        if queue_depth >= self.config.queue_threshold {
            return false;
        }
        match self.last_probe.get(host) {
            Some(last) => last.elapsed() >= self.config.cooldown,
            None => true,
        }
    }

    /// Candidate archive paths for a host, including date patterns.
    /// `sections` are known section slugs ("world", "sport") used for
    /// per-section archive paths.
    #[must_use]
    pub fn candidate_paths(&self, sections: &[String]) -> Vec<String> {
        let mut paths = vec![
            "/archive".to_string(),
            "/sitemap.xml".to_string(),
            "/sitemap-news.xml".to_string(),
            "/sitemap_index.xml".to_string(),
            "/robots.txt".to_string(),
        ];
        for section in sections {
            paths.push(format!("/{section}/archive"));
            paths.push(format!("/{section}/blog/archive"));
        }
        let current_year = chrono::Utc::now().format("%Y").to_string();
        if let Ok(year) = current_year.parse::<i32>() {
            for back in 0..=self.config.max_years_back as i32 {
                let y = year - back;
                paths.push(format!("/{y}/"));
                for month in 1..=12 {
                    paths.push(format!("/{y}/{month:02}/"));
                }
            }
        }
        paths
    }

    /// Run one probe round against a host. Returns discovered URLs.
    pub async fn probe_host(
        &self,
        host: &str,
        sections: &[String],
        bus: &EventBus,
    ) -> Vec<String> {
        self.last_probe.insert(host.to_string(), Instant::now());

        let mut found: Vec<String> = Vec::new();
        let mut sitemap_queue: Vec<String> = Vec::new();
        let mut sitemap_seen: HashSet<String> = HashSet::new();
        let mut docs_fetched = 0usize;

        for path in self.candidate_paths(sections) {
            let probe_url = format!("https://{host}{path}");
            let Ok(result) = fetch_url(&self.client, &probe_url).await else {
                continue;
            };
            if result.http_status != 200 {
                continue;
            }
            let body = String::from_utf8_lossy(&result.body);

            if path == "/robots.txt" {
                for cap in ROBOTS_SITEMAP_RE.captures_iter(&body) {
                    sitemap_queue.push(cap[1].to_string());
                }
            } else if path.contains("sitemap") {
                self.collect_sitemap(&body, &mut found, &mut sitemap_queue);
                docs_fetched += 1;
            } else {
                // Archive or date page: harvest its links.
                found.extend(super::links::extract_links(&probe_url, &body));
            }
        }

        // Recurse nested sitemap indexes, bounded.
        while let Some(sitemap_url) = sitemap_queue.pop() {
            if docs_fetched >= MAX_SITEMAP_DOCS {
                debug!("sitemap cap reached for {host}, dropping remainder");
                break;
            }
            if !sitemap_seen.insert(sitemap_url.clone()) {
                continue;
            }
            let Ok(result) = fetch_url(&self.client, &sitemap_url).await else {
                continue;
            };
            if result.http_status != 200 {
                continue;
            }
            docs_fetched += 1;
            let body = String::from_utf8_lossy(&result.body);
            self.collect_sitemap(&body, &mut found, &mut sitemap_queue);
        }

        // Keep it to this host.
        found.retain(|u| {
            crate::util::urls::extract_host(u)
                .map(|h| h == host)
                .unwrap_or(false)
        });
        found.sort();
        found.dedup();

        bus.publish(&TaskEvent::DiscoveryProbe {
            host: host.to_string(),
            urls_found: found.len() as u64,
        });
        debug!("archive probe for {host}: {} URLs", found.len());
        found
    }

    /// Pull `<loc>` entries out of a sitemap document; nested indexes go
    /// back on the queue, page URLs into `found`.
    fn collect_sitemap(&self, body: &str, found: &mut Vec<String>, queue: &mut Vec<String>) {
        let is_index = SITEMAP_INDEX_RE.is_match(body);
        for cap in SITEMAP_LOC_RE.captures_iter(body) {
            let loc = cap[1].trim().to_string();
            if is_index || loc.ends_with(".xml") || loc.ends_with(".xml.gz") {
                queue.push(loc);
            } else {
                found.push(loc);
            }
        }
    }
}
