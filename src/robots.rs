//! robots.txt fetch, parse and cache.
//!
//! One fetch per host per TTL (default 1h). The parser keeps only what
//! the crawler consumes: `Disallow` prefixes for our agent group (or
//! `*`) and `Crawl-delay`. A host whose robots.txt cannot be fetched is
//! treated as allow-all, matching how every major crawler behaves on
//! robots errors other than 401/403.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use log::debug;
use tokio::time::Instant;

/// Agent token matched against `User-agent:` groups.
const AGENT_TOKEN: &str = "newsatlas";

const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Parsed rules for one host.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    disallow: Vec<String>,
    allow: Vec<String>,
    pub crawl_delay: Option<Duration>,
    /// 401/403 on robots.txt itself: the site is telling us to go away.
    pub fetch_forbidden: bool,
}

impl RobotsRules {
    /// Longest-match allow/disallow decision for a URL path.
    #[must_use]
    pub fn is_allowed(&self, path: &str) -> bool {
        if self.fetch_forbidden {
            return false;
        }
        let best_disallow = self
            .disallow
            .iter()
            .filter(|p| path.starts_with(p.as_str()))
            .map(String::len)
            .max();
        let Some(disallow_len) = best_disallow else {
            return true;
        };
        let best_allow = self
            .allow
            .iter()
            .filter(|p| path.starts_with(p.as_str()))
            .map(String::len)
            .max();
        matches!(best_allow, Some(allow_len) if allow_len >= disallow_len)
    }

    /// Parse robots.txt content, keeping the most specific matching
    /// agent group (`newsatlas` beats `*`).
    #[must_use]
    pub fn parse(body: &str) -> Self {
        let mut star = RobotsRules::default();
        let mut ours = RobotsRules::default();
        let mut saw_ours = false;

        // Which groups the current rule lines apply to.
        let mut applies_star = false;
        let mut applies_ours = false;
        let mut in_agent_header = false;

        for line in body.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let field = field.trim().to_ascii_lowercase();
            let value = value.trim();

            match field.as_str() {
                "user-agent" => {
                    if !in_agent_header {
                        applies_star = false;
                        applies_ours = false;
                    }
                    in_agent_header = true;
                    let agent = value.to_ascii_lowercase();
                    if agent == "*" {
                        applies_star = true;
                    }
                    if agent.contains(AGENT_TOKEN) {
                        applies_ours = true;
                        saw_ours = true;
                    }
                }
                "disallow" | "allow" | "crawl-delay" => {
                    in_agent_header = false;
                    for (applies, rules) in
                        [(applies_star, &mut star), (applies_ours, &mut ours)]
                    {
                        if !applies {
                            continue;
                        }
                        match field.as_str() {
                            "disallow" if !value.is_empty() => {
                                rules.disallow.push(value.to_string());
                            }
                            "allow" if !value.is_empty() => {
                                rules.allow.push(value.to_string());
                            }
                            "crawl-delay" => {
                                if let Ok(secs) = value.parse::<f64>() {
                                    rules.crawl_delay =
                                        Some(Duration::from_millis((secs * 1000.0) as u64));
                                }
                            }
                            _ => {}
                        }
                    }
                }
                _ => {
                    in_agent_header = false;
                }
            }
        }

        if saw_ours {
            ours
        } else {
            star
        }
    }
}

struct CachedRules {
    rules: Arc<RobotsRules>,
    fetched_at: Instant,
}

/// Per-host robots cache.
pub struct RobotsCache {
    client: reqwest::Client,
    cache: DashMap<String, CachedRules>,
    ttl: Duration,
}

impl RobotsCache {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            cache: DashMap::new(),
            ttl: DEFAULT_TTL,
        }
    }

    /// Rules for a host, fetched if the cached copy is missing or stale.
    pub async fn rules_for(&self, host: &str) -> Arc<RobotsRules> {
        if let Some(entry) = self.cache.get(host) {
            if entry.fetched_at.elapsed() < self.ttl {
                return Arc::clone(&entry.rules);
            }
        }

        let rules = Arc::new(self.fetch_rules(host).await);
        self.cache.insert(
            host.to_string(),
            CachedRules {
                rules: Arc::clone(&rules),
                fetched_at: Instant::now(),
            },
        );
        rules
    }

    async fn fetch_rules(&self, host: &str) -> RobotsRules {
        let url = format!("https://{host}/robots.txt");
        match self.client.get(&url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                match status {
                    200 => {
                        let body = response.text().await.unwrap_or_default();
                        debug!("fetched robots.txt for {host} ({} bytes)", body.len());
                        RobotsRules::parse(&body)
                    }
                    401 | 403 => RobotsRules {
                        fetch_forbidden: true,
                        ..RobotsRules::default()
                    },
                    _ => RobotsRules::default(),
                }
            }
            Err(e) => {
                debug!("robots.txt fetch failed for {host}: {e}");
                RobotsRules::default()
            }
        }
    }

    /// Check whether a full URL is allowed.
    pub async fn is_allowed(&self, host: &str, url: &str) -> bool {
        let path = url::Url::parse(url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| "/".to_string());
        self.rules_for(host).await.is_allowed(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_star_group() {
        let rules = RobotsRules::parse(
            "User-agent: *\nDisallow: /admin\nCrawl-delay: 2\n\nUser-agent: googlebot\nDisallow: /\n",
        );
        assert!(!rules.is_allowed("/admin/settings"));
        assert!(rules.is_allowed("/world/france"));
        assert_eq!(rules.crawl_delay, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_specific_group_overrides_star() {
        let rules = RobotsRules::parse(
            "User-agent: *\nDisallow: /\n\nUser-agent: newsatlas\nDisallow: /private\n",
        );
        assert!(rules.is_allowed("/world"));
        assert!(!rules.is_allowed("/private/x"));
    }

    #[test]
    fn test_allow_beats_shorter_disallow() {
        let rules =
            RobotsRules::parse("User-agent: *\nDisallow: /world\nAllow: /world/france\n");
        assert!(!rules.is_allowed("/world/germany"));
        assert!(rules.is_allowed("/world/france"));
    }

    #[test]
    fn test_stacked_agent_lines_share_rules() {
        let rules = RobotsRules::parse(
            "User-agent: a\nUser-agent: *\nDisallow: /x\n",
        );
        assert!(!rules.is_allowed("/x/y"));
    }

    #[test]
    fn test_empty_disallow_allows_everything() {
        let rules = RobotsRules::parse("User-agent: *\nDisallow:\n");
        assert!(rules.is_allowed("/anything"));
    }

    #[test]
    fn test_forbidden_robots_blocks_all() {
        let rules = RobotsRules {
            fetch_forbidden: true,
            ..RobotsRules::default()
        };
        assert!(!rules.is_allowed("/"));
    }
}
