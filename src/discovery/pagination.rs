//! Pagination predictor.
//!
//! Watches URLs whose shape matches a known pagination scheme, records
//! the highest page number seen per `(host, scheme)`, and speculatively
//! proposes the next few pages. A scheme is marked exhausted when its
//! speculative boundary 404s or comes back empty; entries expire after
//! a TTL so sites that add content resume speculation.

use std::time::Duration;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::time::Instant;

/// Recognized pagination shapes, matched in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaginationScheme {
    QueryPage,
    QueryPaged,
    QueryOffset,
    PathPage,
    PathP,
    PathPg,
}

static QUERY_PAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[?&]page=(\d+)").expect("valid regex"));
static QUERY_PAGED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[?&]paged=(\d+)").expect("valid regex"));
static QUERY_OFFSET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[?&]offset=(\d+)").expect("valid regex"));
static PATH_PAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/page/(\d+)(?:/|$)").expect("valid regex"));
static PATH_P_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/p/(\d+)(?:/|$)").expect("valid regex"));
static PATH_PG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/pg/(\d+)(?:/|$)").expect("valid regex"));

/// Detect the pagination scheme and page number of a URL.
#[must_use]
pub fn detect(url: &str) -> Option<(PaginationScheme, u32, String)> {
    let checks: [(&Lazy<Regex>, PaginationScheme); 6] = [
        (&QUERY_PAGE_RE, PaginationScheme::QueryPage),
        (&QUERY_PAGED_RE, PaginationScheme::QueryPaged),
        (&QUERY_OFFSET_RE, PaginationScheme::QueryOffset),
        (&PATH_PAGE_RE, PaginationScheme::PathPage),
        (&PATH_P_RE, PaginationScheme::PathP),
        (&PATH_PG_RE, PaginationScheme::PathPg),
    ];
    for (re, scheme) in checks {
        if let Some(caps) = re.captures(url) {
            let n: u32 = caps[1].parse().ok()?;
            // The stem identifies the paginated series: URL with the
            // page component blanked.
            let stem = re.replace(url, "\u{0}").to_string();
            return Some((scheme, n, stem));
        }
    }
    None
}

/// Build the URL for page `n` of the same series.
#[must_use]
pub fn url_for_page(url: &str, scheme: PaginationScheme, n: u32) -> String {
    match scheme {
        PaginationScheme::QueryPage => QUERY_PAGE_RE
            .replace(url, |caps: &regex::Captures<'_>| {
                let sep = &caps[0][..1];
                format!("{sep}page={n}")
            })
            .to_string(),
        PaginationScheme::QueryPaged => QUERY_PAGED_RE
            .replace(url, |caps: &regex::Captures<'_>| {
                let sep = &caps[0][..1];
                format!("{sep}paged={n}")
            })
            .to_string(),
        PaginationScheme::QueryOffset => QUERY_OFFSET_RE
            .replace(url, |caps: &regex::Captures<'_>| {
                let sep = &caps[0][..1];
                format!("{sep}offset={n}")
            })
            .to_string(),
        PaginationScheme::PathPage => PATH_PAGE_RE.replace(url, format!("/page/{n}/")).to_string(),
        PaginationScheme::PathP => PATH_P_RE.replace(url, format!("/p/{n}/")).to_string(),
        PaginationScheme::PathPg => PATH_PG_RE.replace(url, format!("/pg/{n}/")).to_string(),
    }
}

#[derive(Debug)]
struct SeriesState {
    max_seen: u32,
    speculated_to: u32,
    exhausted: bool,
    updated: Instant,
}

/// Predictor configuration.
#[derive(Debug, Clone)]
pub struct PaginationConfig {
    pub max_speculative_pages: u32,
    pub entry_ttl: Duration,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            max_speculative_pages: 3,
            entry_ttl: Duration::from_secs(3600),
        }
    }
}

/// Tracks pagination series and proposes next pages.
pub struct PaginationPredictor {
    config: PaginationConfig,
    /// (host, stem) → state
    series: DashMap<(String, String), SeriesState>,
}

impl PaginationPredictor {
    #[must_use]
    pub fn new(config: PaginationConfig) -> Self {
        Self {
            config,
            series: DashMap::new(),
        }
    }

    /// Observe a URL. Returns speculative next-page URLs to enqueue.
    pub fn observe(&self, host: &str, url: &str) -> Vec<(String, u32)> {
        let Some((scheme, n, stem)) = detect(url) else {
            return Vec::new();
        };
        let key = (host.to_string(), stem);
        let mut entry = self.series.entry(key).or_insert_with(|| SeriesState {
            max_seen: 0,
            speculated_to: 0,
            exhausted: false,
            updated: Instant::now(),
        });

        // TTL expiry resets exhaustion so refreshed archives resume.
        if entry.updated.elapsed() > self.config.entry_ttl {
            entry.exhausted = false;
            entry.speculated_to = entry.max_seen;
        }
        entry.updated = Instant::now();
        entry.max_seen = entry.max_seen.max(n);

        if entry.exhausted {
            return Vec::new();
        }

        let from = entry.max_seen.max(entry.speculated_to);
        let to = entry.max_seen + self.config.max_speculative_pages;
        let mut speculative = Vec::new();
        for page in (from + 1)..=to {
            speculative.push((url_for_page(url, scheme, page), page));
        }
        entry.speculated_to = entry.speculated_to.max(to);
        speculative
    }

    /// Mark a series exhausted at its boundary: the speculative page
    /// came back 404 or empty.
    pub fn mark_exhausted(&self, host: &str, url: &str) {
        if let Some((_, _, stem)) = detect(url) {
            if let Some(mut entry) = self.series.get_mut(&(host.to_string(), stem)) {
                entry.exhausted = true;
                entry.updated = Instant::now();
            }
        }
    }

    /// Highest page number observed for the series containing `url`.
    #[must_use]
    pub fn max_seen(&self, host: &str, url: &str) -> Option<u32> {
        let (_, _, stem) = detect(url)?;
        self.series
            .get(&(host.to_string(), stem))
            .map(|e| e.max_seen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_shapes() {
        assert_eq!(
            detect("https://e.com/world/france?page=7").map(|(s, n, _)| (s, n)),
            Some((PaginationScheme::QueryPage, 7))
        );
        assert_eq!(
            detect("https://e.com/news/page/12/").map(|(s, n, _)| (s, n)),
            Some((PaginationScheme::PathPage, 12))
        );
        assert_eq!(
            detect("https://e.com/list?offset=40").map(|(s, n, _)| (s, n)),
            Some((PaginationScheme::QueryOffset, 40))
        );
        assert!(detect("https://e.com/world/france").is_none());
    }

    #[test]
    fn test_url_for_page() {
        assert_eq!(
            url_for_page("https://e.com/w?page=3", PaginationScheme::QueryPage, 4),
            "https://e.com/w?page=4"
        );
        assert_eq!(
            url_for_page("https://e.com/news/page/3/", PaginationScheme::PathPage, 9),
            "https://e.com/news/page/9/"
        );
    }

    #[test]
    fn test_speculation_bounded() {
        let predictor = PaginationPredictor::new(PaginationConfig::default());
        let next = predictor.observe("e.com", "https://e.com/w?page=5");
        assert_eq!(
            next.iter().map(|(_, n)| *n).collect::<Vec<_>>(),
            vec![6, 7, 8]
        );
        // Observing the same page again does not re-speculate.
        assert!(predictor.observe("e.com", "https://e.com/w?page=5").is_empty());
        // A higher page extends the frontier.
        let next = predictor.observe("e.com", "https://e.com/w?page=8");
        assert_eq!(
            next.iter().map(|(_, n)| *n).collect::<Vec<_>>(),
            vec![9, 10, 11]
        );
    }

    #[test]
    fn test_exhaustion_stops_speculation() {
        let predictor = PaginationPredictor::new(PaginationConfig::default());
        predictor.observe("e.com", "https://e.com/w?page=5");
        predictor.mark_exhausted("e.com", "https://e.com/w?page=8");
        assert!(predictor
            .observe("e.com", "https://e.com/w?page=6")
            .is_empty());
    }

    #[test]
    fn test_series_isolated_by_stem() {
        let predictor = PaginationPredictor::new(PaginationConfig::default());
        predictor.mark_exhausted("e.com", "https://e.com/sport?page=4");
        let next = predictor.observe("e.com", "https://e.com/world?page=4");
        assert!(!next.is_empty());
    }
}
