//! Stage 1: URL-only classification.
//!
//! A declarative decision tree over path tokens. Deterministic, no I/O,
//! cheap enough to run on every discovered URL before download.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use super::{Classification, StageResult};
use crate::util::dates::date_from_url_path;

/// Section tokens publishers use for topical hubs.
static SECTION_KEYWORDS: &[&str] = &[
    "world", "news", "politics", "business", "sport", "sports", "culture", "opinion",
    "technology", "tech", "science", "environment", "money", "lifestyle", "travel",
    "local", "region", "uk-news", "us-news",
];

static PAGINATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:[?&](?:page|paged|offset)=\d+|/(?:page|p|pg)/\d+)(?:$|[&/])?")
        .expect("valid pagination regex")
});

/// Classify a URL without fetching it.
#[must_use]
pub fn classify_url(url: &str) -> StageResult {
    let parsed = url::Url::parse(url).ok();
    let path = parsed
        .as_ref()
        .map(|u| u.path().to_string())
        .unwrap_or_else(|| url.to_string());
    let query = parsed.as_ref().and_then(|u| u.query()).unwrap_or("");

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let depth = segments.len();
    let last_segment = segments.last().copied().unwrap_or("");
    let slug_len = last_segment.len();
    let slug_hyphens = last_segment.matches('-').count();
    let has_date = date_from_url_path(&path).is_some();
    let has_pagination =
        PAGINATION_RE.is_match(&format!("{path}?{query}")) || PAGINATION_RE.is_match(&path);
    let section_match = segments
        .iter()
        .any(|s| SECTION_KEYWORDS.contains(&s.to_ascii_lowercase().as_str()));

    let signals = json!({
        "depth": depth,
        "slug_len": slug_len,
        "slug_hyphens": slug_hyphens,
        "has_date_path": has_date,
        "has_pagination": has_pagination,
        "section_keyword": section_match,
    });

    let result = |classification, confidence: f64, reason: &str| StageResult {
        classification,
        confidence,
        reason: reason.to_string(),
        signals: signals.clone(),
    };

    // Decision tree, most specific first.
    if depth == 0 {
        return result(Classification::Nav, 0.9, "root path");
    }
    if has_date && slug_len > 20 && slug_hyphens >= 2 {
        return result(
            Classification::Article,
            0.95,
            "dated path with headline slug",
        );
    }
    if has_pagination {
        return result(Classification::Hub, 0.85, "pagination shape");
    }
    if has_date {
        return result(Classification::Hub, 0.7, "dated path without slug (date archive)");
    }
    if section_match && depth <= 2 && slug_len <= 20 {
        return result(Classification::Hub, 0.8, "shallow section path");
    }
    if slug_len > 30 && slug_hyphens >= 3 {
        return result(Classification::Article, 0.7, "long headline slug");
    }
    if depth >= 4 {
        return result(Classification::Article, 0.55, "deep path");
    }
    if depth == 1 && slug_len <= 12 {
        return result(Classification::Hub, 0.55, "short single-segment path");
    }

    result(Classification::Unknown, 0.4, "no decisive URL feature")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guardian_article_url() {
        let result = classify_url("https://www.theguardian.com/uk-news/2024/jan/15/some-story-about-events-unfolding");
        assert_eq!(result.classification, Classification::Article);
        assert!(result.confidence >= 0.95);
    }

    #[test]
    fn test_place_hub_url() {
        let result = classify_url("https://www.theguardian.com/world/france");
        assert_eq!(result.classification, Classification::Hub);
        assert!(result.confidence >= 0.8);
    }

    #[test]
    fn test_paginated_hub_url() {
        let result = classify_url("https://example.com/world/france?page=12");
        assert_eq!(result.classification, Classification::Hub);
        assert!(result.confidence >= 0.85);
    }

    #[test]
    fn test_root_is_nav() {
        let result = classify_url("https://example.com/");
        assert_eq!(result.classification, Classification::Nav);
    }

    #[test]
    fn test_path_pagination_segment() {
        let result = classify_url("https://example.com/news/page/3");
        assert_eq!(result.classification, Classification::Hub);
    }

    #[test]
    fn test_is_deterministic() {
        let a = classify_url("https://example.com/world/france");
        let b = classify_url("https://example.com/world/france");
        assert_eq!(a.classification, b.classification);
        assert_eq!(a.confidence, b.confidence);
    }
}
