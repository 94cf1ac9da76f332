//! Stage 2: content-signal classification over parsed HTML.
//!
//! Works purely from what the document contains: word and paragraph
//! counts, link density, schema.org and OpenGraph hints, semantic
//! containers. URL pattern matching is deliberately absent from this
//! stage; that boundary keeps the two stages independent for the
//! aggregator's agreement rules.

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

use super::{Classification, StageResult};

/// Signals measured from a parsed document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentSignals {
    pub word_count: usize,
    pub paragraph_count: usize,
    pub link_count: usize,
    /// links per word
    pub link_density: f64,
    pub nav_link_count: usize,
    pub has_article_schema: bool,
    pub has_collection_schema: bool,
    pub has_og_article: bool,
    pub article_container_words: usize,
    /// share of all words inside <article>/<main>
    pub container_text_share: f64,
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector parses")
}

/// Measure content signals from an HTML document.
#[must_use]
pub fn measure(html: &str) -> ContentSignals {
    let doc = Html::parse_document(html);
    let mut signals = ContentSignals::default();

    let body_text: String = doc
        .select(&selector("body"))
        .flat_map(|b| b.text())
        .collect::<Vec<_>>()
        .join(" ");
    signals.word_count = body_text.split_whitespace().count();

    signals.paragraph_count = doc.select(&selector("p")).count();
    signals.link_count = doc.select(&selector("a[href]")).count();
    signals.link_density = if signals.word_count > 0 {
        signals.link_count as f64 / signals.word_count as f64
    } else if signals.link_count > 0 {
        1.0
    } else {
        0.0
    };

    signals.nav_link_count = doc
        .select(&selector("nav a[href], header a[href], footer a[href]"))
        .count();

    for script in doc.select(&selector(r#"script[type="application/ld+json"]"#)) {
        let raw = script.text().collect::<String>();
        if raw.contains("NewsArticle") || raw.contains("\"Article\"") || raw.contains("BlogPosting")
        {
            signals.has_article_schema = true;
        }
        if raw.contains("CollectionPage") || raw.contains("ItemList") {
            signals.has_collection_schema = true;
        }
    }

    if let Some(og) = doc
        .select(&selector(r#"meta[property="og:type"]"#))
        .next()
        .and_then(|m| m.value().attr("content"))
    {
        signals.has_og_article = og.eq_ignore_ascii_case("article");
    }

    let container_text: String = doc
        .select(&selector("article, main"))
        .flat_map(|c| c.text())
        .collect::<Vec<_>>()
        .join(" ");
    signals.article_container_words = container_text.split_whitespace().count();
    signals.container_text_share = if signals.word_count > 0 {
        signals.article_container_words as f64 / signals.word_count as f64
    } else {
        0.0
    };

    signals
}

/// Classify from measured signals.
#[must_use]
pub fn classify_signals(signals: &ContentSignals) -> StageResult {
    let signals_json = serde_json::to_value(signals).unwrap_or_default();
    let result = |classification, confidence: f64, reason: &str| StageResult {
        classification,
        confidence,
        reason: reason.to_string(),
        signals: signals_json.clone(),
    };

    if signals.has_collection_schema && signals.link_count > 20 {
        return result(Classification::Hub, 0.9, "collection schema with link list");
    }
    if (signals.has_article_schema || signals.has_og_article) && signals.word_count >= 150 {
        return result(Classification::Article, 0.9, "article schema markup");
    }
    if signals.word_count < 80 && signals.nav_link_count > 20 {
        return result(Classification::Nav, 0.7, "scant text, navigation-dominated");
    }
    if signals.link_density > 0.25 && signals.link_count > 40 {
        return result(Classification::Hub, 0.85, "high link density");
    }
    if signals.container_text_share > 0.6
        && signals.article_container_words >= 300
        && signals.link_density < 0.15
    {
        return result(Classification::Article, 0.85, "dominant article container");
    }
    if signals.word_count >= 400 && signals.link_density < 0.1 {
        return result(Classification::Article, 0.75, "long prose, few links");
    }
    if signals.link_count > 80 {
        return result(Classification::Hub, 0.7, "link-heavy page");
    }
    if signals.word_count < 50 {
        return result(Classification::Other, 0.5, "near-empty document");
    }

    result(Classification::Unknown, 0.4, "mixed signals")
}

/// Measure and classify in one step.
#[must_use]
pub fn classify_content(html: &str) -> StageResult {
    classify_signals(&measure(html))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article_html() -> String {
        let mut paragraphs = String::new();
        for _ in 0..40 {
            paragraphs.push_str(
                "<p>The correspondent reported at length on developments in the region, \
                 with officials confirming details to reporters on the ground.</p>",
            );
        }
        format!(
            r#"<html><head>
            <script type="application/ld+json">{{"@type":"NewsArticle","headline":"x"}}</script>
            </head><body><article>{paragraphs}</article></body></html>"#
        )
    }

    fn hub_html() -> String {
        let mut links = String::new();
        for i in 0..60 {
            links.push_str(&format!(
                "<li><a href=\"/world/story-{i}\">Story headline {i}</a></li>"
            ));
        }
        format!("<html><body><main><ul>{links}</ul></main></body></html>")
    }

    #[test]
    fn test_article_classified() {
        let result = classify_content(&article_html());
        assert_eq!(result.classification, Classification::Article);
        assert!(result.confidence >= 0.85);
    }

    #[test]
    fn test_hub_classified() {
        let result = classify_content(&hub_html());
        assert_eq!(result.classification, Classification::Hub);
        assert!(result.confidence >= 0.7);
    }

    #[test]
    fn test_signals_measured() {
        let signals = measure(&hub_html());
        assert!(signals.link_count >= 60);
        assert!(signals.link_density > 0.1);
    }

    #[test]
    fn test_empty_page_is_other() {
        let result = classify_content("<html><body></body></html>");
        assert_eq!(result.classification, Classification::Other);
    }
}
