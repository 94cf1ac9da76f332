//! Stage 3: rendered-DOM classification.
//!
//! Recomputes the Stage-2 signal set from a live-rendered document and
//! adds what only a rendered page shows: ad slots, comment sections,
//! and how much of the DOM the main content actually occupies once
//! scripts have run. Optional and on-demand; the cascade works without
//! it.

use scraper::{Html, Selector};
use serde_json::json;

use super::content_stage::{classify_signals, measure};
use super::StageResult;
use crate::browser_pool::RenderedPage;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector parses")
}

/// Classify a rendered page.
#[must_use]
pub fn classify_dom(rendered: &RenderedPage) -> StageResult {
    let signals = measure(&rendered.html);
    let mut result = classify_signals(&signals);

    let doc = Html::parse_document(&rendered.html);
    let ad_count = doc
        .select(&selector(
            "iframe[src*='ads'], [class*='ad-slot'], [id*='ad-slot'], [class*='advert']",
        ))
        .count();
    let has_comments = doc
        .select(&selector("#comments, [class*='comment-section'], [id*='comments']"))
        .next()
        .is_some();
    let main_node_count = doc
        .select(&selector("article *, main *"))
        .count();
    let total_node_count = doc.select(&selector("body *")).count().max(1);
    let main_area_share = main_node_count as f64 / total_node_count as f64;

    // Rendered evidence sharpens the verdict slightly: scripts have run,
    // so what we measured is what a reader would see.
    result.confidence = (result.confidence + 0.05).min(1.0);
    result.reason = format!("rendered: {}", result.reason);
    if let Some(map) = result.signals.as_object_mut() {
        map.insert("ad_count".into(), json!(ad_count));
        map.insert("has_comments".into(), json!(has_comments));
        map.insert("main_area_share".into(), json!(main_area_share));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classification;

    #[test]
    fn test_rendered_article_keeps_article_verdict() {
        let mut paragraphs = String::new();
        for _ in 0..40 {
            paragraphs.push_str("<p>Long form reporting continues across many paragraphs here.</p>");
        }
        let rendered = RenderedPage {
            html: format!(
                r#"<html><body><article>{paragraphs}</article>
                <div id="comments"><p>reader comment</p></div></body></html>"#
            ),
            final_url: "https://example.com/story".to_string(),
        };
        let result = classify_dom(&rendered);
        assert_eq!(result.classification, Classification::Article);
        assert_eq!(result.signals["has_comments"], true);
    }
}
