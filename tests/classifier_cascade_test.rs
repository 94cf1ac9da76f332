//! End-to-end cascade behavior on realistic pages.

use newsatlas::classify::{aggregate, classify_content, classify_url, Classification};

fn guardian_article_html() -> String {
    let mut paragraphs = String::new();
    for _ in 0..45 {
        paragraphs.push_str(
            "<p>Officials confirmed on Monday that negotiations had resumed, \
             with correspondents describing a markedly changed atmosphere.</p>",
        );
    }
    format!(
        r#"<html><head>
        <meta property="og:type" content="article">
        <script type="application/ld+json">
        {{"@type":"NewsArticle","headline":"Some story","datePublished":"2024-01-15T09:00:00Z"}}
        </script>
        </head><body><article>{paragraphs}</article></body></html>"#
    )
}

fn hub_listing_html() -> String {
    let mut links = String::new();
    for i in 0..70 {
        links.push_str(&format!(
            "<li><a href=\"/world/2024/01/story-{i}-long-headline-slug-for-testing\">Headline {i}</a></li>"
        ));
    }
    format!("<html><body><main><ul>{links}</ul></main></body></html>")
}

#[test]
fn article_url_and_content_agree_with_high_confidence() {
    let url = "https://www.theguardian.com/uk-news/2024/jan/15/some-story-about-the-day";
    let url_stage = classify_url(url);
    assert_eq!(url_stage.classification, Classification::Article);
    assert!(url_stage.confidence >= 0.95);

    let content_stage = classify_content(&guardian_article_html());
    assert_eq!(content_stage.classification, Classification::Article);
    assert!(content_stage.confidence >= 0.85);

    let result = aggregate(url_stage, Some(content_stage), None);
    assert_eq!(result.classification, Classification::Article);
    assert!(result.confidence >= 0.9);

    let provenance = &result.provenance;
    assert!(provenance.url.as_ref().unwrap().confidence >= result.confidence - 0.10);
    assert!(provenance.decided_by.starts_with("agreement"));
}

#[test]
fn content_overrides_weak_url_verdict() {
    // URL says little; the body is unmistakably a hub listing.
    let url_stage = classify_url("https://example.com/uncategorised");
    let content_stage = classify_content(&hub_listing_html());
    assert_eq!(content_stage.classification, Classification::Hub);

    let result = aggregate(url_stage, Some(content_stage), None);
    assert_eq!(result.classification, Classification::Hub);
    assert_eq!(result.provenance.decided_by, "content-override");
}

#[test]
fn aggregator_never_invents_a_classification() {
    let url_stage = classify_url("https://example.com/world/france");
    let content_stage = classify_content(&guardian_article_html());
    let result = aggregate(url_stage.clone(), Some(content_stage.clone()), None);
    assert!(
        result.classification == url_stage.classification
            || result.classification == content_stage.classification
    );
}

#[test]
fn hub_url_with_pagination_stays_hub_against_thin_content() {
    let url_stage = classify_url("https://example.com/world/france?page=3");
    assert_eq!(url_stage.classification, Classification::Hub);

    // Thin content yields low-confidence signals that cannot override.
    let content_stage = classify_content("<html><body><p>loading</p></body></html>");
    let result = aggregate(url_stage, Some(content_stage), None);
    assert_eq!(result.classification, Classification::Hub);
}
