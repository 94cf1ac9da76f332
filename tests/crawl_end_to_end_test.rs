//! Miniature end-to-end crawl: seed page → discovered articles →
//! verified evidence rows and classifications.

use std::time::Duration;

use tempfile::TempDir;

use newsatlas::config::CrawlConfig;
use newsatlas::Crawler;

fn article_body(tag: &str) -> String {
    let mut body = format!("<html><body><article><h1>Story {tag}</h1>");
    for _ in 0..40 {
        body.push_str("<p>Extended coverage of the developing situation continues today.</p>");
    }
    body.push_str("</article></body></html>");
    body
}

fn seed_body() -> String {
    r#"<html><body><main><ul>
    <li><a href="/world/2024/01/first-story-with-a-long-headline-slug">First</a></li>
    <li><a href="/world/2024/01/second-story-with-a-long-headline-slug">Second</a></li>
    </ul>
    <p>More coverage from around the world, updated through the day.</p>
    <p>Additional filler so the listing clears the validator's floor.</p>
    <p>Further text keeps this fixture comfortably above minimums.</p>
    </main></body></html>"#
        .to_string()
}

#[tokio::test]
async fn crawl_discovers_fetches_and_verifies() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/world")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(seed_body())
        .create_async()
        .await;
    server
        .mock("GET", "/world/2024/01/first-story-with-a-long-headline-slug")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(article_body("one"))
        .create_async()
        .await;
    server
        .mock("GET", "/world/2024/01/second-story-with-a-long-headline-slug")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(article_body("two"))
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let config = CrawlConfig {
        db_path: dir.path().join("crawl.sqlite"),
        domain_state_path: dir.path().join("modes.json"),
        start_urls: vec![format!("{}/world", server.url())],
        workers: 2,
        politeness_min_delay: Duration::from_millis(10),
        min_body_bytes: 60,
        ..CrawlConfig::default()
    };

    let crawler = Crawler::init(config).await.unwrap();
    let storage = crawler.storage().clone();
    let summary = tokio::time::timeout(Duration::from_secs(60), crawler.run())
        .await
        .expect("crawl should finish well inside the timeout")
        .unwrap();

    // Seed plus two discovered articles, every one evidence-backed.
    assert_eq!(summary.pages_fetched, 3);
    assert_eq!(storage.count_verified(None, None).await.unwrap(), 3);

    // Downstream classification ran for the fetched bodies.
    let hosts = storage.verified_counts_by_host(1).await.unwrap();
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0].verified, 3);

    // Every prediction made at admission got verified after fetch.
    let verified = storage
        .verified_urls_for_host(&hosts[0].host)
        .await
        .unwrap();
    assert_eq!(verified.len(), 3);

    crawler.finish().await.unwrap();
}
