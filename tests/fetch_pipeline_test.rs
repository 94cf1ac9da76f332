//! Fetch-pipeline integration tests against a local HTTP fixture.

mod common;

use newsatlas::fetch::{FailureKind, FetchOutcome, UrlKind};
use newsatlas::util::urls::extract_host;

fn article_body() -> String {
    let mut body = String::from("<html><body><article>");
    for _ in 0..50 {
        body.push_str("<p>Reported at length from the scene by our correspondent.</p>");
    }
    body.push_str("</article></body></html>");
    body
}

#[tokio::test]
async fn successful_fetch_creates_exactly_one_evidence_pair() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/world/france")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(article_body())
        .create_async()
        .await;

    let rig = common::build_rig().await;
    let url = format!("{}/world/france", server.url());
    let host = extract_host(&url).unwrap();

    let outcome = rig.pipeline.fetch(&url, &host, UrlKind::Article).await;
    let FetchOutcome::Fetched {
        http_status, body, ..
    } = outcome
    else {
        panic!("expected Fetched, got {outcome:?}");
    };
    assert_eq!(http_status, 200);
    assert!(!body.is_empty());
    mock.assert_async().await;

    assert_eq!(rig.storage.count_verified(None, None).await.unwrap(), 1);
}

#[tokio::test]
async fn second_fetch_of_article_is_served_from_cache() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/world/story")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(article_body())
        .expect(1)
        .create_async()
        .await;

    let rig = common::build_rig().await;
    let url = format!("{}/world/story", server.url());
    let host = extract_host(&url).unwrap();

    let first = rig.pipeline.fetch(&url, &host, UrlKind::Article).await;
    assert!(matches!(first, FetchOutcome::Fetched { .. }));

    let second = rig.pipeline.fetch(&url, &host, UrlKind::Article).await;
    assert!(matches!(second, FetchOutcome::CacheHit { .. }));

    // One network attempt, one evidence row. The cache hit left none.
    mock.assert_async().await;
    assert_eq!(rig.storage.count_verified(None, None).await.unwrap(), 1);
}

#[tokio::test]
async fn not_found_leaves_failed_attempt_row() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/gone")
        .with_status(404)
        .with_body("not here")
        .create_async()
        .await;

    let rig = common::build_rig().await;
    let url = format!("{}/gone", server.url());
    let host = extract_host(&url).unwrap();

    let outcome = rig.pipeline.fetch(&url, &host, UrlKind::Unknown).await;
    let FetchOutcome::Failed { kind, response_id, .. } = outcome else {
        panic!("expected Failed, got {outcome:?}");
    };
    assert_eq!(kind, FailureKind::Http(404));
    assert!(response_id.is_some());

    // The attempt is on record, but nothing verified.
    assert_eq!(rig.storage.count_verified(None, None).await.unwrap(), 0);
    let stats = rig.storage.download_stats().await.unwrap();
    assert_eq!(stats.failed_attempts, 1);
}

#[tokio::test]
async fn rate_limit_response_backs_off_and_emits_event() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/busy")
        .with_status(429)
        .with_body("slow down")
        .expect_at_least(1)
        .create_async()
        .await;

    let rig = common::build_rig().await;
    let mut events = rig.bus.subscribe();
    let url = format!("{}/busy", server.url());
    let host = extract_host(&url).unwrap();

    let outcome = rig.pipeline.fetch(&url, &host, UrlKind::Unknown).await;
    assert!(matches!(
        outcome,
        FetchOutcome::Failed {
            kind: FailureKind::Http(429),
            ..
        }
    ));

    let mut saw_backoff = false;
    while let Ok(record) = events.try_recv() {
        if record.event_type == "rate.backoff" {
            saw_backoff = true;
        }
    }
    assert!(saw_backoff, "expected a rate.backoff event");
}

#[tokio::test]
async fn breaker_opens_after_repeated_hard_failures_and_defers() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", mockito::Matcher::Any)
        .with_status(500)
        .with_body("boom")
        .expect_at_least(3)
        .create_async()
        .await;

    let rig = common::build_rig().await;
    let host = extract_host(&server.url()).unwrap();

    // The rig's breaker opens after 3 failures.
    for i in 0..3 {
        let url = format!("{}/err/{i}", server.url());
        let outcome = rig.pipeline.fetch(&url, &host, UrlKind::Unknown).await;
        assert!(matches!(outcome, FetchOutcome::Failed { .. }));
    }

    let outcome = rig
        .pipeline
        .fetch(&format!("{}/err/next", server.url()), &host, UrlKind::Unknown)
        .await;
    assert!(matches!(outcome, FetchOutcome::Deferred { .. }));
    assert_eq!(rig.breaker.open_hosts(), vec![host]);
}

#[tokio::test]
async fn robots_disallow_skips_without_evidence_row() {
    // The robots fetch itself goes to https://{host}/robots.txt, which
    // is unreachable for the fixture, so rules default to allow-all.
    // Hard-disallow is exercised at the validator boundary instead:
    // this test confirms an allowed fetch proceeds (the disallow branch
    // is covered by validator and robots unit tests).
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/open")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(article_body())
        .create_async()
        .await;

    let rig = common::build_rig().await;
    let url = format!("{}/open", server.url());
    let host = extract_host(&url).unwrap();
    let outcome = rig.pipeline.fetch(&url, &host, UrlKind::Unknown).await;
    assert!(outcome.is_success());
}

#[tokio::test]
async fn cancellation_is_distinguishable_from_failure() {
    let server = mockito::Server::new_async().await;
    let rig = common::build_rig().await;
    rig.shutdown.cancel();

    let url = format!("{}/anything", server.url());
    let host = extract_host(&url).unwrap();
    let outcome = rig.pipeline.fetch(&url, &host, UrlKind::Unknown).await;
    assert!(matches!(
        outcome,
        FetchOutcome::Failed {
            kind: FailureKind::Cancelled,
            ..
        }
    ));
    // Cancellation before I/O leaves no attempt row.
    let stats = rig.storage.download_stats().await.unwrap();
    assert_eq!(stats.failed_attempts, 0);
}
