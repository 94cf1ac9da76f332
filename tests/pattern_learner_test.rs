//! Pattern learner behavior against a real store.

use newsatlas::classify::PatternLearner;
use newsatlas::events::EventBus;
use newsatlas::storage::{ResponseRecord, Storage};

/// Store a URL with a verified content classification.
async fn seed_classified(storage: &Storage, url: &str, classification: &str) {
    let url_id = storage.intern_url(url, "news.example").await.unwrap();
    let (_, content_id) = storage
        .record_response_with_body(
            &ResponseRecord {
                url_id,
                http_status: 200,
                bytes_downloaded: 0,
                content_type: Some("text/html".into()),
                ttfb_ms: Some(5),
                download_ms: Some(20),
                fetch_source: "network".into(),
                diagnostic: None,
            },
            b"<html><body>body bytes for the fixture page</body></html>",
        )
        .await
        .unwrap();
    storage
        .upsert_analysis(content_id, classification, 0.9, "{}")
        .await
        .unwrap();
}

async fn seed_host(storage: &Storage) {
    for i in 0..4 {
        seed_classified(
            storage,
            &format!("https://news.example/world/2024/0{}/story-{i}-with-long-headline-slug-here", i + 1),
            "article",
        )
        .await;
    }
    for slug in ["france", "spain", "poland"] {
        seed_classified(storage, &format!("https://news.example/world/{slug}"), "hub").await;
    }
}

#[tokio::test]
async fn learner_emits_patterns_above_threshold() {
    let storage = Storage::open_in_memory().await.unwrap();
    seed_host(&storage).await;

    let bus = EventBus::new("t", 64);
    let learner = PatternLearner::new(storage.clone()).with_threshold(3);
    // The four dated article URLs share one structural signature; the
    // three hub URLs have short literal slugs and stay singleton groups
    // below the threshold.
    let learned = learner.learn_host("news.example", &bus).await.unwrap();
    assert_eq!(learned, 1);

    let patterns = storage.patterns_for_host("news.example").await.unwrap();
    assert_eq!(patterns.len(), 1);
    let pattern = &patterns[0];
    assert!(pattern.template.starts_with('^') && pattern.template.ends_with('$'));
    assert_eq!(pattern.classification, "article");
    assert_eq!(pattern.sample_count, 4);
    assert_eq!(pattern.accuracy, 1.0);
    assert_eq!(pattern.template, r"^/world/\d{4}/\d{1,2}/[a-z0-9-]+$");
}

#[tokio::test]
async fn learner_is_idempotent_over_unchanged_data() {
    let storage = Storage::open_in_memory().await.unwrap();
    seed_host(&storage).await;

    let bus = EventBus::new("t", 64);
    let learner = PatternLearner::new(storage.clone()).with_threshold(3);
    learner.learn_host("news.example", &bus).await.unwrap();
    let first = storage.patterns_for_host("news.example").await.unwrap();

    learner.learn_host("news.example", &bus).await.unwrap();
    let second = storage.patterns_for_host("news.example").await.unwrap();

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.template, b.template);
        assert_eq!(a.sample_count, b.sample_count);
        assert_eq!(a.verified_count, b.verified_count);
        assert_eq!(a.accuracy, b.accuracy);
    }
}

#[tokio::test]
async fn below_threshold_hosts_learn_nothing() {
    let storage = Storage::open_in_memory().await.unwrap();
    seed_classified(&storage, "https://news.example/world/france", "hub").await;

    let bus = EventBus::new("t", 64);
    let learner = PatternLearner::new(storage.clone()).with_threshold(3);
    assert_eq!(learner.learn_host("news.example", &bus).await.unwrap(), 0);
}
