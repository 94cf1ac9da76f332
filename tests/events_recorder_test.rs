//! Event bus → recorder → task_events round trip.

use std::time::Duration;

use newsatlas::events::{EventBus, EventRecorder, FetchSource, TaskEvent};
use newsatlas::storage::Storage;

#[tokio::test]
async fn events_flush_to_storage_in_order() {
    let storage = Storage::open_in_memory().await.unwrap();
    let bus = EventBus::new("run-42", 256);
    let recorder = EventRecorder::spawn_with(
        &bus,
        storage.clone(),
        10,
        Duration::from_millis(50),
    );

    for i in 0..5 {
        bus.publish(&TaskEvent::PageFetched {
            url: format!("https://example.com/story-{i}"),
            source: FetchSource::Network,
            http_status: 200,
            bytes: 1000 + i,
            download_ms: 30,
        });
    }
    bus.publish(&TaskEvent::BreakerOpen {
        host: "example.com".into(),
        consecutive_failures: 5,
    });

    recorder.finish().await;

    let all = storage.events_for_task("run-42", None, 100).await.unwrap();
    assert_eq!(all.len(), 6);
    // Per-writer order holds under the (emitted_at, seq) sort.
    let seqs: Vec<i64> = all.iter().map(|e| e.seq).collect();
    let mut sorted = seqs.clone();
    sorted.sort_unstable();
    assert_eq!(seqs, sorted);

    let pages = storage
        .events_for_task("run-42", Some("page.fetched"), 100)
        .await
        .unwrap();
    assert_eq!(pages.len(), 5);
    assert_eq!(pages[0].http_status, Some(200));
    assert!(pages[0].target.as_deref().unwrap().contains("story-0"));

    assert_eq!(
        storage.count_events("run-42", "breaker.open").await.unwrap(),
        1
    );
}

#[tokio::test]
async fn size_threshold_triggers_flush_before_timer() {
    let storage = Storage::open_in_memory().await.unwrap();
    let bus = EventBus::new("run-43", 256);
    // Tiny batch, long timer: only the size threshold can flush.
    let recorder = EventRecorder::spawn_with(
        &bus,
        storage.clone(),
        3,
        Duration::from_secs(3600),
    );

    for _ in 0..3 {
        bus.publish(&TaskEvent::BreakerClosed {
            host: "example.com".into(),
        });
    }

    // Give the recorder a moment to receive and flush the batch.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        storage
            .count_events("run-43", "breaker.closed")
            .await
            .unwrap(),
        3
    );
    recorder.finish().await;
}
