//! Control-surface integration: real listener, real store.

use std::sync::Arc;

use newsatlas::api::{router, ApiState};
use newsatlas::events::EventBus;
use newsatlas::storage::{PageKind, Presence, ResponseRecord, Storage};

async fn spawn_api(storage: Storage) -> String {
    let bus = EventBus::new("api-test", 256);
    let app = router(ApiState {
        storage,
        bus: Arc::clone(&bus),
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    format!("http://{addr}")
}

async fn seed_downloads(storage: &Storage, n: usize) {
    for i in 0..n {
        let url_id = storage
            .intern_url(
                &format!("https://example.com/world/story-{i}"),
                "example.com",
            )
            .await
            .unwrap();
        storage
            .record_response_with_body(
                &ResponseRecord {
                    url_id,
                    http_status: 200,
                    bytes_downloaded: 0,
                    content_type: Some("text/html".into()),
                    ttfb_ms: Some(10),
                    download_ms: Some(50),
                    fetch_source: "network".into(),
                    diagnostic: None,
                },
                b"<html><body>story body with enough bytes</body></html>",
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn download_stats_reflect_evidence_rows() {
    let storage = Storage::open_in_memory().await.unwrap();
    seed_downloads(&storage, 3).await;
    let base = spawn_api(storage).await;

    let stats: serde_json::Value = reqwest::get(format!("{base}/api/downloads/stats"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["verified_downloads"], 3);
    assert_eq!(stats["distinct_hosts"], 1);
}

#[tokio::test]
async fn verify_endpoint_reports_discrepancy() {
    let storage = Storage::open_in_memory().await.unwrap();
    let start = chrono::Utc::now() - chrono::Duration::minutes(1);
    seed_downloads(&storage, 2).await;
    let end = chrono::Utc::now() + chrono::Duration::minutes(1);
    let base = spawn_api(storage).await;

    let url = format!(
        "{base}/api/downloads/verify?start={}&end={}&claimed=5",
        urlencoding::encode(&start.to_rfc3339()),
        urlencoding::encode(&end.to_rfc3339()),
    );
    let report: serde_json::Value = reqwest::get(url).await.unwrap().json().await.unwrap();
    assert_eq!(report["actual"], 2);
    assert_eq!(report["claimed"], 5);
    assert_eq!(report["discrepancy"], 3);
    assert_eq!(report["valid"], false);
}

#[tokio::test]
async fn hub_listing_returns_verified_hubs_only() {
    let storage = Storage::open_in_memory().await.unwrap();
    let verified_id = storage
        .insert_candidate_mapping(
            1,
            "example.com",
            "https://example.com/world/france",
            PageKind::CountryHub,
            None,
            0.9,
        )
        .await
        .unwrap();
    storage
        .verify_mapping(verified_id, Presence::Present)
        .await
        .unwrap();
    storage
        .insert_candidate_mapping(
            2,
            "example.com",
            "https://example.com/world/atlantis",
            PageKind::CountryHub,
            None,
            0.2,
        )
        .await
        .unwrap();

    let base = spawn_api(storage).await;
    let response: serde_json::Value = reqwest::get(format!("{base}/api/hub-archive/hubs"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let hubs = response["hubs"].as_array().unwrap();
    assert_eq!(hubs.len(), 1);
    assert_eq!(hubs[0]["url"], "https://example.com/world/france");
    assert_eq!(hubs[0]["presence"], "present");
}

#[tokio::test]
async fn range_endpoint_rejects_bad_timestamps_gracefully() {
    let storage = Storage::open_in_memory().await.unwrap();
    let base = spawn_api(storage).await;

    let status = reqwest::get(format!(
        "{base}/api/downloads/range?start=yesterday&end=today"
    ))
    .await
    .unwrap()
    .status();
    assert_eq!(status.as_u16(), 500);
}
