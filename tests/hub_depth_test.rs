//! Depth-probe behavior against fixture hubs, including loopback.

mod common;

use mockito::Matcher;
use newsatlas::hub_depth::HubDepthProber;
use newsatlas::util::urls::extract_host;

/// Mount `?page=N` mocks for a hub where pages 1..=depth are valid and
/// deeper pages 404. Dates recede with page number so the time-travel
/// check stays quiet.
async fn mount_hub(server: &mut mockito::Server, depth: u32, ceiling: u32) {
    server
        .mock("GET", "/world/france")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(common::hub_page_body("2024-03-01", "2024-03-20", 1))
        .expect_at_least(1)
        .create_async()
        .await;

    for page in 2..=ceiling {
        let mock = server
            .mock("GET", "/world/france")
            .match_query(Matcher::UrlEncoded("page".into(), page.to_string()));
        if page <= depth {
            // Older content as pages deepen: ~10 days per page.
            let day = 20u32.saturating_sub(page.min(19));
            let date = format!("2024-02-{:02}", day.max(1));
            mock.with_status(200)
                .with_header("content-type", "text/html")
                .with_body(common::hub_page_body(&date, &date, page))
                .create_async()
                .await;
        } else {
            mock.with_status(404)
                .with_body("no such page")
                .create_async()
                .await;
        }
    }
}

#[tokio::test]
async fn finds_exact_depth_with_exponential_then_binary_search() {
    let mut server = mockito::Server::new_async().await;
    mount_hub(&mut server, 5, 32).await;

    let rig = common::build_rig().await;
    let base = format!("{}/world/france", server.url());
    let host = extract_host(&base).unwrap();

    let prober = HubDepthProber::new(&rig.pipeline, rig.shutdown.clone());
    let result = prober.probe(&base, &host).await.unwrap();

    assert_eq!(result.max_page_depth, 5);
    // Depth beyond page 1 always carries a content date.
    assert!(result.oldest_content_date.is_some());
    // Exponential (2,4,8) plus binary over (4,8] beats linear scanning.
    assert!(result.probes <= 9, "used {} probes", result.probes);
}

#[tokio::test]
async fn depth_one_when_page_two_is_missing() {
    let mut server = mockito::Server::new_async().await;
    mount_hub(&mut server, 1, 8).await;

    let rig = common::build_rig().await;
    let base = format!("{}/world/france", server.url());
    let host = extract_host(&base).unwrap();

    let prober = HubDepthProber::new(&rig.pipeline, rig.shutdown.clone());
    let result = prober.probe(&base, &host).await.unwrap();
    assert_eq!(result.max_page_depth, 1);
}

#[tokio::test]
async fn time_travel_check_rejects_silent_wraparound() {
    let mut server = mockito::Server::new_async().await;

    // Page 1 and page 2: normal, receding dates.
    server
        .mock("GET", "/world/spain")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(common::hub_page_body("2024-03-01", "2024-03-20", 1))
        .create_async()
        .await;
    server
        .mock("GET", "/world/spain")
        .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(common::hub_page_body("2024-02-10", "2024-02-20", 2))
        .create_async()
        .await;
    // Pages 3+: the site silently serves page-1 content again; the oldest
    // date jumps forward past the tolerance.
    server
        .mock("GET", "/world/spain")
        .match_query(Matcher::Regex("page=[3-9][0-9]*|page=1[0-9]+".into()))
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(common::hub_page_body("2024-03-01", "2024-03-20", 1))
        .expect_at_least(1)
        .create_async()
        .await;

    let rig = common::build_rig().await;
    let base = format!("{}/world/spain", server.url());
    let host = extract_host(&base).unwrap();

    let prober = HubDepthProber::new(&rig.pipeline, rig.shutdown.clone());
    let result = prober.probe(&base, &host).await.unwrap();

    // Page 4's wrapped content fails the time-travel check, so the
    // depth collapses to the last genuinely-older page.
    assert_eq!(result.max_page_depth, 2);
    let oldest = result.oldest_content_date.unwrap();
    assert_eq!(oldest.format("%Y-%m-%d").to_string(), "2024-02-10");
}

#[tokio::test]
async fn loopback_redirect_marks_page_bad() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/local/lyon")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(common::hub_page_body("2024-03-01", "2024-03-20", 1))
        .expect_at_least(1)
        .create_async()
        .await;
    // Every paginated request redirects straight back to page 1.
    server
        .mock("GET", "/local/lyon")
        .match_query(Matcher::Regex("page=\\d+".into()))
        .with_status(302)
        .with_header("location", "/local/lyon")
        .expect_at_least(1)
        .create_async()
        .await;

    let rig = common::build_rig().await;
    let base = format!("{}/local/lyon", server.url());
    let host = extract_host(&base).unwrap();

    let prober = HubDepthProber::new(&rig.pipeline, rig.shutdown.clone());
    let result = prober.probe(&base, &host).await.unwrap();
    assert_eq!(result.max_page_depth, 1);
}
