//! Plain-HTTP fetch with TTFB and download timing.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};

/// Raw result of an HTTP fetch, before validation.
#[derive(Debug)]
pub struct HttpFetchResult {
    pub http_status: u16,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub final_url: String,
    pub ttfb_ms: i64,
    pub download_ms: i64,
}

/// Build the shared client used for page fetches, robots and probes.
pub fn build_client(user_agent: &str, timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .context("Failed to build HTTP client")
}

/// Execute one GET, separating time-to-first-byte from body download.
///
/// Transport errors surface as `reqwest::Error` for the caller to
/// classify; HTTP error statuses come back as a normal result.
pub async fn fetch_url(
    client: &reqwest::Client,
    url: &str,
) -> std::result::Result<HttpFetchResult, reqwest::Error> {
    let started = Instant::now();
    let response = client.get(url).send().await?;
    let ttfb_ms = started.elapsed().as_millis() as i64;

    let http_status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let final_url = response.url().to_string();

    let body_started = Instant::now();
    let body = response.bytes().await?.to_vec();
    let download_ms = body_started.elapsed().as_millis() as i64;

    Ok(HttpFetchResult {
        http_status,
        body,
        content_type,
        final_url,
        ttfb_ms,
        download_ms,
    })
}
