use anyhow::Result;
use serde_json::json;

use newsatlas::config::{CrawlConfig, RunManifest};
use newsatlas::Crawler;

pub async fn run(
    manifest: RunManifest,
    limit: i64,
    host: Option<String>,
    candidates: bool,
    json: bool,
) -> Result<()> {
    let mut config = CrawlConfig::default();
    manifest.apply_to(&mut config);

    let crawler = Crawler::init(config).await?;
    let shutdown = crawler.shutdown_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    let probed = if candidates {
        crawler.probe_candidates(limit).await?
    } else {
        crawler.probe_hub_depths(host.as_deref(), limit).await?
    };
    crawler.finish().await?;

    if json {
        println!("{}", json!({ "probed": probed }));
    } else {
        println!("probed {probed} hubs");
    }
    Ok(())
}
