use std::time::Duration;

use anyhow::{Context, Result};
use log::info;
use serde_json::json;

use newsatlas::config::{apply_overrides, CrawlConfig, RunManifest};
use newsatlas::Crawler;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    manifest: RunManifest,
    start_urls: Vec<String>,
    sequence: Option<String>,
    shared_overrides: Option<String>,
    seed_from_cache: Vec<String>,
    max_age_hub_ms: Option<u64>,
    verbose: bool,
    check: bool,
    json: bool,
) -> Result<()> {
    let mut config = CrawlConfig::default();
    manifest.apply_to(&mut config);

    if let Some(name) = &sequence {
        let seq = manifest
            .sequences
            .get(name)
            .with_context(|| format!("unknown sequence: {name}"))?;
        config.start_urls.extend(seq.start_urls.clone());
        config.seed_from_cache.extend(seq.seed_from_cache.clone());
        if let Some(limit) = seq.page_limit {
            config.page_limit = Some(limit);
        }
    }

    config.start_urls.extend(start_urls);
    config.seed_from_cache.extend(seed_from_cache);
    if let Some(ms) = max_age_hub_ms {
        config.max_age_hub = Duration::from_millis(ms);
    }
    config.verbose = verbose;
    if let Some(overrides) = &shared_overrides {
        apply_overrides(&mut config, overrides)?;
    }

    if check {
        // Health probe: fail fast on bad config or unwritable storage.
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("configuration error: {e}"))?;
        let storage = newsatlas::Storage::open(&config.db_path).await?;
        storage.close().await;
        if json {
            println!("{}", json!({ "ok": true }));
        } else {
            println!("configuration and storage ok");
        }
        return Ok(());
    }

    if config.start_urls.is_empty() && config.seed_from_cache.is_empty() {
        anyhow::bail!("nothing to crawl: provide --start-url, --sequence or --seed-from-cache");
    }

    let crawler = Crawler::init(config).await?;

    // Ctrl-C trips the single cancellation signal.
    let shutdown = crawler.shutdown_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            shutdown.cancel();
        }
    });

    let summary = crawler.run().await?;
    crawler.finish().await?;

    if json {
        println!(
            "{}",
            json!({
                "pages_fetched": summary.pages_fetched,
                "cache_hits": summary.cache_hits,
                "duration_ms": summary.duration.as_millis() as u64,
            })
        );
    } else {
        println!(
            "crawl finished: {} pages fetched, {} cache hits, {:?}",
            summary.pages_fetched, summary.cache_hits, summary.duration
        );
    }
    Ok(())
}
