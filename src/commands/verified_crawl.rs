//! Verified crawl: run to a target, then let the database do the
//! counting. The report always reflects `http_responses` rows, never
//! in-process counters. When the two disagree, that is the headline.

use std::time::Duration;

use anyhow::Result;
use serde_json::json;

use newsatlas::config::{CrawlConfig, RunManifest};
use newsatlas::Crawler;

pub async fn run(
    manifest: RunManifest,
    url: String,
    target: usize,
    timeout_ms: u64,
    json: bool,
) -> Result<()> {
    let mut config = CrawlConfig::default();
    manifest.apply_to(&mut config);
    config.start_urls = vec![url];
    config.page_limit = Some(target);

    let crawler = Crawler::init(config).await?;
    let storage = crawler.storage().clone();

    let baseline = storage.count_verified(None, None).await?;
    let run_start = chrono::Utc::now();

    let shutdown = crawler.shutdown_signal();
    let summary = tokio::select! {
        result = crawler.run() => result?,
        _ = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
            shutdown.cancel();
            newsatlas::CrawlSummary {
                pages_fetched: 0,
                cache_hits: 0,
                duration: Duration::from_millis(timeout_ms),
            }
        }
    };

    let run_end = chrono::Utc::now();
    let claimed = summary.pages_fetched as i64;
    let actual_window = storage
        .count_verified(
            Some(run_start.timestamp_millis()),
            Some(run_end.timestamp_millis()),
        )
        .await?;
    let total_after = storage.count_verified(None, None).await?;
    crawler.finish().await?;

    let discrepancy = claimed - actual_window;
    if json {
        println!(
            "{}",
            json!({
                "target": target,
                "claimed": claimed,
                "actual": actual_window,
                "discrepancy": discrepancy,
                "baseline": baseline,
                "total_after": total_after,
                "run_start": run_start.to_rfc3339(),
                "run_end": run_end.to_rfc3339(),
            })
        );
    } else {
        println!("verified crawl report");
        println!("  target:            {target}");
        println!("  claimed (counter): {claimed}");
        println!("  actual (database): {actual_window}");
        println!("  baseline before:   {baseline}");
        println!("  total after:       {total_after}");
        if discrepancy != 0 {
            println!(
                "  DISCREPANCY: in-process counter and http_responses \
                 rows differ by {discrepancy}; trust the database"
            );
        }
    }

    if actual_window < target as i64 {
        anyhow::bail!(
            "verified {actual_window} of {target} requested downloads"
        );
    }
    Ok(())
}
