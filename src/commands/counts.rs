use anyhow::Result;
use serde_json::json;

use newsatlas::config::{CrawlConfig, RunManifest};
use newsatlas::Storage;

pub async fn run(manifest: RunManifest, threshold: i64, json: bool) -> Result<()> {
    let mut config = CrawlConfig::default();
    manifest.apply_to(&mut config);

    let storage = Storage::open(&config.db_path).await?;
    let counts = storage.verified_counts_by_host(threshold).await?;
    let totals = storage.download_stats().await?;
    storage.close().await;

    if json {
        println!(
            "{}",
            json!({ "totals": totals, "byHost": counts })
        );
    } else {
        println!(
            "{} verified downloads across {} hosts",
            totals.verified_downloads, totals.distinct_hosts
        );
        for row in counts {
            println!("  {:>8}  {:>12}  {}", row.verified, row.bytes, row.host);
        }
    }
    Ok(())
}
