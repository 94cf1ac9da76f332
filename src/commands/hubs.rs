use anyhow::Result;
use serde_json::json;

use newsatlas::config::{CrawlConfig, RunManifest};
use newsatlas::gazetteer::PlaceKind;
use newsatlas::Crawler;

pub async fn run(
    manifest: RunManifest,
    domain: String,
    kind_names: Vec<String>,
    json: bool,
) -> Result<()> {
    let mut kinds = Vec::new();
    for name in &kind_names {
        match PlaceKind::parse(name) {
            Some(kind) => kinds.push(kind),
            None => anyhow::bail!("unknown place kind: {name}"),
        }
    }

    let mut config = CrawlConfig::default();
    manifest.apply_to(&mut config);

    let crawler = Crawler::init(config).await?;
    let seeded = crawler.guess_place_hubs(&domain, &kinds).await?;
    crawler.finish().await?;

    if json {
        println!("{}", json!({ "domain": domain, "candidates": seeded }));
    } else {
        println!("seeded {seeded} candidate hub mappings for {domain}");
    }
    Ok(())
}
