use std::sync::Arc;

use anyhow::{Context, Result};

use newsatlas::api::{serve, ApiState};
use newsatlas::config::{CrawlConfig, RunManifest};
use newsatlas::{EventBus, Storage};

pub async fn run(manifest: RunManifest, addr: String) -> Result<()> {
    // The API layer speaks tracing; give it a subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    let mut config = CrawlConfig::default();
    manifest.apply_to(&mut config);

    let addr: std::net::SocketAddr = addr.parse().context("invalid listen address")?;
    let storage = Storage::open(&config.db_path).await?;
    let bus = EventBus::new(uuid::Uuid::new_v4().to_string(), 4096);

    let state = ApiState {
        storage,
        bus: Arc::clone(&bus),
    };
    serve(state, addr).await
}
