mod cli;
mod commands;

use clap::Parser;
use log::error;

use newsatlas::config::RunManifest;

use crate::cli::{Cli, Commands};

/// Exit codes: 0 success, 1 runtime failure, 2 configuration error.
const EXIT_RUNTIME: i32 = 1;
const EXIT_CONFIG: i32 = 2;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // --verbose restores the narration that compact PAGE lines replace.
    let default_filter = match &cli.command {
        Commands::Crawl { verbose: true, .. } => "debug",
        _ => "info",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let manifest = match RunManifest::resolve(cli.config.as_deref()) {
        Ok(manifest) => manifest,
        Err(e) => {
            error!("configuration error: {e:#}");
            std::process::exit(EXIT_CONFIG);
        }
    };

    let result = match cli.command {
        Commands::Crawl {
            start_url,
            sequence,
            shared_overrides,
            seed_from_cache,
            max_age_hub_ms,
            verbose,
            check,
        } => {
            commands::crawl::run(
                manifest,
                start_url,
                sequence,
                shared_overrides,
                seed_from_cache,
                max_age_hub_ms,
                verbose,
                check,
                cli.json,
            )
            .await
        }
        Commands::VerifiedCrawl {
            url,
            target,
            timeout,
        } => commands::verified_crawl::run(manifest, url, target, timeout, cli.json).await,
        Commands::ProbeHubDepth {
            limit,
            host,
            candidates,
        } => commands::probe::run(manifest, limit, host, candidates, cli.json).await,
        Commands::GuessPlaceHubs { domain, kinds } => {
            commands::hubs::run(manifest, domain, kinds, cli.json).await
        }
        Commands::CountDocCounts { threshold } => {
            commands::counts::run(manifest, threshold, cli.json).await
        }
        Commands::Serve { addr } => commands::serve::run(manifest, addr).await,
    };

    if let Err(e) = result {
        error!("{e:#}");
        let message = format!("{e:#}");
        // Argument/config mistakes exit 2; everything else exits 1.
        let code = if message.contains("unknown sequence")
            || message.contains("nothing to crawl")
            || message.contains("unknown place kind")
            || message.contains("invalid listen address")
            || message.contains("unknown override key")
            || message.contains("configuration error")
            || message.contains("invalid configuration")
            || message.contains("invalid start URL")
            || message.contains("--shared-overrides")
        {
            EXIT_CONFIG
        } else {
            EXIT_RUNTIME
        };
        std::process::exit(code);
    }
}
