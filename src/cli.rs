use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "newsatlas",
    about = "Place-aware news crawler: hub discovery, depth probing, evidence-backed archiving"
)]
pub struct Cli {
    /// Path to a run-manifest file (overrides newsatlas.toml / env)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Machine-readable JSON output
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the main crawler
    Crawl {
        /// Seed URL (repeatable)
        #[arg(long)]
        start_url: Vec<String>,

        /// Named sequence from the run manifest
        #[arg(long)]
        sequence: Option<String>,

        /// Shallow JSON overrides, e.g. '{"workers": 8}'
        #[arg(long)]
        shared_overrides: Option<String>,

        /// Replay cached pages for these hosts instead of fetching
        #[arg(long, value_delimiter = ',')]
        seed_from_cache: Vec<String>,

        /// Cache freshness bound for hub pages, in milliseconds
        #[arg(long)]
        max_age_hub_ms: Option<u64>,

        /// Emit narration beyond the compact PAGE lines
        #[arg(long)]
        verbose: bool,

        /// Validate configuration and storage access, then exit
        #[arg(long)]
        check: bool,
    },
    /// Crawl until N downloads verify against the store, then report
    VerifiedCrawl {
        /// Seed URL
        url: String,

        /// Verified downloads to reach
        #[arg(long)]
        target: usize,

        /// Give up after this long
        #[arg(long, default_value = "600000")]
        timeout: u64,
    },
    /// Probe pagination depth on verified hubs
    ProbeHubDepth {
        /// Maximum hubs to probe
        #[arg(long, default_value = "20")]
        limit: i64,

        /// Restrict to one host
        #[arg(long)]
        host: Option<String>,

        /// Probe candidate mappings instead of verified hubs
        #[arg(long)]
        candidates: bool,
    },
    /// Emit candidate hub mappings from learned patterns + gazetteer
    GuessPlaceHubs {
        /// Host to generate candidates for
        #[arg(long)]
        domain: String,

        /// Place kinds (country,adm1,adm2,city)
        #[arg(long, value_delimiter = ',')]
        kinds: Vec<String>,
    },
    /// Report per-domain verified-download counts
    CountDocCounts {
        /// Only show domains at or above this count
        #[arg(long, default_value = "1")]
        threshold: i64,
    },
    /// Serve the HTTP control surface
    Serve {
        /// Listen address
        #[arg(long, default_value = "127.0.0.1:4550")]
        addr: String,
    },
}
