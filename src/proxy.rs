//! Proxy rotation configuration.
//!
//! Parsed and validated per the persisted-state contract; selection
//! strategies are implemented and tested, but the fetch path does not
//! consume proxies yet; integration waits on a proxy transport.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyProvider {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub auth: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RotationStrategy {
    RoundRobin,
    Priority,
    Random,
    LeastUsed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub providers: Vec<ProxyProvider>,
    pub strategy: RotationStrategy,
    #[serde(default = "default_ban_threshold")]
    pub ban_threshold_failures: u32,
    #[serde(default = "default_ban_duration_ms")]
    pub ban_duration_ms: u64,
}

fn default_ban_threshold() -> u32 {
    3
}

fn default_ban_duration_ms() -> u64 {
    600_000
}

impl ProxyConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read proxy config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid proxy config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for provider in &self.providers {
            if provider.host.is_empty() {
                anyhow::bail!("proxy provider {} has an empty host", provider.name);
            }
            if !matches!(provider.kind.as_str(), "http" | "https" | "socks5") {
                anyhow::bail!(
                    "proxy provider {} has unknown type {}",
                    provider.name,
                    provider.kind
                );
            }
        }
        Ok(())
    }
}

/// Holds rotation state; `select` picks the next provider.
pub struct ProxyManager {
    config: ProxyConfig,
    cursor: AtomicUsize,
    use_counts: parking_lot::Mutex<HashMap<String, u64>>,
}

impl ProxyManager {
    #[must_use]
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            config,
            cursor: AtomicUsize::new(0),
            use_counts: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Next enabled provider under the configured strategy, or None
    /// when no provider is enabled.
    pub fn select(&self) -> Option<ProxyProvider> {
        let enabled: Vec<&ProxyProvider> = self
            .config
            .providers
            .iter()
            .filter(|p| p.enabled)
            .collect();
        if enabled.is_empty() {
            return None;
        }

        let chosen = match self.config.strategy {
            RotationStrategy::RoundRobin => {
                let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % enabled.len();
                enabled[idx]
            }
            RotationStrategy::Priority => enabled
                .iter()
                .max_by_key(|p| p.priority)
                .copied()
                .expect("non-empty"),
            RotationStrategy::Random => {
                use rand::Rng;
                enabled[rand::rng().random_range(0..enabled.len())]
            }
            RotationStrategy::LeastUsed => {
                let counts = self.use_counts.lock();
                enabled
                    .iter()
                    .min_by_key(|p| counts.get(&p.name).copied().unwrap_or(0))
                    .copied()
                    .expect("non-empty")
            }
        };

        self.use_counts
            .lock()
            .entry(chosen.name.clone())
            .and_modify(|c| *c += 1)
            .or_insert(1);
        Some(chosen.clone())
    }
}
