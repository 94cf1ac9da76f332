//! Run manifest: TOML file describing crawl sequences and defaults.
//!
//! Resolution order: conventional path (`newsatlas.toml` in the working
//! directory) → explicit `--config` path → `NEWSATLAS_CONFIG` env var,
//! later sources winning. CLI overrides merge shallowly on top via
//! [`apply_overrides`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::types::CrawlConfig;

pub const CONVENTIONAL_PATH: &str = "newsatlas.toml";
pub const ENV_VAR: &str = "NEWSATLAS_CONFIG";

/// A named crawl sequence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sequence {
    pub start_urls: Vec<String>,
    #[serde(default)]
    pub seed_from_cache: Vec<String>,
    pub page_limit: Option<usize>,
}

/// Manifest file shape. Every field optional; anything absent keeps the
/// built-in default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunManifest {
    pub db_path: Option<PathBuf>,
    pub workers: Option<usize>,
    pub politeness_min_delay_ms: Option<u64>,
    pub max_age_hub_ms: Option<u64>,
    pub domain_auto_approve: Option<bool>,
    pub gazetteer_path: Option<PathBuf>,
    pub proxy_config_path: Option<PathBuf>,
    #[serde(default)]
    pub sequences: HashMap<String, Sequence>,
}

impl RunManifest {
    /// Load the manifest using the resolution order above. A missing
    /// file at every location yields the empty manifest.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let mut manifest = RunManifest::default();

        let conventional = Path::new(CONVENTIONAL_PATH);
        if conventional.exists() {
            manifest = Self::load(conventional)?;
        }
        if let Some(path) = explicit {
            manifest = Self::load(path)?;
        } else if let Ok(env_path) = std::env::var(ENV_VAR) {
            let env_path = Path::new(&env_path);
            if env_path.exists() {
                manifest = Self::load(env_path)?;
            }
        }
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Invalid manifest {}", path.display()))
    }

    /// Fold manifest values into a config (manifest wins over defaults,
    /// loses to CLI flags applied afterwards).
    pub fn apply_to(&self, config: &mut CrawlConfig) {
        if let Some(db_path) = &self.db_path {
            config.db_path = db_path.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(ms) = self.politeness_min_delay_ms {
            config.politeness_min_delay = std::time::Duration::from_millis(ms);
        }
        if let Some(ms) = self.max_age_hub_ms {
            config.max_age_hub = std::time::Duration::from_millis(ms);
        }
        if let Some(auto) = self.domain_auto_approve {
            config.domain_auto_approve = auto;
        }
        if let Some(path) = &self.gazetteer_path {
            config.gazetteer_path = Some(path.clone());
        }
        if let Some(path) = &self.proxy_config_path {
            config.proxy_config_path = Some(path.clone());
        }
    }
}

/// Shallow-merge a JSON object of overrides (`--shared-overrides`) into
/// the config. Unknown keys error so typos fail fast.
pub fn apply_overrides(config: &mut CrawlConfig, overrides_json: &str) -> Result<()> {
    let overrides: serde_json::Value =
        serde_json::from_str(overrides_json).context("--shared-overrides is not valid JSON")?;
    let object = overrides
        .as_object()
        .context("--shared-overrides must be a JSON object")?;

    for (key, value) in object {
        match key.as_str() {
            "workers" => {
                config.workers = value
                    .as_u64()
                    .context("workers must be a number")? as usize;
            }
            "page_limit" => {
                config.page_limit = value.as_u64().map(|v| v as usize);
            }
            "politeness_min_delay_ms" => {
                let ms = value
                    .as_u64()
                    .context("politeness_min_delay_ms must be a number")?;
                config.politeness_min_delay = std::time::Duration::from_millis(ms);
            }
            "max_age_hub_ms" => {
                let ms = value.as_u64().context("max_age_hub_ms must be a number")?;
                config.max_age_hub = std::time::Duration::from_millis(ms);
            }
            "domain_auto_approve" => {
                config.domain_auto_approve = value
                    .as_bool()
                    .context("domain_auto_approve must be a boolean")?;
            }
            "verbose" => {
                config.verbose = value.as_bool().context("verbose must be a boolean")?;
            }
            other => anyhow::bail!("unknown override key: {other}"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_parse_and_apply() {
        let manifest: RunManifest = toml::from_str(
            r#"
            workers = 8
            max_age_hub_ms = 30000

            [sequences.europe]
            start_urls = ["https://www.theguardian.com/world/europe-news"]
            page_limit = 100
            "#,
        )
        .unwrap();

        let mut config = CrawlConfig::default();
        manifest.apply_to(&mut config);
        assert_eq!(config.workers, 8);
        assert_eq!(config.max_age_hub.as_millis(), 30000);
        assert_eq!(manifest.sequences["europe"].page_limit, Some(100));
    }

    #[test]
    fn test_overrides_shallow_merge() {
        let mut config = CrawlConfig::default();
        apply_overrides(&mut config, r#"{"workers": 2, "verbose": true}"#).unwrap();
        assert_eq!(config.workers, 2);
        assert!(config.verbose);
    }

    #[test]
    fn test_unknown_override_key_fails() {
        let mut config = CrawlConfig::default();
        assert!(apply_overrides(&mut config, r#"{"wrokers": 2}"#).is_err());
    }
}
