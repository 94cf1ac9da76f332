//! Per-host headless-mode learning.
//!
//! Some hosts reset plain HTTP connections (TLS fingerprinting, bot
//! walls) but serve a real browser fine. This manager counts
//! connection-reset-class failures in a rolling window and promotes a
//! host to the headless tier once the threshold is hit: straight to
//! `learned` when auto-approval is on, otherwise to `pending` for an
//! operator to confirm.
//!
//! State survives restarts through an atomically written JSON snapshot.

use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dashmap::DashMap;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::events::{EventBus, TaskEvent};

/// Host tier with respect to headless fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainTier {
    /// Operator pinned this host to headless.
    Manual,
    /// Auto-promoted: fetches go through the headless pool.
    Learned,
    /// Threshold hit but awaiting operator approval.
    Pending,
}

#[derive(Debug, Clone)]
pub struct DomainModeConfig {
    /// Rolling window for counting reset failures.
    pub auto_learn_window: Duration,
    /// Failures within the window that trigger promotion.
    pub auto_learn_threshold: u32,
    /// Promote straight to `learned` without operator approval.
    pub auto_approve: bool,
    /// Snapshot file location.
    pub state_path: PathBuf,
}

impl Default for DomainModeConfig {
    fn default() -> Self {
        Self {
            auto_learn_window: Duration::from_secs(300),
            auto_learn_threshold: 3,
            auto_approve: false,
            state_path: PathBuf::from("newsatlas-domain-modes.json"),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct HostRecord {
    tier: Option<DomainTier>,
    /// Failure timestamps (unix ms) inside the rolling window.
    failure_times: VecDeque<i64>,
    total_failures: u64,
    last_failure_at: Option<i64>,
}

/// Serialized snapshot shape.
#[derive(Debug, Serialize, Deserialize)]
struct HostSnapshot {
    tier: Option<DomainTier>,
    failure_count: u64,
    last_failure_at: Option<i64>,
    #[serde(default)]
    window_failures: Vec<i64>,
}

/// Tracks which hosts require headless fetching.
pub struct DomainModeManager {
    hosts: DashMap<String, HostRecord>,
    config: DomainModeConfig,
    bus: Arc<EventBus>,
}

impl DomainModeManager {
    /// Create a manager, restoring any persisted snapshot.
    pub fn load(config: DomainModeConfig, bus: Arc<EventBus>) -> Result<Self> {
        let hosts = DashMap::new();

        if config.state_path.exists() {
            let raw = std::fs::read_to_string(&config.state_path)
                .context("Failed to read domain-mode snapshot")?;
            match serde_json::from_str::<std::collections::HashMap<String, HostSnapshot>>(&raw) {
                Ok(snapshot) => {
                    for (host, entry) in snapshot {
                        hosts.insert(
                            host,
                            HostRecord {
                                tier: entry.tier,
                                failure_times: entry.window_failures.into(),
                                total_failures: entry.failure_count,
                                last_failure_at: entry.last_failure_at,
                            },
                        );
                    }
                }
                Err(e) => warn!("ignoring unreadable domain-mode snapshot: {e}"),
            }
        }

        Ok(Self {
            hosts,
            config,
            bus,
        })
    }

    /// Whether fetches to `host` should skip plain HTTP.
    #[must_use]
    pub fn should_use_headless(&self, host: &str) -> bool {
        self.hosts
            .get(host)
            .map(|r| matches!(r.tier, Some(DomainTier::Manual | DomainTier::Learned)))
            .unwrap_or(false)
    }

    #[must_use]
    pub fn tier(&self, host: &str) -> Option<DomainTier> {
        self.hosts.get(host).and_then(|r| r.tier)
    }

    /// Record a connection-reset-class failure. Returns the tier the
    /// host was promoted to, if this failure crossed the threshold.
    pub fn record_reset_failure(&self, host: &str) -> Option<DomainTier> {
        let now = chrono::Utc::now().timestamp_millis();
        let window_ms = self.config.auto_learn_window.as_millis() as i64;

        let mut record = self.hosts.entry(host.to_string()).or_default();
        record.failure_times.push_back(now);
        record.total_failures += 1;
        record.last_failure_at = Some(now);
        while let Some(&front) = record.failure_times.front() {
            if now - front > window_ms {
                record.failure_times.pop_front();
            } else {
                break;
            }
        }

        let in_window = record.failure_times.len() as u32;
        self.bus.publish(&TaskEvent::DomainFailureRecorded {
            host: host.to_string(),
            failures_in_window: in_window,
        });

        // Already promoted: nothing to do.
        if record.tier.is_some() {
            return None;
        }
        if in_window < self.config.auto_learn_threshold {
            return None;
        }

        let tier = if self.config.auto_approve {
            DomainTier::Learned
        } else {
            DomainTier::Pending
        };
        record.tier = Some(tier);
        drop(record);

        match tier {
            DomainTier::Learned => {
                info!("domain {host} auto-learned: routing through headless");
                self.bus.publish(&TaskEvent::DomainLearned {
                    host: host.to_string(),
                });
            }
            DomainTier::Pending => {
                info!("domain {host} pending headless approval after {in_window} resets");
                self.bus.publish(&TaskEvent::DomainPending {
                    host: host.to_string(),
                    failures: in_window,
                });
            }
            DomainTier::Manual => unreachable!("promotion never yields manual"),
        }

        if let Err(e) = self.persist() {
            warn!("failed to persist domain-mode state: {e:#}");
        }
        Some(tier)
    }

    /// Operator approval: pending → learned.
    pub fn approve(&self, host: &str) -> Result<()> {
        if let Some(mut record) = self.hosts.get_mut(host) {
            if record.tier == Some(DomainTier::Pending) {
                record.tier = Some(DomainTier::Learned);
                drop(record);
                self.bus.publish(&TaskEvent::DomainLearned {
                    host: host.to_string(),
                });
                self.persist()?;
            }
        }
        Ok(())
    }

    /// Operator pin: host always fetches headless.
    pub fn set_manual(&self, host: &str) -> Result<()> {
        self.hosts.entry(host.to_string()).or_default().tier = Some(DomainTier::Manual);
        self.persist()
    }

    /// Hosts awaiting approval.
    #[must_use]
    pub fn pending_hosts(&self) -> Vec<String> {
        self.hosts
            .iter()
            .filter(|e| e.value().tier == Some(DomainTier::Pending))
            .map(|e| e.key().clone())
            .collect()
    }

    /// Write the snapshot atomically (tempfile + rename).
    pub fn persist(&self) -> Result<()> {
        let snapshot: std::collections::HashMap<String, HostSnapshot> = self
            .hosts
            .iter()
            .map(|entry| {
                let record = entry.value();
                (
                    entry.key().clone(),
                    HostSnapshot {
                        tier: record.tier,
                        failure_count: record.total_failures,
                        last_failure_at: record.last_failure_at,
                        window_failures: record.failure_times.iter().copied().collect(),
                    },
                )
            })
            .collect();

        let json = serde_json::to_string_pretty(&snapshot)?;
        let dir = self
            .config
            .state_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| std::path::Path::new("."));
        std::fs::create_dir_all(dir).context("Failed to create snapshot directory")?;

        let mut tmp =
            tempfile::NamedTempFile::new_in(dir).context("Failed to create snapshot temp file")?;
        tmp.write_all(json.as_bytes())
            .context("Failed to write snapshot")?;
        tmp.persist(&self.config.state_path)
            .context("Failed to persist snapshot")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(auto_approve: bool, dir: &TempDir) -> DomainModeManager {
        let bus = EventBus::new("test", 64);
        DomainModeManager::load(
            DomainModeConfig {
                auto_learn_window: Duration::from_secs(300),
                auto_learn_threshold: 3,
                auto_approve,
                state_path: dir.path().join("modes.json"),
            },
            bus,
        )
        .unwrap()
    }

    #[test]
    fn test_promotes_to_learned_with_auto_approve() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(true, &dir);

        assert!(mgr.record_reset_failure("blocked.example.com").is_none());
        assert!(mgr.record_reset_failure("blocked.example.com").is_none());
        assert_eq!(
            mgr.record_reset_failure("blocked.example.com"),
            Some(DomainTier::Learned)
        );
        assert!(mgr.should_use_headless("blocked.example.com"));
    }

    #[test]
    fn test_promotes_to_pending_without_auto_approve() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(false, &dir);

        for _ in 0..3 {
            mgr.record_reset_failure("blocked.example.com");
        }
        assert!(!mgr.should_use_headless("blocked.example.com"));
        assert_eq!(
            mgr.pending_hosts(),
            vec!["blocked.example.com".to_string()]
        );

        mgr.approve("blocked.example.com").unwrap();
        assert!(mgr.should_use_headless("blocked.example.com"));
    }

    #[test]
    fn test_state_survives_restart() {
        let dir = TempDir::new().unwrap();
        {
            let mgr = manager(true, &dir);
            for _ in 0..3 {
                mgr.record_reset_failure("blocked.example.com");
            }
        }
        let restored = manager(true, &dir);
        assert!(restored.should_use_headless("blocked.example.com"));
    }

    #[test]
    fn test_unpromoted_hosts_stay_on_http() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(true, &dir);
        mgr.record_reset_failure("fine.example.com");
        assert!(!mgr.should_use_headless("fine.example.com"));
    }
}
