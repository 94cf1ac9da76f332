//! Periodic batch learner for per-host URL patterns.
//!
//! Groups a host's verified-classified URLs by structural signature and
//! upserts one pattern per group that clears the sample threshold. The
//! pattern predicts the group's majority classification;
//! `accuracy = majority / total` within the group. Because counts and
//! accuracy are recomputed from scratch each run, the learner is
//! idempotent over unchanged data.

use std::collections::HashMap;

use anyhow::Result;
use log::info;

use super::signature::structural_signature;
use crate::events::{EventBus, TaskEvent};
use crate::storage::Storage;

/// Minimum verified URLs in a group before a pattern is emitted.
pub const DEFAULT_SAMPLE_THRESHOLD: usize = 3;

pub struct PatternLearner {
    storage: Storage,
    sample_threshold: usize,
}

/// One learned pattern, pre-upsert (exposed for tests).
#[derive(Debug, Clone, PartialEq)]
pub struct LearnedPattern {
    pub template: String,
    pub classification: String,
    pub sample_count: usize,
    pub verified_count: usize,
    pub accuracy: f64,
}

impl PatternLearner {
    #[must_use]
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            sample_threshold: DEFAULT_SAMPLE_THRESHOLD,
        }
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.sample_threshold = threshold.max(1);
        self
    }

    /// Derive patterns from (url, verified classification) pairs.
    /// Pure function of its input; ordering of input does not matter.
    #[must_use]
    pub fn derive_patterns(
        samples: &[(String, String)],
        sample_threshold: usize,
    ) -> Vec<LearnedPattern> {
        let mut groups: HashMap<String, Vec<&str>> = HashMap::new();
        for (url, classification) in samples {
            let path = url::Url::parse(url)
                .map(|u| u.path().to_string())
                .unwrap_or_else(|_| url.clone());
            groups
                .entry(structural_signature(&path))
                .or_default()
                .push(classification.as_str());
        }

        let mut patterns: Vec<LearnedPattern> = groups
            .into_iter()
            .filter(|(_, members)| members.len() >= sample_threshold)
            .map(|(template, members)| {
                let mut counts: HashMap<&str, usize> = HashMap::new();
                for class in &members {
                    *counts.entry(*class).or_default() += 1;
                }
                let (majority, majority_count) = counts
                    .into_iter()
                    .max_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(b.0)))
                    .unwrap_or(("unknown", 0));
                let total = members.len();
                LearnedPattern {
                    template,
                    classification: majority.to_string(),
                    sample_count: total,
                    verified_count: total,
                    accuracy: majority_count as f64 / total as f64,
                }
            })
            .collect();

        // Deterministic output order makes repeated runs comparable.
        patterns.sort_by(|a, b| a.template.cmp(&b.template));
        patterns
    }

    /// Learn patterns for one host and upsert them.
    pub async fn learn_host(&self, host: &str, bus: &EventBus) -> Result<usize> {
        let verified = self.storage.verified_classifications_for_host(host).await?;
        let samples: Vec<(String, String)> = verified
            .into_iter()
            .map(|(_, url, classification)| (url, classification))
            .collect();

        if samples.len() < self.sample_threshold {
            return Ok(0);
        }

        let patterns = Self::derive_patterns(&samples, self.sample_threshold);
        let count = patterns.len();
        for pattern in &patterns {
            debug_assert!(pattern.accuracy <= 1.0);
            self.storage
                .upsert_pattern(
                    host,
                    &pattern.template,
                    &pattern.classification,
                    pattern.sample_count as i64,
                    pattern.verified_count as i64,
                    pattern.accuracy,
                )
                .await?;
        }

        if count > 0 {
            info!("learned {count} URL patterns for {host}");
            bus.publish(&TaskEvent::PatternsLearned {
                host: host.to_string(),
                patterns: count as u64,
            });
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<(String, String)> {
        vec![
            (
                "https://h.example/world/2024/01/story-one-long-enough-to-collapse".into(),
                "article".into(),
            ),
            (
                "https://h.example/world/2024/02/story-two-long-enough-to-collapse".into(),
                "article".into(),
            ),
            (
                "https://h.example/world/2023/11/story-three-long-enough-to-collapse".into(),
                "article".into(),
            ),
            (
                "https://h.example/world/2023/12/outlier-hub-page-long-enough-slug".into(),
                "hub".into(),
            ),
            ("https://h.example/world/france".into(), "hub".into()),
            ("https://h.example/world/spain".into(), "hub".into()),
        ]
    }

    #[test]
    fn test_groups_by_signature_and_takes_majority() {
        let patterns = PatternLearner::derive_patterns(&samples(), 3);
        let dated = patterns
            .iter()
            .find(|p| p.template.contains(r"\d{4}"))
            .unwrap();
        assert_eq!(dated.classification, "article");
        assert_eq!(dated.sample_count, 4);
        assert_eq!(dated.accuracy, 0.75);
    }

    #[test]
    fn test_threshold_filters_small_groups() {
        let patterns = PatternLearner::derive_patterns(&samples(), 3);
        // /world/{literal} group has only 2 members.
        assert!(patterns.iter().all(|p| p.sample_count >= 3));
    }

    #[test]
    fn test_all_templates_anchored() {
        for pattern in PatternLearner::derive_patterns(&samples(), 1) {
            assert!(pattern.template.starts_with('^'), "{}", pattern.template);
            assert!(pattern.template.ends_with('$'), "{}", pattern.template);
        }
    }

    #[test]
    fn test_accuracy_never_exceeds_one() {
        for pattern in PatternLearner::derive_patterns(&samples(), 1) {
            assert!(pattern.accuracy <= 1.0);
            assert!(pattern.accuracy > 0.0);
        }
    }

    #[test]
    fn test_idempotent_over_same_input() {
        let a = PatternLearner::derive_patterns(&samples(), 3);
        let b = PatternLearner::derive_patterns(&samples(), 3);
        assert_eq!(a, b);
    }
}
