//! Pre-fetch URL classification predictor.
//!
//! Runs at discovery time, before any download, trying sources in
//! decreasing order of reliability:
//!
//! 1. learned per-host patterns (confidence is the pattern's accuracy)
//! 2. a structurally similar verified URL (0.7 x similarity)
//! 3. the host's verified-class profile (confidence tied to dominance)
//! 4. URL signals from Stage 1, capped at 0.45
//!
//! The chosen prediction is stored per `(url, source)`; when the URL is
//! later fetched and content-classified, [`verify`] closes the loop and
//! feeds accuracy back into any matched pattern.

use anyhow::Result;
use log::debug;

use super::signature::structural_similarity;
use super::url_stage::classify_url;
use super::Classification;
use crate::events::{EventBus, TaskEvent};
use crate::storage::{PredictionSource, Storage};

/// Patterns older than this have their prediction confidence damped.
const STALE_PATTERN_MS: i64 = 30 * 24 * 3600 * 1000;
const STALE_DAMPING: f64 = 0.9;

/// Confidence cap for the URL-signals fallback.
const URL_SIGNALS_CAP: f64 = 0.45;

/// A prediction ready for admission decisions.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub classification: Classification,
    pub confidence: f64,
    pub source: PredictionSource,
}

pub struct UrlPredictor {
    storage: Storage,
}

impl UrlPredictor {
    #[must_use]
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Predict a URL's classification and persist the prediction row.
    pub async fn predict(&self, url_id: i64, url: &str, host: &str) -> Result<Prediction> {
        let path = url::Url::parse(url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| "/".to_string());

        // 1. Learned patterns, best accuracy first.
        for pattern in self.storage.patterns_for_host(host).await? {
            let Ok(re) = regex::Regex::new(&pattern.template) else {
                continue;
            };
            if re.is_match(&path) {
                let mut confidence = pattern.accuracy;
                if let Some(verified_at) = pattern.last_verified_at {
                    let age = chrono::Utc::now().timestamp_millis() - verified_at;
                    if age > STALE_PATTERN_MS {
                        confidence *= STALE_DAMPING;
                    }
                }
                let classification = Classification::parse(&pattern.classification);
                self.storage
                    .upsert_prediction(
                        url_id,
                        classification.as_str(),
                        confidence,
                        PredictionSource::LearnedPattern,
                        Some(&pattern.template),
                        None,
                    )
                    .await?;
                debug!("predicted {url} as {} via pattern", classification.as_str());
                return Ok(Prediction {
                    classification,
                    confidence,
                    source: PredictionSource::LearnedPattern,
                });
            }
        }

        // 2. Structurally similar verified URL.
        let verified = self.storage.verified_urls_for_host(host).await?;
        let mut best: Option<(i64, f64, Classification)> = None;
        for (candidate_id, candidate_url, classification) in &verified {
            let candidate_path = url::Url::parse(candidate_url)
                .map(|u| u.path().to_string())
                .unwrap_or_default();
            let similarity = structural_similarity(&path, &candidate_path);
            if similarity > 0.5 && best.as_ref().map(|(_, s, _)| similarity > *s).unwrap_or(true) {
                best = Some((
                    *candidate_id,
                    similarity,
                    Classification::parse(classification),
                ));
            }
        }
        if let Some((similar_id, similarity, classification)) = best {
            let confidence = 0.7 * similarity;
            self.storage
                .upsert_prediction(
                    url_id,
                    classification.as_str(),
                    confidence,
                    PredictionSource::SimilarUrl,
                    None,
                    Some(similar_id),
                )
                .await?;
            return Ok(Prediction {
                classification,
                confidence,
                source: PredictionSource::SimilarUrl,
            });
        }

        // 3. Domain profile: dominant verified class on this host.
        if verified.len() >= 10 {
            let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
            for (_, _, classification) in &verified {
                *counts.entry(classification.as_str()).or_default() += 1;
            }
            if let Some((dominant, count)) = counts.into_iter().max_by_key(|(_, c)| *c) {
                let share = count as f64 / verified.len() as f64;
                if share >= 0.6 {
                    let confidence = 0.3 + 0.3 * share;
                    let classification = Classification::parse(dominant);
                    self.storage
                        .upsert_prediction(
                            url_id,
                            classification.as_str(),
                            confidence,
                            PredictionSource::DomainProfile,
                            None,
                            None,
                        )
                        .await?;
                    return Ok(Prediction {
                        classification,
                        confidence,
                        source: PredictionSource::DomainProfile,
                    });
                }
            }
        }

        // 4. URL signals.
        let stage = classify_url(url);
        let confidence = stage.confidence.min(URL_SIGNALS_CAP);
        self.storage
            .upsert_prediction(
                url_id,
                stage.classification.as_str(),
                confidence,
                PredictionSource::UrlSignals,
                None,
                None,
            )
            .await?;
        Ok(Prediction {
            classification: stage.classification,
            confidence,
            source: PredictionSource::UrlSignals,
        })
    }

    /// Close the loop after content classification: mark predictions
    /// verified and propagate accuracy into matched patterns.
    pub async fn verify(
        &self,
        url_id: i64,
        url: &str,
        host: &str,
        verified_classification: Classification,
        bus: &EventBus,
    ) -> Result<()> {
        let outcomes = self
            .storage
            .verify_predictions(url_id, verified_classification.as_str())
            .await?;
        if outcomes.is_empty() {
            return Ok(());
        }

        let any_match = outcomes.iter().any(|(_, correct)| *correct);
        bus.publish(&TaskEvent::PredictionVerified {
            url: url.to_string(),
            matched: any_match,
        });

        // Pattern accuracy update for the learned-pattern prediction.
        let path = url::Url::parse(url)
            .map(|u| u.path().to_string())
            .unwrap_or_default();
        for (source, correct) in outcomes {
            if source == "learned_pattern" {
                for pattern in self.storage.patterns_for_host(host).await? {
                    if regex::Regex::new(&pattern.template)
                        .map(|re| re.is_match(&path))
                        .unwrap_or(false)
                    {
                        self.storage
                            .record_pattern_verification(pattern.id, correct)
                            .await?;
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}
