//! Aggregator: combines available stage outputs into one verdict with
//! provenance.
//!
//! Rules, in order:
//! - Only Stage 1 ran → return it.
//! - Stages 1 and 2 agree → the higher-confidence result wins.
//! - They disagree → content overrides iff its confidence beats the URL
//!   stage's by more than the override delta (0.15).
//! - Stage 3, when present, may override the interim verdict by the
//!   same delta rule.

use serde::{Deserialize, Serialize};

use super::{Classification, StageResult};

/// Content (or DOM) must beat the earlier verdict by this much to win a
/// disagreement.
pub const OVERRIDE_DELTA: f64 = 0.15;

/// Which stages contributed and which rule decided.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub url: Option<StageResult>,
    pub content: Option<StageResult>,
    pub dom: Option<StageResult>,
    /// Name of the rule that produced the final verdict.
    pub decided_by: String,
}

/// Final aggregated classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateResult {
    pub classification: Classification,
    pub confidence: f64,
    pub provenance: Provenance,
}

/// Combine stage outputs. At least `url_stage` must be present.
#[must_use]
pub fn aggregate(
    url_stage: StageResult,
    content_stage: Option<StageResult>,
    dom_stage: Option<StageResult>,
) -> AggregateResult {
    let (mut classification, mut confidence, mut decided_by) = match &content_stage {
        None => (
            url_stage.classification,
            url_stage.confidence,
            "url-only".to_string(),
        ),
        Some(content) => {
            if content.classification == url_stage.classification {
                if content.confidence >= url_stage.confidence {
                    (
                        content.classification,
                        content.confidence,
                        "agreement:content-confidence".to_string(),
                    )
                } else {
                    (
                        url_stage.classification,
                        url_stage.confidence,
                        "agreement:url-confidence".to_string(),
                    )
                }
            } else if content.confidence - url_stage.confidence > OVERRIDE_DELTA {
                (
                    content.classification,
                    content.confidence,
                    "content-override".to_string(),
                )
            } else {
                (
                    url_stage.classification,
                    url_stage.confidence,
                    "url-holds".to_string(),
                )
            }
        }
    };

    if let Some(dom) = &dom_stage {
        if dom.classification == classification {
            if dom.confidence > confidence {
                confidence = dom.confidence;
                decided_by = "dom-agreement".to_string();
            }
        } else if dom.confidence - confidence > OVERRIDE_DELTA {
            classification = dom.classification;
            confidence = dom.confidence;
            decided_by = "dom-override".to_string();
        }
    }

    AggregateResult {
        classification,
        confidence,
        provenance: Provenance {
            url: Some(url_stage),
            content: content_stage,
            dom: dom_stage,
            decided_by,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stage(classification: Classification, confidence: f64) -> StageResult {
        StageResult {
            classification,
            confidence,
            reason: "test".into(),
            signals: json!({}),
        }
    }

    #[test]
    fn test_url_only_passthrough() {
        let result = aggregate(stage(Classification::Hub, 0.8), None, None);
        assert_eq!(result.classification, Classification::Hub);
        assert_eq!(result.confidence, 0.8);
        assert_eq!(result.provenance.decided_by, "url-only");
    }

    #[test]
    fn test_agreement_takes_higher_confidence() {
        let result = aggregate(
            stage(Classification::Article, 0.95),
            Some(stage(Classification::Article, 0.85)),
            None,
        );
        assert_eq!(result.classification, Classification::Article);
        assert_eq!(result.confidence, 0.95);
    }

    #[test]
    fn test_content_overrides_with_sufficient_delta() {
        let result = aggregate(
            stage(Classification::Hub, 0.5),
            Some(stage(Classification::Article, 0.9)),
            None,
        );
        assert_eq!(result.classification, Classification::Article);
        assert_eq!(result.provenance.decided_by, "content-override");
    }

    #[test]
    fn test_url_holds_within_delta() {
        let result = aggregate(
            stage(Classification::Hub, 0.8),
            Some(stage(Classification::Article, 0.9)),
            None,
        );
        assert_eq!(result.classification, Classification::Hub);
        assert_eq!(result.provenance.decided_by, "url-holds");
    }

    #[test]
    fn test_dom_override() {
        let result = aggregate(
            stage(Classification::Hub, 0.6),
            Some(stage(Classification::Hub, 0.7)),
            Some(stage(Classification::Article, 0.95)),
        );
        assert_eq!(result.classification, Classification::Article);
        assert_eq!(result.provenance.decided_by, "dom-override");
    }

    #[test]
    fn test_verdict_always_from_a_stage() {
        let stages = [
            Classification::Article,
            Classification::Hub,
            Classification::Nav,
        ];
        for a in stages {
            for b in stages {
                let result =
                    aggregate(stage(a, 0.6), Some(stage(b, 0.75)), None);
                assert!(result.classification == a || result.classification == b);
            }
        }
    }
}
