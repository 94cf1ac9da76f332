//! Three-stage classification cascade with provenance.
//!
//! Stage 1 reads only the URL (no I/O), Stage 2 reads parsed HTML
//! content signals, Stage 3 recomputes signals from a rendered DOM. The
//! aggregator combines whatever stages ran and records which rule
//! decided.

pub mod aggregate;
pub mod content_stage;
pub mod dom_stage;
pub mod pattern_learner;
pub mod predictor;
pub mod signature;
pub mod url_stage;

use serde::{Deserialize, Serialize};

pub use aggregate::{aggregate, AggregateResult, Provenance};
pub use content_stage::{classify_content, ContentSignals};
pub use dom_stage::classify_dom;
pub use pattern_learner::PatternLearner;
pub use predictor::UrlPredictor;
pub use signature::structural_signature;
pub use url_stage::classify_url;

/// The closed label set every stage draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Article,
    Hub,
    Nav,
    Other,
    Unknown,
}

impl Classification {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::Hub => "hub",
            Self::Nav => "nav",
            Self::Other => "other",
            Self::Unknown => "unknown",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "article" => Self::Article,
            "hub" => Self::Hub,
            "nav" => Self::Nav,
            "other" => Self::Other,
            _ => Self::Unknown,
        }
    }
}

/// Output of one cascade stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub classification: Classification,
    /// Confidence in [0, 1].
    pub confidence: f64,
    pub reason: String,
    /// Stage-specific measured signals, serialized for audit.
    pub signals: serde_json::Value,
}
