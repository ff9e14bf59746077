//! Fusion strategies

use mafl_common::SimilarityMetric;
use serde::Serialize;
use std::fmt;

/// How a target's contributing templates are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FusionStrategy {
    /// Every template in library order
    Majority,
    /// The `n` templates scoring highest against the target under `metric`
    TopN { metric: SimilarityMetric, n: usize },
}

impl FusionStrategy {
    /// Directory name under the fusion output root
    pub fn dir_name(&self) -> &'static str {
        match self {
            FusionStrategy::Majority => "majvote",
            FusionStrategy::TopN { metric, .. } => metric.name(),
        }
    }

    /// Metric whose score table this strategy needs, if any
    pub fn metric(&self) -> Option<SimilarityMetric> {
        match self {
            FusionStrategy::Majority => None,
            FusionStrategy::TopN { metric, .. } => Some(*metric),
        }
    }
}

impl fmt::Display for FusionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FusionStrategy::Majority => f.write_str("majvote"),
            FusionStrategy::TopN { metric, n } => write!(f, "{}:top{}", metric, n),
        }
    }
}
