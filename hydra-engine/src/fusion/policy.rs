// Fusion policy - ordered (source, threshold) rules, first match wins
//
// Default order:
//   1. remote vision, confidence > 0.5
//   2. local model, any confidence
//   3. simulated, any confidence
// Adding an estimator means adding a rule, not another branch.

use super::{FusedEstimate, LowConfidenceWarning};
use crate::types::{BottleEstimate, Confidence, EstimateSource, ScanMode};
use hydra_common::config::FusionConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default confidence cut-off (remote precedence and low-confidence warning)
pub const DEFAULT_CONFIDENCE_THRESHOLD: Confidence = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Threshold {
    Any,
    /// Strictly greater than
    Above(Confidence),
    /// Greater than or equal
    AtLeast(Confidence),
}

impl Threshold {
    pub fn admits(&self, confidence: Confidence) -> bool {
        match *self {
            Threshold::Any => true,
            Threshold::Above(min) => confidence > min,
            Threshold::AtLeast(min) => confidence >= min,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionRule {
    pub source: EstimateSource,
    pub threshold: Threshold,
}

impl FusionRule {
    pub fn new(source: EstimateSource, threshold: Threshold) -> Self {
        Self { source, threshold }
    }

    pub fn matches(&self, estimate: &BottleEstimate) -> bool {
        estimate.source == self.source && self.threshold.admits(estimate.confidence)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FusionPolicy {
    rules: Vec<FusionRule>,
    low_confidence_threshold: Confidence,
}

impl Default for FusionPolicy {
    fn default() -> Self {
        Self::with_thresholds(DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_CONFIDENCE_THRESHOLD)
    }
}

impl FusionPolicy {
    pub fn new(rules: Vec<FusionRule>, low_confidence_threshold: Confidence) -> Self {
        Self {
            rules,
            low_confidence_threshold,
        }
    }

    /// Default rule order with configurable cut-offs
    pub fn with_thresholds(remote_min_confidence: Confidence, low_confidence_threshold: Confidence) -> Self {
        Self::new(
            vec![
                FusionRule::new(EstimateSource::RemoteVision, Threshold::Above(remote_min_confidence)),
                FusionRule::new(EstimateSource::LocalModel, Threshold::Any),
                FusionRule::new(EstimateSource::Simulated, Threshold::Any),
            ],
            low_confidence_threshold,
        )
    }

    pub fn from_config(config: &FusionConfig) -> Self {
        Self::with_thresholds(config.remote_min_confidence, config.low_confidence_threshold)
    }

    pub fn rules(&self) -> &[FusionRule] {
        &self.rules
    }

    pub fn low_confidence_threshold(&self) -> Confidence {
        self.low_confidence_threshold
    }

    /// First candidate matched by the earliest rule
    pub fn select<'a>(&self, candidates: &[&'a BottleEstimate]) -> Option<&'a BottleEstimate> {
        self.rules.iter().find_map(|rule| {
            candidates
                .iter()
                .copied()
                .find(|candidate| rule.matches(candidate))
        })
    }

    /// Resolve one estimate; the simulated estimate guarantees a result
    pub fn fuse(
        &self,
        local: Option<&BottleEstimate>,
        remote: Option<&BottleEstimate>,
        simulated: &BottleEstimate,
        mode: ScanMode,
    ) -> FusedEstimate {
        let candidates: Vec<&BottleEstimate> = [remote, local, Some(simulated)]
            .into_iter()
            .flatten()
            .collect();

        let selected = self.select(&candidates).unwrap_or(simulated).clone();
        let water_level = local
            .and_then(|l| l.water_level)
            .or(simulated.water_level);

        let low_confidence = (selected.confidence < self.low_confidence_threshold)
            .then(|| LowConfidenceWarning::new(selected.confidence, selected.source));

        debug!(
            source = %selected.source,
            confidence = selected.confidence,
            water_ml = selected.water_volume_ml,
            low_confidence = low_confidence.is_some(),
            "Fused estimate"
        );

        let mut considered: Vec<EstimateSource> = candidates.iter().map(|c| c.source).collect();
        considered.sort_by_key(|source| source_order(*source));

        FusedEstimate {
            estimate: selected,
            water_level,
            mode,
            low_confidence,
            considered,
        }
    }
}

fn source_order(source: EstimateSource) -> u8 {
    match source {
        EstimateSource::LocalModel => 0,
        EstimateSource::RemoteVision => 1,
        EstimateSource::Simulated => 2,
    }
}
