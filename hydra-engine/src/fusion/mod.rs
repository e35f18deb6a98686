// Fusion Module - estimator arbitration
//
// Local / remote / simulated estimates → one authoritative FusedEstimate.
// Selection is an ordered rule list (see policy.rs); level metadata and the
// low-confidence signal are attached afterwards.

pub mod policy;

pub use policy::{FusionPolicy, FusionRule, Threshold};

use crate::types::{BottleEstimate, Confidence, EstimateSource, ScanMode, WaterLevel};
use serde::{Deserialize, Serialize};

/// Informational warning for the end user (never blocks the flow)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowConfidenceWarning {
    pub confidence: Confidence,
    pub source: EstimateSource,
    /// User-facing text
    pub message: String,
}

impl LowConfidenceWarning {
    pub fn new(confidence: Confidence, source: EstimateSource) -> Self {
        Self {
            confidence,
            source,
            message: format!(
                "Low confidence estimate ({:.0}%). The amount may be inaccurate; try retaking the photo in better light.",
                confidence * 100.0
            ),
        }
    }
}

/// The single estimate chosen for a capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedEstimate {
    /// Selected estimate (volumes and confidence of the winning source)
    pub estimate: BottleEstimate,
    /// From local classifier, else simulated; never remote
    pub water_level: Option<WaterLevel>,
    pub mode: ScanMode,
    pub low_confidence: Option<LowConfidenceWarning>,
    /// Sources that produced a candidate
    pub considered: Vec<EstimateSource>,
}

impl FusedEstimate {
    pub fn source(&self) -> EstimateSource {
        self.estimate.source
    }

    pub fn confidence(&self) -> Confidence {
        self.estimate.confidence
    }

    pub fn water_volume_ml(&self) -> f64 {
        self.estimate.water_volume_ml
    }

    pub fn water_amount_ml(&self) -> u32 {
        self.estimate.water_amount_ml()
    }
}

/// Fuse with the default policy
pub fn fuse(
    local: Option<&BottleEstimate>,
    remote: Option<&BottleEstimate>,
    simulated: &BottleEstimate,
    mode: ScanMode,
) -> FusedEstimate {
    FusionPolicy::default().fuse(local, remote, simulated, mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn est(source: EstimateSource, water: f64, confidence: f64) -> BottleEstimate {
        BottleEstimate::new(source, 1000.0, water, confidence)
    }

    fn simulated() -> BottleEstimate {
        est(EstimateSource::Simulated, 500.0, 0.6).with_level(WaterLevel::Half)
    }

    #[test]
    fn test_remote_above_threshold_beats_confident_local() {
        let local = est(EstimateSource::LocalModel, 500.0, 0.9).with_level(WaterLevel::Half);
        let remote = est(EstimateSource::RemoteVision, 730.0, 0.6);
        let fused = fuse(Some(&local), Some(&remote), &simulated(), ScanMode::Initial);

        assert_eq!(fused.source(), EstimateSource::RemoteVision);
        assert_eq!(fused.water_volume_ml(), 730.0);
        assert_eq!(fused.water_level, Some(WaterLevel::Half), "level from local");
        assert!(fused.low_confidence.is_none());
    }

    #[test]
    fn test_remote_below_threshold_loses_to_local() {
        let local = est(EstimateSource::LocalModel, 500.0, 0.9).with_level(WaterLevel::Half);
        let remote = est(EstimateSource::RemoteVision, 730.0, 0.3);
        let fused = fuse(Some(&local), Some(&remote), &simulated(), ScanMode::Initial);

        assert_eq!(fused.source(), EstimateSource::LocalModel);
        assert_eq!(fused.water_volume_ml(), 500.0);
    }

    #[test]
    fn test_remote_at_exactly_threshold_does_not_win() {
        let local = est(EstimateSource::LocalModel, 500.0, 0.4);
        let remote = est(EstimateSource::RemoteVision, 730.0, 0.5);
        let fused = fuse(Some(&local), Some(&remote), &simulated(), ScanMode::Initial);
        assert_eq!(fused.source(), EstimateSource::LocalModel);
    }

    #[test]
    fn test_local_only_no_warning() {
        let local = est(EstimateSource::LocalModel, 500.0, 0.85).with_level(WaterLevel::Full);
        let fused = fuse(Some(&local), None, &simulated(), ScanMode::Initial);

        assert_eq!(fused.estimate, local);
        assert_eq!(fused.water_level, Some(WaterLevel::Full));
        assert!(fused.low_confidence.is_none());
        assert_eq!(fused.considered, vec![EstimateSource::LocalModel, EstimateSource::Simulated]);
    }

    #[test]
    fn test_nothing_ran_uses_simulated() {
        let fused = fuse(None, None, &simulated(), ScanMode::Initial);
        assert_eq!(fused.source(), EstimateSource::Simulated);
        assert_eq!(fused.water_level, Some(WaterLevel::Half));
    }

    #[test]
    fn test_remote_only_low_confidence_falls_to_simulated() {
        let remote = est(EstimateSource::RemoteVision, 730.0, 0.2);
        let fused = fuse(None, Some(&remote), &simulated(), ScanMode::Initial);
        assert_eq!(fused.source(), EstimateSource::Simulated);
    }

    #[test]
    fn test_remote_winner_without_local_takes_simulated_level() {
        let remote = est(EstimateSource::RemoteVision, 730.0, 0.8);
        let fused = fuse(None, Some(&remote), &simulated(), ScanMode::Initial);
        assert_eq!(fused.source(), EstimateSource::RemoteVision);
        assert_eq!(fused.water_level, Some(WaterLevel::Half));
    }

    #[test]
    fn test_low_confidence_warning_attached() {
        let local = est(EstimateSource::LocalModel, 500.0, 0.42);
        let fused = fuse(Some(&local), None, &simulated(), ScanMode::Initial);
        let warning = fused.low_confidence.expect("warning");
        assert_eq!(warning.source, EstimateSource::LocalModel);
        assert_eq!(warning.confidence, 0.42);
        assert!(warning.message.contains("42%"));
    }
}
