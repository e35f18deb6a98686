//! Volume estimators
//!
//! Three independent strategies share the [`BottleEstimate`] result shape:
//! - [`LocalClassifier`]: on-device level classifier × bottle capacity
//! - [`RemoteVisionClient`]: cloud multimodal model returning raw volumes
//! - [`SimulatedEstimator`]: deterministic fallback that never fails
//!
//! Failures stay inside [`EstimatorOutcome`]: callers always get a tagged
//! result, never an error.

pub mod local_classifier;
pub mod remote_vision;
pub mod simulated;

pub use local_classifier::{
    read_model_metadata, ClassifierBackend, LocalClassifier, LocalModel, ModelLoader,
    ModelMetadata,
};
pub use remote_vision::{parse_estimate_content, strip_code_fences, RemoteVisionClient};
pub use simulated::SimulatedEstimator;

use crate::types::{BottleEstimate, CapturedImage, EstimateSource, EstimationError, ScanMode};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// Estimator trait - every volume source implements this
#[async_trait]
pub trait VolumeEstimator: Send + Sync {
    fn source(&self) -> EstimateSource;

    /// Estimate bottle and water volume from a capture
    ///
    /// Must not mutate shared state.
    async fn estimate(
        &self,
        image: &CapturedImage,
        mode: ScanMode,
    ) -> Result<BottleEstimate, EstimationError>;

    /// Whether the estimator is worth invoking (model loaded, key configured)
    fn is_available(&self) -> bool {
        true
    }
}

/// Tagged result of one estimator invocation
#[derive(Debug, Clone, PartialEq)]
pub enum EstimatorOutcome {
    Estimated(BottleEstimate),
    Failed(EstimationError),
    /// Did not finish within the bounded wait
    TimedOut,
    /// Not invoked because it reported itself unavailable
    Skipped,
}

impl EstimatorOutcome {
    pub fn estimate(&self) -> Option<&BottleEstimate> {
        match self {
            EstimatorOutcome::Estimated(estimate) => Some(estimate),
            _ => None,
        }
    }

    pub fn into_estimate(self) -> Option<BottleEstimate> {
        match self {
            EstimatorOutcome::Estimated(estimate) => Some(estimate),
            _ => None,
        }
    }

    /// Failed or timed out (skipped is not a failure)
    pub fn is_failure(&self) -> bool {
        matches!(self, EstimatorOutcome::Failed(_) | EstimatorOutcome::TimedOut)
    }

    /// Human-readable failure description
    pub fn failure_message(&self) -> Option<String> {
        match self {
            EstimatorOutcome::Failed(err) => Some(err.to_string()),
            EstimatorOutcome::TimedOut => Some("timed out".to_string()),
            _ => None,
        }
    }
}

/// Run one estimator, converting its error into a tagged outcome
pub async fn run_estimator(
    estimator: &dyn VolumeEstimator,
    image: &CapturedImage,
    mode: ScanMode,
) -> EstimatorOutcome {
    let source = estimator.source();
    if !estimator.is_available() {
        debug!(source = %source, "Estimator unavailable, skipping");
        return EstimatorOutcome::Skipped;
    }

    match estimator.estimate(image, mode).await {
        Ok(estimate) => {
            debug!(
                source = %source,
                water_ml = estimate.water_volume_ml,
                confidence = estimate.confidence,
                "Estimate produced"
            );
            EstimatorOutcome::Estimated(estimate)
        }
        Err(e) => {
            warn!(source = %source, error = %e, "Estimator failed");
            EstimatorOutcome::Failed(e)
        }
    }
}

/// [`run_estimator`] bounded by `wait`
pub async fn run_bounded(
    estimator: &dyn VolumeEstimator,
    image: &CapturedImage,
    mode: ScanMode,
    wait: Duration,
) -> EstimatorOutcome {
    match tokio::time::timeout(wait, run_estimator(estimator, image, mode)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!(
                source = %estimator.source(),
                wait_ms = wait.as_millis() as u64,
                "Estimator timed out"
            );
            EstimatorOutcome::TimedOut
        }
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockEstimator;
    use super::*;

    fn image() -> CapturedImage {
        CapturedImage::from_bytes(vec![1, 2, 3])
    }

    #[tokio::test]
    async fn test_failure_is_tagged_not_thrown() {
        let estimator = MockEstimator::failing(
            EstimateSource::RemoteVision,
            EstimationError::Network("connection refused".to_string()),
        );
        let outcome = run_estimator(&estimator, &image(), ScanMode::Initial).await;
        assert!(outcome.is_failure());
        assert!(outcome.estimate().is_none());
        assert_eq!(
            outcome.failure_message().as_deref(),
            Some("Network error: connection refused")
        );
    }

    #[tokio::test]
    async fn test_unavailable_is_skipped() {
        let mut estimator = MockEstimator::ok(EstimateSource::LocalModel, 500.0, 0.9);
        estimator.available = false;
        let outcome = run_estimator(&estimator, &image(), ScanMode::Initial).await;
        assert_eq!(outcome, EstimatorOutcome::Skipped);
        assert!(!outcome.is_failure());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_wait_times_out() {
        let mut estimator = MockEstimator::ok(EstimateSource::RemoteVision, 500.0, 0.9);
        estimator.delay = Some(Duration::from_secs(60));
        let outcome = run_bounded(&estimator, &image(), ScanMode::Initial, Duration::from_secs(2)).await;
        assert_eq!(outcome, EstimatorOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_bounded_wait_passes_result() {
        let estimator = MockEstimator::ok(EstimateSource::RemoteVision, 400.0, 0.7);
        let outcome = run_bounded(&estimator, &image(), ScanMode::Initial, Duration::from_secs(2)).await;
        assert_eq!(outcome.estimate().map(|e| e.water_volume_ml), Some(400.0));
    }
}
