//! Simulated estimator (deterministic fallback)
//!
//! Used when neither the model nor the network path produced anything.
//! Verification captures always read as an emptied bottle so the protocol
//! can complete; initial captures get a plausible level seeded from the
//! image bytes, so the same photo always gives the same answer.

use super::VolumeEstimator;
use crate::types::{BottleEstimate, CapturedImage, EstimateSource, EstimationError, ScanMode, WaterLevel};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

/// Bottle size assumed for initial captures
pub const SIMULATED_BOTTLE_ML: f64 = 1000.0;
pub const INITIAL_CONFIDENCE: f64 = 0.6;
pub const VERIFICATION_CONFIDENCE: f64 = 0.8;

const INITIAL_LEVELS: [WaterLevel; 3] = [WaterLevel::Low, WaterLevel::Half, WaterLevel::Full];

#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedEstimator;

impl SimulatedEstimator {
    pub fn new() -> Self {
        Self
    }

    /// Infallible estimate
    pub fn simulate(&self, image: &CapturedImage, mode: ScanMode) -> BottleEstimate {
        match mode {
            ScanMode::Verification => BottleEstimate::new(
                EstimateSource::Simulated,
                SIMULATED_BOTTLE_ML,
                0.0,
                VERIFICATION_CONFIDENCE,
            )
            .with_level(WaterLevel::Empty),
            ScanMode::Initial => {
                let level = seeded_level(&image.bytes);
                BottleEstimate::new(
                    EstimateSource::Simulated,
                    SIMULATED_BOTTLE_ML,
                    SIMULATED_BOTTLE_ML * level.capacity_fraction(),
                    INITIAL_CONFIDENCE,
                )
                .with_level(level)
            }
        }
    }
}

fn seeded_level(bytes: &[u8]) -> WaterLevel {
    let seed: [u8; 32] = Sha256::digest(bytes).into();
    let mut rng = StdRng::from_seed(seed);
    INITIAL_LEVELS[rng.gen_range(0..INITIAL_LEVELS.len())]
}

#[async_trait]
impl VolumeEstimator for SimulatedEstimator {
    fn source(&self) -> EstimateSource {
        EstimateSource::Simulated
    }

    async fn estimate(
        &self,
        image: &CapturedImage,
        mode: ScanMode,
    ) -> Result<BottleEstimate, EstimationError> {
        Ok(self.simulate(image, mode))
    }
}
