//! Test Helper Utilities
//!
//! Shared fixtures for hydra-engine integration tests: scripted estimators,
//! a fake classifier backend, and tracker construction with a fixed clock.

#![allow(dead_code)]

pub mod log_capture;

pub use log_capture::{capture_logs, LogCapture};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hydra_common::config::HydraConfig;
use hydra_common::time::FixedClock;
use hydra_engine::db::{DocumentStore, MemoryStore};
use hydra_engine::estimators::{ClassifierBackend, ModelLoader, ModelMetadata, VolumeEstimator};
use hydra_engine::{
    ActivityLevel, BottleEstimate, CapturedImage, EstimateSource, EstimationError,
    HydrationTracker, ScanMode, Sex, UserBiometrics,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// 2026-03-01 12:00 UTC
pub fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// Config with a UTC day boundary so "today" is deterministic
pub fn test_config() -> HydraConfig {
    let mut config = HydraConfig::default();
    config.day.utc_offset_minutes = Some(0);
    config.estimation.remote_wait_ms = 2_000;
    config
}

pub fn biometrics(weight_kg: f64, activity_level: ActivityLevel) -> UserBiometrics {
    UserBiometrics {
        height_cm: 175.0,
        weight_kg,
        age_years: 30,
        sex: Sex::Male,
        activity_level,
    }
}

pub fn bottle_photo(seed: u8) -> CapturedImage {
    CapturedImage::from_bytes(vec![seed; 32]).with_uri(format!("file:///photos/{seed}.jpg"))
}

// ============================================================================
// Scripted estimator
// ============================================================================

/// Estimator returning queued results (the last one repeats)
pub struct ScriptedEstimator {
    source: EstimateSource,
    script: Mutex<Vec<Result<BottleEstimate, EstimationError>>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedEstimator {
    pub fn new(source: EstimateSource, script: Vec<Result<BottleEstimate, EstimationError>>) -> Self {
        Self {
            source,
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
            delay: None,
            gate: None,
        }
    }

    pub fn returning(source: EstimateSource, water_ml: f64, confidence: f64) -> Self {
        Self::new(source, vec![Ok(estimate(source, water_ml, confidence))])
    }

    pub fn failing(source: EstimateSource, error: EstimationError) -> Self {
        Self::new(source, vec![Err(error)])
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// The first call waits until the gate is notified
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_result(&self) -> Result<BottleEstimate, EstimationError> {
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.remove(0)
        } else {
            script[0].clone()
        }
    }
}

pub fn estimate(source: EstimateSource, water_ml: f64, confidence: f64) -> BottleEstimate {
    BottleEstimate::new(source, 1000.0, water_ml, confidence)
}

#[async_trait]
impl VolumeEstimator for ScriptedEstimator {
    fn source(&self) -> EstimateSource {
        self.source
    }

    async fn estimate(
        &self,
        _image: &CapturedImage,
        _mode: ScanMode,
    ) -> Result<BottleEstimate, EstimationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let result = self.next_result();
        if call == 0 {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

// ============================================================================
// Fake classifier backend
// ============================================================================

/// Backend returning fixed probabilities
pub struct FixedBackend(pub Vec<f32>);

impl ClassifierBackend for FixedBackend {
    fn classify(&self, _image: &[u8]) -> anyhow::Result<Vec<f32>> {
        Ok(self.0.clone())
    }
}

/// Loader producing a [`FixedBackend`], counting loads
pub struct FixedLoader {
    pub probabilities: Vec<f32>,
    pub loads: AtomicUsize,
    pub fail: bool,
}

impl FixedLoader {
    pub fn new(probabilities: Vec<f32>) -> Self {
        Self {
            probabilities,
            loads: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelLoader for FixedLoader {
    async fn load(
        &self,
        _model_dir: &Path,
        _metadata: &ModelMetadata,
    ) -> anyhow::Result<Arc<dyn ClassifierBackend>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("weights file is corrupt");
        }
        Ok(Arc::new(FixedBackend(self.probabilities.clone())))
    }
}

/// Write `model_metadata.json` + `class_labels.json` as the export pipeline does
pub fn write_model_dir(dir: &Path, classes: &[&str]) {
    let metadata = serde_json::json!({
        "input_size": 224,
        "classes": classes,
        "num_classes": classes.len(),
        "model_type": "MobileNetV2",
    });
    std::fs::write(dir.join("model_metadata.json"), serde_json::to_string_pretty(&metadata).unwrap()).unwrap();
    std::fs::write(dir.join("class_labels.json"), serde_json::to_string_pretty(&classes).unwrap()).unwrap();
}

// ============================================================================
// Tracker construction
// ============================================================================

pub struct TestTracker {
    pub tracker: HydrationTracker,
    pub clock: FixedClock,
    pub store: Arc<MemoryStore>,
}

pub fn tracker_with(
    local: Option<Arc<dyn VolumeEstimator>>,
    remote: Option<Arc<dyn VolumeEstimator>>,
) -> TestTracker {
    let store = Arc::new(MemoryStore::new());
    let clock = FixedClock::new(noon());
    let mut builder = HydrationTracker::builder(store.clone() as Arc<dyn DocumentStore>)
        .config(test_config())
        .clock(Arc::new(clock.clone()));
    if let Some(local) = local {
        builder = builder.local_estimator(local);
    }
    if let Some(remote) = remote {
        builder = builder.remote_estimator(remote);
    }
    TestTracker {
        tracker: builder.build().unwrap(),
        clock,
        store,
    }
}
