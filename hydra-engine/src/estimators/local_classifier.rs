//! On-device water level classifier
//!
//! The network itself lives behind [`ModelLoader`] / [`ClassifierBackend`];
//! this module owns the model lifecycle ([`LocalModel`]), validation of the
//! exported model directory, and the class → volume mapping.
//!
//! Model directory layout (written by the training/export pipeline):
//! - `model_metadata.json`: `{input_size, classes, num_classes, model_type}`
//! - `class_labels.json`: class names in output-tensor order

use super::VolumeEstimator;
use crate::types::{BottleEstimate, CapturedImage, EstimateSource, EstimationError, ScanMode, WaterLevel};
use async_trait::async_trait;
use hydra_common::config::EstimationConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub const METADATA_FILE: &str = "model_metadata.json";
pub const LABELS_FILE: &str = "class_labels.json";

/// Levels the classifier can output
pub const MODELLED_LEVELS: [WaterLevel; 3] =
    [WaterLevel::Half, WaterLevel::Full, WaterLevel::Overflowing];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Square input edge (pixels)
    pub input_size: u32,
    pub classes: Vec<String>,
    pub num_classes: usize,
    pub model_type: String,
}

impl ModelMetadata {
    /// Check internal consistency; returns the classes as levels in output order
    pub fn validate(&self) -> Result<Vec<WaterLevel>, EstimationError> {
        if self.num_classes != self.classes.len() {
            return Err(EstimationError::ModelUnavailable(format!(
                "num_classes is {} but {} classes are listed",
                self.num_classes,
                self.classes.len()
            )));
        }
        if self.classes.is_empty() {
            return Err(EstimationError::ModelUnavailable(
                "model declares no classes".to_string(),
            ));
        }

        self.classes
            .iter()
            .map(|label| {
                WaterLevel::from_label(label)
                    .filter(|level| MODELLED_LEVELS.contains(level))
                    .ok_or_else(|| {
                        EstimationError::ModelUnavailable(format!("unsupported class '{label}'"))
                    })
            })
            .collect()
    }
}

/// Read and cross-check metadata and labels from `model_dir`
pub fn read_model_metadata(
    model_dir: &Path,
) -> Result<(ModelMetadata, Vec<WaterLevel>), EstimationError> {
    let metadata: ModelMetadata = read_json(&model_dir.join(METADATA_FILE))?;
    let labels: Vec<String> = read_json(&model_dir.join(LABELS_FILE))?;

    if labels != metadata.classes {
        return Err(EstimationError::ModelUnavailable(format!(
            "{LABELS_FILE} {labels:?} disagrees with {METADATA_FILE} {:?}",
            metadata.classes
        )));
    }

    let levels = metadata.validate()?;
    Ok((metadata, levels))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, EstimationError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        EstimationError::ModelUnavailable(format!("cannot read {}: {e}", path.display()))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        EstimationError::ModelUnavailable(format!("invalid {}: {e}", path.display()))
    })
}

/// Loaded network: class probabilities for an encoded image
///
/// Called on a blocking thread.
pub trait ClassifierBackend: Send + Sync {
    /// Probabilities in `class_labels.json` order
    fn classify(&self, image: &[u8]) -> anyhow::Result<Vec<f32>>;
}

/// Turns a model directory into a backend
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(
        &self,
        model_dir: &Path,
        metadata: &ModelMetadata,
    ) -> anyhow::Result<Arc<dyn ClassifierBackend>>;
}

struct LoadedModel {
    metadata: ModelMetadata,
    levels: Vec<WaterLevel>,
    backend: Arc<dyn ClassifierBackend>,
}

/// Lifecycle-scoped classifier model
///
/// Construct once and share by `Arc`. `load` and `unload` are safe to call
/// repeatedly.
pub struct LocalModel {
    model_dir: PathBuf,
    loader: Arc<dyn ModelLoader>,
    state: RwLock<Option<LoadedModel>>,
    loaded: AtomicBool,
}

impl LocalModel {
    pub fn new(model_dir: impl Into<PathBuf>, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            model_dir: model_dir.into(),
            loader,
            state: RwLock::new(None),
            loaded: AtomicBool::new(false),
        }
    }

    /// Model at `estimation.model_dir`, if one is configured
    pub fn from_config(config: &EstimationConfig, loader: Arc<dyn ModelLoader>) -> Option<Self> {
        config
            .model_dir
            .as_ref()
            .map(|dir| Self::new(dir.clone(), loader))
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// Load the model; no-op when already loaded
    pub async fn load(&self) -> Result<(), EstimationError> {
        let mut state = self.state.write().await;
        if state.is_some() {
            debug!(model_dir = %self.model_dir.display(), "Model already loaded");
            return Ok(());
        }

        let (metadata, levels) = read_model_metadata(&self.model_dir)?;
        let backend = self
            .loader
            .load(&self.model_dir, &metadata)
            .await
            .map_err(|e| EstimationError::ModelUnavailable(format!("{e:#}")))?;

        info!(
            model_dir = %self.model_dir.display(),
            model_type = %metadata.model_type,
            classes = ?metadata.classes,
            "Local model loaded"
        );

        *state = Some(LoadedModel {
            metadata,
            levels,
            backend,
        });
        self.loaded.store(true, Ordering::Release);
        Ok(())
    }

    /// Release the model; no-op when not loaded
    pub async fn unload(&self) {
        let mut state = self.state.write().await;
        if state.take().is_some() {
            info!(model_dir = %self.model_dir.display(), "Local model unloaded");
        }
        self.loaded.store(false, Ordering::Release);
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub async fn metadata(&self) -> Option<ModelMetadata> {
        self.state.read().await.as_ref().map(|m| m.metadata.clone())
    }

    async fn snapshot(&self) -> Option<(Vec<WaterLevel>, Arc<dyn ClassifierBackend>)> {
        self.state
            .read()
            .await
            .as_ref()
            .map(|m| (m.levels.clone(), Arc::clone(&m.backend)))
    }
}

/// [`VolumeEstimator`] over a shared [`LocalModel`]
pub struct LocalClassifier {
    model: Arc<LocalModel>,
    default_capacity_ml: f64,
}

impl LocalClassifier {
    pub fn new(model: Arc<LocalModel>, default_capacity_ml: f64) -> Self {
        Self {
            model,
            default_capacity_ml,
        }
    }

    pub fn model(&self) -> &Arc<LocalModel> {
        &self.model
    }
}

/// Index and value of the highest finite probability
fn top_class(probabilities: &[f32]) -> Option<(usize, f32)> {
    probabilities
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, p)| p.is_finite())
        .fold(None, |best, (idx, p)| match best {
            Some((_, best_p)) if best_p >= p => best,
            _ => Some((idx, p)),
        })
}

#[async_trait]
impl VolumeEstimator for LocalClassifier {
    fn source(&self) -> EstimateSource {
        EstimateSource::LocalModel
    }

    async fn estimate(
        &self,
        image: &CapturedImage,
        _mode: ScanMode,
    ) -> Result<BottleEstimate, EstimationError> {
        let (levels, backend) = self
            .model
            .snapshot()
            .await
            .ok_or_else(|| EstimationError::ModelUnavailable("model not loaded".to_string()))?;

        let bytes = Arc::clone(&image.bytes);
        let probabilities = tokio::task::spawn_blocking(move || backend.classify(&bytes))
            .await
            .map_err(|e| {
                if e.is_cancelled() {
                    EstimationError::Cancelled
                } else {
                    EstimationError::Inference(format!("classifier task failed: {e}"))
                }
            })?
            .map_err(|e| EstimationError::Inference(format!("{e:#}")))?;

        if probabilities.len() != levels.len() {
            return Err(EstimationError::Inference(format!(
                "expected {} probabilities, got {}",
                levels.len(),
                probabilities.len()
            )));
        }

        let (idx, probability) = top_class(&probabilities)
            .ok_or_else(|| EstimationError::Inference("no finite probabilities".to_string()))?;
        let level = levels[idx];
        let capacity = image.capacity_hint().unwrap_or(self.default_capacity_ml);

        Ok(BottleEstimate::new(
            EstimateSource::LocalModel,
            capacity,
            capacity * level.capacity_fraction(),
            probability as f64,
        )
        .with_level(level))
    }

    fn is_available(&self) -> bool {
        self.model.is_loaded()
    }
}
