//! Core types shared by the estimators, fusion and the scan workflow
//!
//! Every estimator produces the same [`BottleEstimate`] shape; fusion picks
//! one of them; the verification session carries it to a hydration entry.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Confidence score (0.0-1.0)
pub type Confidence = f64;

/// MIME type used when the image bytes cannot be sniffed
const FALLBACK_IMAGE_MIME: &str = "image/jpeg";

// ============================================================================
// Water level
// ============================================================================

/// Discrete fill level of a bottle
///
/// The on-device classifier only models half/full/overflowing; empty and low
/// come from the simulated/heuristic layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaterLevel {
    Empty,
    Low,
    Half,
    Full,
    Overflowing,
}

impl WaterLevel {
    /// Fraction of bottle capacity this level represents
    pub fn capacity_fraction(self) -> f64 {
        match self {
            WaterLevel::Empty => 0.0,
            WaterLevel::Low => 0.25,
            WaterLevel::Half => 0.5,
            WaterLevel::Full => 1.0,
            WaterLevel::Overflowing => 1.2,
        }
    }

    /// Parse a classifier label ("Full", " half ", "overflowing")
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "empty" => Some(WaterLevel::Empty),
            "low" => Some(WaterLevel::Low),
            "half" => Some(WaterLevel::Half),
            "full" => Some(WaterLevel::Full),
            "overflowing" => Some(WaterLevel::Overflowing),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WaterLevel::Empty => "empty",
            WaterLevel::Low => "low",
            WaterLevel::Half => "half",
            WaterLevel::Full => "full",
            WaterLevel::Overflowing => "overflowing",
        }
    }
}

impl fmt::Display for WaterLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Estimate source / scan mode
// ============================================================================

/// Which estimator produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EstimateSource {
    LocalModel,
    RemoteVision,
    Simulated,
}

impl EstimateSource {
    pub fn as_str(self) -> &'static str {
        match self {
            EstimateSource::LocalModel => "local-model",
            EstimateSource::RemoteVision => "remote-vision",
            EstimateSource::Simulated => "simulated",
        }
    }
}

impl fmt::Display for EstimateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase of the two-photo protocol a capture belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// Full bottle: determines the amount
    Initial,
    /// Emptied bottle: evidence only
    Verification,
}

// ============================================================================
// Captured image
// ============================================================================

/// Opaque image reference supplied by the capture collaborator
///
/// Bytes are shared, so cloning is cheap and estimators can run concurrently
/// on the same capture.
#[derive(Clone)]
pub struct CapturedImage {
    /// Where the image came from (file URI, gallery id), informational
    pub uri: Option<String>,
    /// Encoded image bytes (JPEG/PNG/...)
    pub bytes: Arc<[u8]>,
    /// Detected or user-selected bottle capacity
    pub bottle_capacity_hint_ml: Option<f64>,
    /// Bottle type label recorded on the hydration entry
    pub bottle_type_label: Option<String>,
}

impl CapturedImage {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            uri: None,
            bytes: Arc::from(bytes.into()),
            bottle_capacity_hint_ml: None,
            bottle_type_label: None,
        }
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_capacity_hint(mut self, capacity_ml: f64) -> Self {
        self.bottle_capacity_hint_ml = Some(capacity_ml);
        self
    }

    pub fn with_bottle_type(mut self, label: impl Into<String>) -> Self {
        self.bottle_type_label = Some(label.into());
        self
    }

    /// Usable capacity hint (positive and finite)
    pub fn capacity_hint(&self) -> Option<f64> {
        self.bottle_capacity_hint_ml
            .filter(|c| c.is_finite() && *c > 0.0)
    }

    /// Sniffed MIME type, defaulting to JPEG
    pub fn mime_type(&self) -> &'static str {
        infer::get(&self.bytes)
            .map(|kind| kind.mime_type())
            .filter(|mime| mime.starts_with("image/"))
            .unwrap_or(FALLBACK_IMAGE_MIME)
    }

    /// `data:<mime>;base64,<payload>` for the vision endpoint
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type(),
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

impl fmt::Debug for CapturedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedImage")
            .field("uri", &self.uri)
            .field("len", &self.bytes.len())
            .field("bottle_capacity_hint_ml", &self.bottle_capacity_hint_ml)
            .field("bottle_type_label", &self.bottle_type_label)
            .finish()
    }
}

// ============================================================================
// Bottle estimate
// ============================================================================

/// Result shape shared by every estimator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BottleEstimate {
    /// Bottle capacity (ml)
    pub bottle_volume_ml: f64,
    /// Water currently in the bottle (ml)
    pub water_volume_ml: f64,
    /// Confidence score (0.0-1.0)
    pub confidence: Confidence,
    /// Producing estimator
    pub source: EstimateSource,
    /// Discrete level; `None` for raw-volume sources (remote vision)
    pub water_level: Option<WaterLevel>,
}

impl BottleEstimate {
    /// Create an estimate with confidence clamped to [0, 1] and
    /// non-finite or negative volumes forced to 0
    pub fn new(
        source: EstimateSource,
        bottle_volume_ml: f64,
        water_volume_ml: f64,
        confidence: Confidence,
    ) -> Self {
        Self {
            bottle_volume_ml: sanitize_volume(bottle_volume_ml),
            water_volume_ml: sanitize_volume(water_volume_ml),
            confidence: clamp_confidence(confidence),
            source,
            water_level: None,
        }
    }

    pub fn with_level(mut self, level: WaterLevel) -> Self {
        self.water_level = Some(level);
        self
    }

    /// Water volume as a loggable integer amount
    pub fn water_amount_ml(&self) -> u32 {
        let rounded = self.water_volume_ml.round();
        if rounded <= 0.0 {
            0
        } else if rounded >= u32::MAX as f64 {
            u32::MAX
        } else {
            rounded as u32
        }
    }
}

/// Clamp to [0, 1]; NaN becomes 0
pub fn clamp_confidence(confidence: Confidence) -> Confidence {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

fn sanitize_volume(volume: f64) -> f64 {
    if volume.is_finite() && volume > 0.0 {
        volume
    } else {
        0.0
    }
}

// ============================================================================
// Estimation errors
// ============================================================================

/// Estimator failure
///
/// Always recoverable: the workflow falls back to another source.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EstimationError {
    /// Local model not loaded / not configured
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Transport-level failure (connect, timeout, TLS)
    #[error("Network error: {0}")]
    Network(String),

    /// Endpoint answered with a non-2xx status
    #[error("API error: {0}")]
    Api(String),

    /// Malformed or incomplete response payload
    #[error("Parse error: {0}")]
    Parse(String),

    /// Classifier backend failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Estimator not configured (e.g. no API key)
    #[error("Estimator not available: {0}")]
    NotAvailable(String),

    /// Estimator task cancelled before it finished (e.g. runtime shutdown)
    #[error("Estimation cancelled")]
    Cancelled,
}
