//! Remote vision estimator (chat-completion multimodal endpoint)
//!
//! Sends the capture as a data URI with a prompt asking for strict JSON
//! `{bottleVolume, waterVolume, confidence}`. Replies are parsed leniently
//! (code fences and surrounding prose are tolerated) but all three numeric
//! fields are required.

use super::VolumeEstimator;
use crate::error::{EngineError, EngineResult};
use crate::types::{BottleEstimate, CapturedImage, EstimateSource, EstimationError, ScanMode};
use async_trait::async_trait;
use hydra_common::config::VisionConfig;
use serde::Deserialize;
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

pub const VISION_PROMPT: &str = "You are measuring a water bottle in a photo. \
Estimate the bottle's total capacity and the amount of water currently inside it, in millilitres. \
Respond with only a JSON object of the form \
{\"bottleVolume\": <number>, \"waterVolume\": <number>, \"confidence\": <number between 0 and 1>} \
and no other text.";

const MAX_TOKENS: u32 = 300;

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

type DirectRateLimiter = governor::RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

pub struct RemoteVisionClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    rate_limiter: DirectRateLimiter,
}

impl RemoteVisionClient {
    pub fn new(config: &VisionConfig) -> EngineResult<Self> {
        let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = governor::RateLimiter::direct(governor::Quota::per_second(rps));

        let client = reqwest::Client::builder()
            .user_agent(concat!("hydra/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                EngineError::Common(hydra_common::Error::Internal(format!(
                    "failed to build HTTP client: {e}"
                )))
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config
                .api_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string),
            rate_limiter,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(&self, image: &CapturedImage) -> Value {
        json!({
            "model": self.model,
            "temperature": 0,
            "max_tokens": MAX_TOKENS,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": VISION_PROMPT },
                    { "type": "image_url", "image_url": { "url": image.to_data_uri() } }
                ]
            }]
        })
    }

    /// POST the capture and parse the reply
    pub async fn request_estimate(
        &self,
        image: &CapturedImage,
    ) -> Result<BottleEstimate, EstimationError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| EstimationError::NotAvailable("no vision API key configured".to_string()))?;

        self.rate_limiter.until_ready().await;

        debug!(endpoint = %self.endpoint, model = %self.model, bytes = image.bytes.len(), "Requesting remote estimate");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&self.request_body(image))
            .send()
            .await
            .map_err(|e| EstimationError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EstimationError::Api(format!(
                "vision endpoint returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| EstimationError::Network(e.to_string()))?;
        parse_vision_reply(&body)
    }
}

/// Extract and parse `choices[0].message.content` from an envelope
pub fn parse_vision_reply(body: &str) -> Result<BottleEstimate, EstimationError> {
    let completion: ChatCompletion = serde_json::from_str(body)
        .map_err(|e| EstimationError::Parse(format!("invalid response envelope: {e}")))?;

    let content = completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| EstimationError::Parse("response has no message content".to_string()))?;

    parse_estimate_content(&content)
}

/// Parse the model's text reply into an estimate
///
/// Volumes are rounded to whole ml (negatives become 0) and confidence is
/// clamped to [0, 1].
pub fn parse_estimate_content(content: &str) -> Result<BottleEstimate, EstimationError> {
    let stripped = strip_code_fences(content);
    let object = match (stripped.find('{'), stripped.rfind('}')) {
        (Some(start), Some(end)) if start < end => &stripped[start..=end],
        _ => {
            return Err(EstimationError::Parse(format!(
                "no JSON object in reply: {}",
                stripped.chars().take(80).collect::<String>()
            )))
        }
    };

    let value: Value = serde_json::from_str(object)
        .map_err(|e| EstimationError::Parse(format!("malformed JSON: {e}")))?;

    let bottle = numeric_field(&value, "bottleVolume")?;
    let water = numeric_field(&value, "waterVolume")?;
    let confidence = numeric_field(&value, "confidence")?;

    Ok(BottleEstimate::new(
        EstimateSource::RemoteVision,
        bottle.round(),
        water.round(),
        confidence,
    ))
}

fn numeric_field(value: &Value, field: &str) -> Result<f64, EstimationError> {
    value
        .get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| EstimationError::Parse(format!("missing or non-numeric '{field}'")))
}

/// Remove a surrounding markdown code fence (```json ... ```)
pub fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string ("json") up to the first newline
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
    };
    let rest = rest.trim_end();
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[async_trait]
impl VolumeEstimator for RemoteVisionClient {
    fn source(&self) -> EstimateSource {
        EstimateSource::RemoteVision
    }

    async fn estimate(
        &self,
        image: &CapturedImage,
        _mode: ScanMode,
    ) -> Result<BottleEstimate, EstimationError> {
        self.request_estimate(image).await
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}
