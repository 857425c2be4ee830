/// Generation Client: the single point of entry for the external image and
/// reasoning services.
///
/// No other module talks to those services directly. Every call goes through
/// the run's shared `TokenBucket` (image calls) and the shared `RetryPolicy`.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::prompt::PromptBundle;

pub mod http;
pub mod limiter;
pub mod prompts;
pub mod repair;
pub mod retry;

pub use limiter::TokenBucket;
pub use retry::{Backoff, RetryPolicy};

// ────────────────────────────────────────────────────────────────────────────
// Service seams
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub seed: u32,
    pub width: u32,
    pub height: u32,
    pub model_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponse {
    pub image_ref: String,
    pub seed_used: u32,
    pub model_id: String,
    #[serde(default)]
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub json_mode: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningResponse {
    pub text: String,
    pub model_id: String,
}

/// How a single call to an external service failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceFailure {
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("transient failure: {message}")]
    Transient { message: String },

    #[error("fatal failure (status {status:?}): {message}")]
    Fatal { status: Option<u16>, message: String },
}

#[async_trait]
pub trait ImageService: Send + Sync {
    async fn synthesize(&self, request: &ImageRequest) -> Result<ImageResponse, ServiceFailure>;
}

#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn complete(&self, request: &ReasoningRequest) -> Result<ReasoningResponse, ServiceFailure>;
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Image,
    Reasoning,
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Image => "image",
            Self::Reasoning => "reasoning",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    #[error("{service} service still rate limited after {attempts} attempts")]
    RateLimited {
        service: ServiceKind,
        attempts: u32,
        retry_after: Option<Duration>,
    },

    #[error("{service} service failed after {attempts} attempts: {message}")]
    Service {
        service: ServiceKind,
        attempts: u32,
        status: Option<u16>,
        message: String,
    },
}

/// Everything needed to reconstruct one generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub panel_id: String,
    pub image_ref: String,
    pub model_id: String,
    pub seed_used: u32,
    pub latency_ms: u64,
    pub trace_id: String,
    pub attempts: u32,
}

#[derive(Clone)]
pub struct GenerationClient {
    image: Arc<dyn ImageService>,
    reasoning: Arc<dyn ReasoningService>,
    retry: RetryPolicy,
    default_model: String,
}

impl GenerationClient {
    pub fn new(
        image: Arc<dyn ImageService>,
        reasoning: Arc<dyn ReasoningService>,
        retry: RetryPolicy,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            image,
            reasoning,
            retry,
            default_model: default_model.into(),
        }
    }

    /// Generates one panel image. Every attempt takes a token from `limiter`;
    /// rate-limit and transient failures are retried per the retry policy.
    pub async fn generate_image(
        &self,
        bundle: &PromptBundle,
        limiter: &TokenBucket,
    ) -> Result<GenerationResult, ClientError> {
        let request = ImageRequest {
            prompt: bundle.positive_prompt.clone(),
            negative_prompt: bundle.negative_prompt.clone(),
            seed: bundle.seed,
            width: bundle.size_px.width,
            height: bundle.size_px.height,
            model_id: self.default_model.clone(),
            strength: bundle.strength,
        };
        let trace_id = Uuid::new_v4().to_string();

        let mut attempt = 0;
        loop {
            attempt += 1;
            limiter.acquire().await;
            let started = Instant::now();

            match self.image.synthesize(&request).await {
                Ok(response) => {
                    let latency_ms = response
                        .latency_ms
                        .unwrap_or_else(|| started.elapsed().as_millis() as u64);
                    debug!(
                        panel_id = %bundle.panel_id,
                        trace_id = %trace_id,
                        attempt,
                        latency_ms,
                        "image generated"
                    );
                    return Ok(GenerationResult {
                        panel_id: bundle.panel_id.clone(),
                        image_ref: response.image_ref,
                        model_id: response.model_id,
                        seed_used: response.seed_used,
                        latency_ms,
                        trace_id,
                        attempts: attempt,
                    });
                }
                Err(failure) => match self.retry.next_delay(&failure, attempt) {
                    Some(delay) => {
                        warn!(
                            panel_id = %bundle.panel_id,
                            trace_id = %trace_id,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "image call failed, retrying: {failure}"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(exhausted(ServiceKind::Image, failure, attempt)),
                },
            }
        }
    }

    /// Calls the reasoning service and returns its answer as JSON, repairing
    /// malformed output where possible.
    pub async fn generate_reasoning(&self, request: &ReasoningRequest) -> Result<Value, ClientError> {
        let mut attempt = 0;
        let response = loop {
            attempt += 1;
            match self.reasoning.complete(request).await {
                Ok(r) => break r,
                Err(failure) => match self.retry.next_delay(&failure, attempt) {
                    Some(delay) => {
                        warn!(attempt, "reasoning call failed, retrying: {failure}");
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(exhausted(ServiceKind::Reasoning, failure, attempt)),
                },
            }
        };

        debug!(model_id = %response.model_id, attempt, "reasoning call succeeded");
        repair::parse_lenient(&response.text).ok_or_else(|| ClientError::Service {
            service: ServiceKind::Reasoning,
            attempts: attempt,
            status: None,
            message: "response is not valid JSON and could not be repaired".to_string(),
        })
    }
}

fn exhausted(service: ServiceKind, failure: ServiceFailure, attempts: u32) -> ClientError {
    match failure {
        ServiceFailure::RateLimited { retry_after } => ClientError::RateLimited {
            service,
            attempts,
            retry_after,
        },
        ServiceFailure::Transient { message } => ClientError::Service {
            service,
            attempts,
            status: None,
            message,
        },
        ServiceFailure::Fatal { status, message } => ClientError::Service {
            service,
            attempts,
            status,
            message,
        },
    }
}
