//! reqwest adapters for the external services.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::prompts::JSON_ONLY_SYSTEM;
use super::{
    ImageRequest, ImageResponse, ImageService, ReasoningRequest, ReasoningResponse,
    ReasoningService, ServiceFailure,
};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const REASONING_MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 4096;

fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .expect("Failed to build HTTP client")
}

/// Maps a non-success HTTP status onto a failure kind.
async fn classify(response: Response) -> ServiceFailure {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();

    if status == StatusCode::TOO_MANY_REQUESTS {
        ServiceFailure::RateLimited { retry_after }
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        ServiceFailure::Transient {
            message: format!("{status}: {body}"),
        }
    } else {
        let message = serde_json::from_str::<AnthropicError>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        ServiceFailure::Fatal {
            status: Some(status.as_u16()),
            message,
        }
    }
}

fn transport_failure(e: reqwest::Error) -> ServiceFailure {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        ServiceFailure::Transient {
            message: e.to_string(),
        }
    } else {
        ServiceFailure::Fatal {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Image synthesis
// ────────────────────────────────────────────────────────────────────────────

/// JSON image-synthesis endpoint: `POST {base}/v1/generate`.
#[derive(Clone)]
pub struct HttpImageService {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpImageService {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: http_client(Duration::from_secs(180)),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl ImageService for HttpImageService {
    async fn synthesize(&self, request: &ImageRequest) -> Result<ImageResponse, ServiceFailure> {
        let mut call = self
            .client
            .post(format!("{}/v1/generate", self.base_url))
            .json(request);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }

        let response = call.send().await.map_err(transport_failure)?;
        if !response.status().is_success() {
            let failure = classify(response).await;
            warn!("image service call failed: {failure}");
            return Err(failure);
        }
        response.json::<ImageResponse>().await.map_err(|e| ServiceFailure::Fatal {
            status: None,
            message: format!("malformed image service response: {e}"),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Reasoning (Anthropic Messages API)
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: String,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

#[derive(Clone)]
pub struct AnthropicReasoningService {
    client: Client,
    api_key: String,
}

impl AnthropicReasoningService {
    pub fn new(api_key: String) -> Self {
        Self {
            client: http_client(Duration::from_secs(120)),
            api_key,
        }
    }
}

#[async_trait]
impl ReasoningService for AnthropicReasoningService {
    async fn complete(&self, request: &ReasoningRequest) -> Result<ReasoningResponse, ServiceFailure> {
        let system = if request.json_mode {
            format!("{} {}", request.system_prompt, JSON_ONLY_SYSTEM)
        } else {
            request.system_prompt.clone()
        };
        let body = AnthropicRequest {
            model: REASONING_MODEL,
            max_tokens: MAX_TOKENS,
            system: &system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: &request.user_prompt,
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport_failure)?;

        if !response.status().is_success() {
            return Err(classify(response).await);
        }

        let parsed: AnthropicResponse = response.json().await.map_err(|e| ServiceFailure::Fatal {
            status: None,
            message: format!("malformed reasoning response: {e}"),
        })?;
        let text = parsed
            .content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.clone())
            .ok_or_else(|| ServiceFailure::Fatal {
                status: None,
                message: "reasoning service returned empty content".to_string(),
            })?;

        Ok(ReasoningResponse {
            text,
            model_id: parsed.model,
        })
    }
}
