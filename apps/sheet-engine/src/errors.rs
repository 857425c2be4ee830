use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::baseline::StoreError;
use crate::dna::ValidationError;
use crate::drift::{DriftError, DriftReport};
use crate::gen_client::ClientError;
use crate::layout::LayoutError;
use crate::orchestrator::{Cancelled, CompositorError, IllegalTransition};

// ────────────────────────────────────────────────────────────────────────────
// Engine taxonomy
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{service} service still rate limited after {attempts} attempts")]
    RateLimited {
        service: String,
        attempts: u32,
        retry_after: Option<Duration>,
    },

    #[error("{service} service failed after {attempts} attempts: {message}")]
    Service {
        service: String,
        attempts: u32,
        status: Option<u16>,
        message: String,
    },

    #[error("drift still outside policy after {attempts} attempts")]
    DriftExceeded {
        attempts: u32,
        report: Box<DriftReport>,
    },

    #[error("no baseline exists for design '{design_id}'")]
    BaselineMissing { design_id: String },

    #[error("run cancelled")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ClientError> for EngineError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::RateLimited {
                service,
                attempts,
                retry_after,
            } => EngineError::RateLimited {
                service: service.to_string(),
                attempts,
                retry_after,
            },
            ClientError::Service {
                service,
                attempts,
                status,
                message,
            } => EngineError::Service {
                service: service.to_string(),
                attempts,
                status,
                message,
            },
        }
    }
}

impl From<DriftError> for EngineError {
    fn from(e: DriftError) -> Self {
        EngineError::Service {
            service: "similarity".to_string(),
            attempts: 1,
            status: None,
            message: e.to_string(),
        }
    }
}

impl From<CompositorError> for EngineError {
    fn from(e: CompositorError) -> Self {
        EngineError::Service {
            service: "compositor".to_string(),
            attempts: 1,
            status: None,
            message: e.to_string(),
        }
    }
}

impl From<Cancelled> for EngineError {
    fn from(_: Cancelled) -> Self {
        EngineError::Cancelled
    }
}

impl From<IllegalTransition> for EngineError {
    fn from(e: IllegalTransition) -> Self {
        EngineError::Internal(e.to_string())
    }
}

impl From<LayoutError> for EngineError {
    fn from(e: LayoutError) -> Self {
        EngineError::Internal(e.to_string())
    }
}

/// Terminal failure of a generate or modify call. Always carries the latest
/// accepted version so the caller can fall back to the previous sheet.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunFailure {
    #[source]
    pub error: EngineError,
    pub last_good_version: Option<u32>,
}

impl RunFailure {
    pub fn new(error: impl Into<EngineError>, last_good_version: Option<u32>) -> Self {
        Self {
            error: error.into(),
            last_good_version,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// HTTP mapping
// ────────────────────────────────────────────────────────────────────────────

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Run(#[from] RunFailure),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), None),
            AppError::Run(failure) => run_failure_parts(failure),
            AppError::Store(e) => {
                tracing::error!("Storage error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "A storage error occurred".to_string(),
                    None,
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                    None,
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if let (Some(details), Some(obj)) = (details, error.as_object_mut()) {
            obj.extend(details);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

type Parts = (StatusCode, &'static str, String, Option<serde_json::Map<String, Value>>);

fn run_failure_parts(failure: &RunFailure) -> Parts {
    let mut details = serde_json::Map::new();
    details.insert("lastGoodVersion".into(), json!(failure.last_good_version));

    let (status, code, message) = match &failure.error {
        EngineError::Validation(e) => {
            details.insert("issues".into(), json!(e.issues));
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string())
        }
        EngineError::BaselineMissing { .. } => {
            (StatusCode::NOT_FOUND, "BASELINE_MISSING", failure.error.to_string())
        }
        EngineError::DriftExceeded { attempts, report } => {
            details.insert("attempts".into(), json!(attempts));
            details.insert(
                "driftReport".into(),
                serde_json::to_value(report.as_ref()).unwrap_or(Value::Null),
            );
            (StatusCode::UNPROCESSABLE_ENTITY, "DRIFT_EXCEEDED", failure.error.to_string())
        }
        EngineError::RateLimited { retry_after, .. } => {
            details.insert("retryAfterSecs".into(), json!(retry_after.map(|d| d.as_secs())));
            (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", failure.error.to_string())
        }
        EngineError::Service { .. } => {
            tracing::error!("Upstream error: {}", failure.error);
            (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", failure.error.to_string())
        }
        EngineError::Cancelled => (
            StatusCode::SERVICE_UNAVAILABLE,
            "CANCELLED",
            failure.error.to_string(),
        ),
        EngineError::Store(e) => {
            tracing::error!("Storage error: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORAGE_ERROR",
                "A storage error occurred".to_string(),
            )
        }
        EngineError::Internal(msg) => {
            tracing::error!("Internal error: {msg}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal server error occurred".to_string(),
            )
        }
    };
    (status, code, message, Some(details))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(err: AppError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validation_failure_lists_issues() {
        let failure = RunFailure::new(
            ValidationError {
                issues: vec!["dimensions.length must be > 0".into()],
            },
            None,
        );
        let (status, body) = body_of(AppError::Run(failure)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["issues"][0], "dimensions.length must be > 0");
        assert_eq!(body["error"]["lastGoodVersion"], Value::Null);
    }

    #[tokio::test]
    async fn test_baseline_missing_is_404() {
        let failure = RunFailure::new(
            EngineError::BaselineMissing {
                design_id: "dna-x".into(),
            },
            None,
        );
        let (status, body) = body_of(AppError::Run(failure)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "BASELINE_MISSING");
    }

    #[tokio::test]
    async fn test_rate_limited_carries_last_good_version() {
        let failure = RunFailure::new(
            EngineError::RateLimited {
                service: "image".into(),
                attempts: 5,
                retry_after: Some(Duration::from_secs(12)),
            },
            Some(3),
        );
        let (status, body) = body_of(AppError::Run(failure)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["retryAfterSecs"], 12);
        assert_eq!(body["error"]["lastGoodVersion"], 3);
    }

    #[tokio::test]
    async fn test_internal_errors_hide_details() {
        let (status, body) = body_of(AppError::Internal(anyhow::anyhow!("secret path"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.to_string().contains("secret path"));
    }
}
