//! Service error type and its HTTP mapping.
//!
//! One closed mapping from engine outcomes to status codes: validation
//! failures are 400 with a per-field detail map, feasibility failures
//! (no providers, insufficient successes, empty votes) are 503 so callers
//! can retry, and anything unexpected, including a caught handler panic,
//! is an opaque 500. The panic detail is logged server-side and never
//! echoed to the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use consensus_models_sdk::aggregator::AggregateError;
use consensus_models_sdk::orchestrator::OrchestratorError;
use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Request rejected before the orchestrator ran.
    #[error("request validation failed")]
    Validation {
        details: BTreeMap<String, Vec<String>>,
    },

    /// Engine outcome mapped per the status-code table.
    #[error("consensus failed: {0}")]
    Orchestrator(#[from] OrchestratorError),

    /// Anything the mapping table does not name; raised for handler
    /// panics caught by the server's panic layer.
    #[error("internal error: {message}")]
    Internal { message: String },
}

/// Fold a caught handler panic into the opaque 500 body. Installed by the
/// server's `CatchPanicLayer`.
pub fn panic_response(panic: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    };
    ServiceError::Internal { message }.into_response()
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match self {
            ServiceError::Validation { details } => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "validation_error",
                    "details": details,
                })),
            )
                .into_response(),

            ServiceError::Orchestrator(err) => match err {
                OrchestratorError::NoProviders {
                    available,
                    required,
                } => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({
                        "error": "no_providers_available",
                        "detail": format!(
                            "{available} providers available, {required} required"
                        ),
                    })),
                )
                    .into_response(),

                OrchestratorError::InsufficientSuccesses {
                    successes,
                    required,
                    errors,
                } => {
                    let per_provider: BTreeMap<String, serde_json::Value> = errors
                        .into_iter()
                        .map(|(name, err)| {
                            (
                                name,
                                json!({
                                    "kind": err.kind.as_str(),
                                    "message": err.message,
                                    "retryable": err.retryable,
                                }),
                            )
                        })
                        .collect();
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        Json(json!({
                            "error": "insufficient_successes",
                            "detail": format!(
                                "{successes} providers succeeded, {required} required"
                            ),
                            "per_provider_errors": per_provider,
                        })),
                    )
                        .into_response()
                }

                OrchestratorError::Aggregation(agg) => {
                    let (error, detail) = match &agg {
                        AggregateError::Insufficient { .. } => {
                            ("insufficient_successes", agg.to_string())
                        }
                        AggregateError::EmptyVotes => ("empty_votes", agg.to_string()),
                    };
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        Json(json!({"error": error, "detail": detail})),
                    )
                        .into_response()
                }
            },

            ServiceError::Internal { message } => {
                tracing::error!(error = %message, "unexpected internal failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "internal_error",
                        "detail": "unexpected internal failure",
                    })),
                )
                    .into_response()
            }
        }
    }
}
