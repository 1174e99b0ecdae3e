//! HTTP request handlers for the consensus resource.
//!
//! `POST /v1/strategies/llm-consensus` validates the request body, derives
//! the server-side deadline, invokes the orchestrator and serializes the
//! result with per-provider reasonings truncated for transport.
//! `GET` on the same path is the health probe.

use crate::server::AppState;
use crate::service_error::ServiceError;
use axum::extract::State;
use axum::Json;
use consensus_models_sdk::models::{ConsensusResult, SignalRequest};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

const ACCEPTED_TIMEFRAMES: [&str; 7] = ["1m", "5m", "15m", "30m", "1h", "4h", "1d"];

/// Body of a consensus request.
#[derive(Debug, Deserialize)]
pub struct ConsensusRequest {
    #[serde(default)]
    pub market_data: HashMap<String, f64>,
    #[serde(default)]
    pub pair: String,
    #[serde(default)]
    pub timeframe: String,
    #[serde(default)]
    pub current_price: f64,
    #[serde(default)]
    pub provider_weights: Option<HashMap<String, f64>>,
}

impl ConsensusRequest {
    /// Field-by-field validation, collecting every failure.
    fn validate(&self) -> Result<(), BTreeMap<String, Vec<String>>> {
        let mut details: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut fail = |field: &str, message: String| {
            details.entry(field.to_string()).or_default().push(message);
        };

        if self.market_data.is_empty() {
            fail("market_data", "must be a non-empty object".to_string());
        }
        for (name, value) in &self.market_data {
            if !value.is_finite() {
                fail("market_data", format!("indicator {name} is not finite"));
            }
        }
        if self.pair.trim().is_empty() {
            fail("pair", "must be a non-empty string".to_string());
        }
        if !ACCEPTED_TIMEFRAMES.contains(&self.timeframe.as_str()) {
            fail(
                "timeframe",
                format!(
                    "{:?} is not one of {}",
                    self.timeframe,
                    ACCEPTED_TIMEFRAMES.join(", ")
                ),
            );
        }
        if !(self.current_price.is_finite() && self.current_price > 0.0) {
            fail(
                "current_price",
                "must be a positive finite number".to_string(),
            );
        }
        if let Some(weights) = &self.provider_weights {
            for (provider, weight) in weights {
                if !weight.is_finite() || !(0.0..=2.0).contains(weight) {
                    fail(
                        "provider_weights",
                        format!("weight for {provider} must be within [0, 2]"),
                    );
                }
            }
        }

        if details.is_empty() {
            Ok(())
        } else {
            Err(details)
        }
    }
}

/// `POST`: run the fan-out and return the consensus.
pub async fn generate_consensus(
    State(state): State<AppState>,
    Json(request): Json<ConsensusRequest>,
) -> Result<Json<ConsensusResult>, ServiceError> {
    request
        .validate()
        .map_err(|details| ServiceError::Validation { details })?;

    let signal_request = SignalRequest {
        pair: request.pair,
        timeframe: request.timeframe,
        current_price: request.current_price,
        market_data: request.market_data.into_iter().collect(),
    };
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!(
        "consensus_request",
        %request_id,
        pair = %signal_request.pair,
        timeframe = %signal_request.timeframe,
    );
    // The total deadline is server policy, never client-controllable.
    let deadline = Instant::now() + state.settings.request_timeout;

    let mut result = state
        .orchestrator
        .generate_consensus(&signal_request, request.provider_weights.as_ref(), deadline)
        .instrument(span)
        .await?;

    for response in &mut result.provider_responses {
        truncate_in_place(&mut response.reasoning, state.settings.reasoning_max_chars);
    }
    Ok(Json(result))
}

/// `GET`: health probe over registry state.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let registry = state.orchestrator.registry();
    let available = registry.available_providers().len();
    let required = state.orchestrator.min_providers();

    let provider_health: BTreeMap<String, Value> = registry
        .all()
        .into_iter()
        .map(|provider| {
            let status = provider.status();
            (
                provider.name().to_string(),
                json!({
                    "state": status.state,
                    "enabled": provider.is_enabled(),
                    "error_rate": status.error_rate,
                    "requests_total": status.requests_total,
                }),
            )
        })
        .collect();

    let status = if available >= required {
        "healthy"
    } else {
        "degraded"
    };
    Json(json!({
        "status": status,
        "available_providers": available,
        "required_providers": required,
        "provider_health": provider_health,
    }))
}

/// Truncate on a character boundary, appending an ellipsis when cut.
fn truncate_in_place(text: &mut String, max_chars: usize) {
    if text.chars().count() <= max_chars {
        return;
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push('…');
    *text = truncated;
}
