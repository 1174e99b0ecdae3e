use crate::error::ProviderError;
use crate::extract::normalize_signal;
use crate::models::{ProviderResponse, ProviderStatus, SignalRequest};
use crate::pricing::{self, ANTHROPIC_DEFAULT, ANTHROPIC_PRICING};
use crate::prompt::{build_user_prompt, SYSTEM_PROMPT};
use crate::providers::http_client::{AuthStrategy, HttpProviderClient};
use crate::providers::{call_with_retries, ProviderConfig, SignalProvider};
use crate::status::StatusTracker;
use serde::{Deserialize, Serialize};
use std::time::Instant;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Anthropic Messages adapter.
pub struct AnthropicProvider {
    http: HttpProviderClient,
    config: ProviderConfig,
    status: StatusTracker,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let http = HttpProviderClient::new(
            &config.name,
            config.request_timeout,
            config.base_url.clone(),
            DEFAULT_BASE_URL,
            AuthStrategy::Header {
                name: "x-api-key".to_string(),
                value: config.api_key.clone(),
            },
        )?
        .with_header("anthropic-version", API_VERSION)?;

        let status = StatusTracker::new(config.name.clone(), config.enabled);
        Ok(Self {
            http,
            config,
            status,
        })
    }

    fn request_body(&self, request: &SignalRequest) -> AnthropicRequest {
        AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            system: SYSTEM_PROMPT.to_string(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: build_user_prompt(request),
            }],
            temperature: Some(self.config.temperature),
        }
    }
}

#[async_trait::async_trait]
impl SignalProvider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn weight(&self) -> f64 {
        self.config.weight
    }

    fn is_enabled(&self) -> bool {
        self.status.is_enabled()
    }

    fn set_enabled(&self, enabled: bool) {
        self.status.set_enabled(enabled);
    }

    fn status(&self) -> ProviderStatus {
        self.status.snapshot()
    }

    fn estimate_cost(&self, tokens_in: u32, tokens_out: u32) -> f64 {
        pricing::estimate_cost(
            ANTHROPIC_PRICING,
            ANTHROPIC_DEFAULT,
            &self.config.model,
            tokens_in,
            tokens_out,
        )
    }

    async fn generate_signal(
        &self,
        request: &SignalRequest,
        deadline: Instant,
    ) -> Result<ProviderResponse, ProviderError> {
        if !self.status.allow_request() {
            return Err(ProviderError::generic(
                &self.config.name,
                None,
                "circuit open, refusing call",
            ));
        }

        let body = self.request_body(request);
        let started = Instant::now();
        let result = call_with_retries(
            &self.config.name,
            self.config.max_retries,
            deadline,
            || {
                self.http
                    .post_json::<_, AnthropicResponse>("/v1/messages", &body, deadline)
            },
        )
        .await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                self.status.record_failure(latency_ms);
                return Err(err);
            }
        };

        let content: String = response
            .content
            .iter()
            .map(|block| block.text.as_str())
            .collect();

        let parsed = match normalize_signal(&self.config.name, &content) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.status.record_failure(latency_ms);
                return Err(err);
            }
        };
        self.status.record_success(latency_ms);

        let tokens_in = response.usage.input_tokens;
        let tokens_out = response.usage.output_tokens;
        Ok(ProviderResponse {
            provider_name: self.config.name.clone(),
            decision: parsed.decision,
            confidence: parsed.confidence,
            reasoning: parsed.reasoning,
            risk_level: parsed.risk_level,
            suggested_stop_loss: parsed.suggested_stop_loss,
            suggested_take_profit: parsed.suggested_take_profit,
            latency_ms,
            tokens_in,
            tokens_out,
            cost_usd: self.estimate_cost(tokens_in, tokens_out),
            raw_text: content,
        })
    }

    async fn health_check(&self, deadline: Instant) -> bool {
        // No dedicated models endpoint; a one-token completion doubles as
        // the reachability and authorization probe.
        let probe = AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: 1,
            system: String::new(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: "Hi".to_string(),
            }],
            temperature: Some(0.0),
        };
        let healthy = self
            .http
            .post_json::<_, serde_json::Value>("/v1/messages", &probe, deadline)
            .await
            .is_ok();
        self.status.record_probe(healthy);
        healthy
    }
}
