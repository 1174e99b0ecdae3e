use crate::error::ProviderError;
use crate::extract::normalize_signal;
use crate::models::{ProviderResponse, ProviderStatus, SignalRequest};
use crate::pricing::{self, PricingTable, GROK_DEFAULT, GROK_PRICING, OPENAI_DEFAULT, OPENAI_PRICING};
use crate::prompt::{build_user_prompt, SYSTEM_PROMPT};
use crate::providers::http_client::{AuthStrategy, HttpProviderClient};
use crate::providers::{call_with_retries, ProviderConfig, SignalProvider};
use crate::status::StatusTracker;
use serde::{Deserialize, Serialize};
use std::time::Instant;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const GROK_BASE_URL: &str = "https://api.x.ai/v1";

/// Chat-Completions adapter covering every bearer-authenticated
/// OpenAI-compatible vendor. Grok is the same wire protocol with a
/// different base URL and pricing table.
pub struct OpenAiCompatProvider {
    http: HttpProviderClient,
    config: ProviderConfig,
    status: StatusTracker,
    pricing: PricingTable,
    default_rates: (f64, f64),
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl OpenAiCompatProvider {
    pub fn openai(config: ProviderConfig) -> Result<Self, ProviderError> {
        Self::with_vendor(config, OPENAI_BASE_URL, OPENAI_PRICING, OPENAI_DEFAULT)
    }

    pub fn grok(config: ProviderConfig) -> Result<Self, ProviderError> {
        Self::with_vendor(config, GROK_BASE_URL, GROK_PRICING, GROK_DEFAULT)
    }

    fn with_vendor(
        config: ProviderConfig,
        default_base: &str,
        pricing: PricingTable,
        default_rates: (f64, f64),
    ) -> Result<Self, ProviderError> {
        let http = HttpProviderClient::new(
            &config.name,
            config.request_timeout,
            config.base_url.clone(),
            default_base,
            AuthStrategy::Bearer {
                token: config.api_key.clone(),
            },
        )?;
        let status = StatusTracker::new(config.name.clone(), config.enabled);
        Ok(Self {
            http,
            config,
            status,
            pricing,
            default_rates,
        })
    }

    fn request_body(&self, request: &SignalRequest) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: build_user_prompt(request),
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }
}

#[async_trait::async_trait]
impl SignalProvider for OpenAiCompatProvider {
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
            self.pricing,
            self.default_rates,
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
                    .post_json::<_, ChatCompletionResponse>("/chat/completions", &body, deadline)
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

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();
        if content.is_empty() {
            self.status.record_failure(latency_ms);
            return Err(ProviderError::validation(
                &self.config.name,
                "completion contained no message content",
            ));
        }

        let parsed = match normalize_signal(&self.config.name, &content) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.status.record_failure(latency_ms);
                return Err(err);
            }
        };
        self.status.record_success(latency_ms);

        let usage = response.usage.unwrap_or_default();
        Ok(ProviderResponse {
            provider_name: self.config.name.clone(),
            decision: parsed.decision,
            confidence: parsed.confidence,
            reasoning: parsed.reasoning,
            risk_level: parsed.risk_level,
            suggested_stop_loss: parsed.suggested_stop_loss,
            suggested_take_profit: parsed.suggested_take_profit,
            latency_ms,
            tokens_in: usage.prompt_tokens,
            tokens_out: usage.completion_tokens,
            cost_usd: self.estimate_cost(usage.prompt_tokens, usage.completion_tokens),
            raw_text: content,
        })
    }

    async fn health_check(&self, deadline: Instant) -> bool {
        let healthy = self
            .http
            .get_json::<serde_json::Value>("/models", deadline)
            .await
            .is_ok();
        self.status.record_probe(healthy);
        healthy
    }
}
