use crate::error::ProviderError;
use crate::extract::normalize_signal;
use crate::models::{ProviderResponse, ProviderStatus, SignalRequest};
use crate::pricing::{self, GEMINI_DEFAULT, GEMINI_PRICING};
use crate::prompt::{build_user_prompt, SYSTEM_PROMPT};
use crate::providers::http_client::{AuthStrategy, HttpProviderClient};
use crate::providers::{call_with_retries, ProviderConfig, SignalProvider};
use crate::status::StatusTracker;
use serde::{Deserialize, Serialize};
use std::time::Instant;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini GenerateContent adapter. Authentication rides on the query
/// string, and the request/response envelope is unlike the
/// Chat-Completions shape the other vendors share.
pub struct GeminiProvider {
    http: HttpProviderClient,
    config: ProviderConfig,
    status: StatusTracker,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    system_instruction: GeminiContent,
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

impl GeminiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let http = HttpProviderClient::new(
            &config.name,
            config.request_timeout,
            config.base_url.clone(),
            DEFAULT_BASE_URL,
            AuthStrategy::QueryParam {
                name: "key".to_string(),
                value: config.api_key.clone(),
            },
        )?;
        let status = StatusTracker::new(config.name.clone(), config.enabled);
        Ok(Self {
            http,
            config,
            status,
        })
    }

    fn request_body(&self, request: &SignalRequest) -> GeminiRequest {
        GeminiRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: SYSTEM_PROMPT.to_string(),
                }],
            },
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart {
                    text: build_user_prompt(request),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_tokens,
            },
        }
    }

    fn generate_path(&self) -> String {
        format!("/models/{}:generateContent", self.config.model)
    }
}

#[async_trait::async_trait]
impl SignalProvider for GeminiProvider {
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
            GEMINI_PRICING,
            GEMINI_DEFAULT,
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
        let path = self.generate_path();
        let started = Instant::now();
        let result = call_with_retries(
            &self.config.name,
            self.config.max_retries,
            deadline,
            || {
                self.http
                    .post_json::<_, GeminiResponse>(&path, &body, deadline)
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
            .candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect()
            })
            .unwrap_or_default();
        if content.is_empty() {
            self.status.record_failure(latency_ms);
            return Err(ProviderError::validation(
                &self.config.name,
                "response contained no candidate text",
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

        let usage = response.usage_metadata.unwrap_or_default();
        Ok(ProviderResponse {
            provider_name: self.config.name.clone(),
            decision: parsed.decision,
            confidence: parsed.confidence,
            reasoning: parsed.reasoning,
            risk_level: parsed.risk_level,
            suggested_stop_loss: parsed.suggested_stop_loss,
            suggested_take_profit: parsed.suggested_take_profit,
            latency_ms,
            tokens_in: usage.prompt_token_count,
            tokens_out: usage.candidates_token_count,
            cost_usd: self.estimate_cost(usage.prompt_token_count, usage.candidates_token_count),
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
