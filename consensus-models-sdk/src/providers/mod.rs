//! Provider abstraction layer.
//!
//! Every vendor adapter implements [`SignalProvider`]: generate one trading
//! signal, answer a health probe, price a token count, and expose its name,
//! weight and runtime status. Adapters differ only in wire protocol,
//! authentication, model identifiers and pricing; prompt construction,
//! JSON extraction and the retry loop are shared.
//!
//! [`create_provider`] is the factory: a fixed switch over the four known
//! provider names, returning a boxed trait object the registry owns.

use crate::error::ProviderError;
use crate::models::{ProviderResponse, ProviderStatus, SignalRequest};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub mod anthropic;
pub mod gemini;
pub mod http_client;
pub mod openai;

/// Ceiling on a single retry backoff.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Uniform capability set of a provider adapter.
#[async_trait::async_trait]
pub trait SignalProvider: Send + Sync {
    /// Unique lowercase identifier, also the registry key.
    fn name(&self) -> &str;

    /// Default vote weight applied when the caller supplies none.
    fn weight(&self) -> f64;

    fn is_enabled(&self) -> bool;

    fn set_enabled(&self, enabled: bool);

    /// Point-in-time runtime state.
    fn status(&self) -> ProviderStatus;

    /// Pure lookup against the adapter's pricing table.
    fn estimate_cost(&self, tokens_in: u32, tokens_out: u32) -> f64;

    /// Query the vendor for one trading signal. Returns a normalized
    /// response or a classified error; never blocks past `deadline` beyond
    /// best-effort cleanup.
    async fn generate_signal(
        &self,
        request: &SignalRequest,
        deadline: Instant,
    ) -> Result<ProviderResponse, ProviderError>;

    /// Minimal reachability and authorization probe.
    async fn health_check(&self, deadline: Instant) -> bool;
}

impl std::fmt::Debug for dyn SignalProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalProvider").field("name", &self.name()).finish()
    }
}

/// Immutable per-adapter configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub model: String,
    pub api_key: String,
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub weight: f64,
    pub enabled: bool,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: String::new(),
            api_key: api_key.into(),
            base_url: None,
            max_tokens: 1024,
            temperature: 0.7,
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            weight: 1.0,
            enabled: true,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Construction-time invariants. The factory refuses configs that
    /// violate them.
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.name.is_empty() || self.name.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(ProviderError::validation(
                &self.name,
                "provider name must be non-empty lowercase",
            ));
        }
        if self.api_key.is_empty() {
            return Err(ProviderError::validation(&self.name, "api_key must be set"));
        }
        if self.max_tokens == 0 {
            return Err(ProviderError::validation(
                &self.name,
                "max_tokens must be positive",
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ProviderError::validation(
                &self.name,
                format!("temperature {} outside [0, 2]", self.temperature),
            ));
        }
        if !(0.0..=2.0).contains(&self.weight) {
            return Err(ProviderError::validation(
                &self.name,
                format!("weight {} outside [0, 2]", self.weight),
            ));
        }
        Ok(())
    }
}

/// Instantiate the adapter registered under `config.name`.
pub fn create_provider(config: ProviderConfig) -> Result<Arc<dyn SignalProvider>, ProviderError> {
    config.validate()?;
    match config.name.as_str() {
        "anthropic" => Ok(Arc::new(anthropic::AnthropicProvider::new(config)?)),
        "openai" => Ok(Arc::new(openai::OpenAiCompatProvider::openai(config)?)),
        "grok" => Ok(Arc::new(openai::OpenAiCompatProvider::grok(config)?)),
        "gemini" => Ok(Arc::new(gemini::GeminiProvider::new(config)?)),
        other => Err(ProviderError::validation(
            other,
            format!("unsupported provider: {other}"),
        )),
    }
}

/// Exponential backoff for `attempt` (0-based): `min(2^attempt + jitter, 60s)`
/// with jitter uniform in [0, 1) seconds.
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    let base = 2f64.powi(attempt.min(6) as i32);
    let jitter: f64 = rand::Rng::gen_range(&mut rand::thread_rng(), 0.0..1.0);
    Duration::from_secs_f64((base + jitter).min(MAX_BACKOFF.as_secs_f64()))
}

/// Shared retry loop. Retries only retryable errors, honors a vendor
/// `Retry-After`, and never sleeps past `deadline`: when the next backoff
/// would cross it, the most recent error is returned instead.
pub(crate) async fn call_with_retries<T, F, Fut>(
    provider: &str,
    max_retries: u32,
    deadline: Instant,
    mut operation: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0u32;
    loop {
        if Instant::now() >= deadline {
            return Err(ProviderError::timeout(provider));
        }
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= max_retries || !error.retryable {
                    return Err(error);
                }
                let delay = error.retry_after.unwrap_or_else(|| backoff_delay(attempt));
                if Instant::now() + delay >= deadline {
                    return Err(error);
                }
                tracing::debug!(
                    provider,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    kind = %error.kind,
                    "retrying provider call"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config() -> ProviderConfig {
        ProviderConfig::new("openai", "sk-test").with_model("gpt-4o-mini")
    }

    #[test]
    fn config_defaults_are_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn config_rejects_out_of_range_fields() {
        assert!(config().with_max_tokens(0).validate().is_err());
        assert!(config().with_temperature(2.5).validate().is_err());
        assert!(config().with_weight(-0.1).validate().is_err());
        assert!(config().with_weight(2.1).validate().is_err());
        assert!(ProviderConfig::new("OpenAI", "sk").validate().is_err());
        assert!(ProviderConfig::new("openai", "").validate().is_err());
    }

    #[test]
    fn factory_rejects_unknown_provider() {
        let err = create_provider(ProviderConfig::new("bedrock", "key")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn factory_builds_all_known_providers() {
        for name in ["anthropic", "openai", "gemini", "grok"] {
            let provider =
                create_provider(ProviderConfig::new(name, "key").with_model("m")).unwrap();
            assert_eq!(provider.name(), name);
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        for attempt in 0..4 {
            let delay = backoff_delay(attempt).as_secs_f64();
            let base = 2f64.powi(attempt as i32);
            assert!(delay >= base && delay < base + 1.0);
        }
        assert!(backoff_delay(20) <= MAX_BACKOFF);
    }

    #[tokio::test]
    async fn retry_loop_does_not_retry_non_retryable_errors() {
        let calls = AtomicU32::new(0);
        let deadline = Instant::now() + Duration::from_secs(5);
        let result: Result<(), _> = call_with_retries("openai", 3, deadline, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::authentication("openai", "bad key")) }
        })
        .await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::Authentication);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_loop_retries_until_success() {
        let calls = AtomicU32::new(0);
        let deadline = Instant::now() + Duration::from_secs(600);
        let result = call_with_retries("openai", 3, deadline, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ProviderError::transport("openai", "reset"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_loop_stops_when_backoff_would_cross_deadline() {
        let calls = AtomicU32::new(0);
        // Tight deadline: the first backoff (>= 1s) cannot fit.
        let deadline = Instant::now() + Duration::from_millis(500);
        let result: Result<(), _> = call_with_retries("openai", 5, deadline, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::transport("openai", "reset")) }
        })
        .await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::Transport);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_loop_honors_retry_after() {
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();
        let deadline = Instant::now() + Duration::from_secs(600);
        let result = call_with_retries("gemini", 2, deadline, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(ProviderError::rate_limited(
                        "gemini",
                        Some(Duration::from_secs(30)),
                    ))
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert!(start.elapsed() >= Duration::from_secs(30));
    }
}
