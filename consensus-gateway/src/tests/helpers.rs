use crate::config::GatewayConfig;
use crate::server::build_router;
use axum_test::TestServer;
use consensus_models_sdk::error::ProviderError;
use consensus_models_sdk::models::{
    ProviderResponse, ProviderStatus, RiskLevel, SignalRequest, TradeDecision,
};
use consensus_models_sdk::providers::SignalProvider;
use consensus_models_sdk::registry::ProviderRegistry;
use consensus_models_sdk::status::StatusTracker;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Scripted in-process provider: votes, fails, or hangs.
pub struct StubProvider {
    name: String,
    weight: f64,
    outcome: StubOutcome,
    status: StatusTracker,
}

pub enum StubOutcome {
    Vote {
        decision: TradeDecision,
        confidence: f64,
        reasoning: String,
    },
    Fail(fn(&str) -> ProviderError),
    Hang,
}

impl StubProvider {
    pub fn voting(name: &str, decision: TradeDecision, confidence: f64) -> Arc<Self> {
        Self::new(
            name,
            1.0,
            StubOutcome::Vote {
                decision,
                confidence,
                reasoning: format!("{name} likes {decision}"),
            },
        )
    }

    pub fn failing(name: &str, make: fn(&str) -> ProviderError) -> Arc<Self> {
        Self::new(name, 1.0, StubOutcome::Fail(make))
    }

    pub fn hanging(name: &str) -> Arc<Self> {
        Self::new(name, 1.0, StubOutcome::Hang)
    }

    pub fn new(name: &str, weight: f64, outcome: StubOutcome) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            weight,
            outcome,
            status: StatusTracker::new(name, true),
        })
    }

    pub fn with_reasoning(name: &str, reasoning: &str) -> Arc<Self> {
        Self::new(
            name,
            1.0,
            StubOutcome::Vote {
                decision: TradeDecision::Buy,
                confidence: 0.9,
                reasoning: reasoning.to_string(),
            },
        )
    }
}

#[async_trait::async_trait]
impl SignalProvider for StubProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn weight(&self) -> f64 {
        self.weight
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

    fn estimate_cost(&self, _tokens_in: u32, _tokens_out: u32) -> f64 {
        0.002
    }

    async fn generate_signal(
        &self,
        _request: &SignalRequest,
        _deadline: Instant,
    ) -> Result<ProviderResponse, ProviderError> {
        match &self.outcome {
            StubOutcome::Vote {
                decision,
                confidence,
                reasoning,
            } => Ok(ProviderResponse {
                provider_name: self.name.clone(),
                decision: *decision,
                confidence: *confidence,
                reasoning: reasoning.clone(),
                risk_level: RiskLevel::Medium,
                suggested_stop_loss: Some(48_500.0),
                suggested_take_profit: Some(52_000.0),
                latency_ms: 12.0,
                tokens_in: 300,
                tokens_out: 80,
                cost_usd: 0.002,
                raw_text: String::new(),
            }),
            StubOutcome::Fail(make) => Err(make(&self.name)),
            StubOutcome::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ProviderError::timeout(&self.name))
            }
        }
    }

    async fn health_check(&self, _deadline: Instant) -> bool {
        true
    }
}

pub fn settings(min_providers: usize) -> GatewayConfig {
    GatewayConfig {
        providers: Vec::new(),
        min_providers,
        min_confidence: 0.0,
        request_timeout: Duration::from_secs(2),
        reasoning_max_chars: 500,
    }
}

pub fn test_server(providers: Vec<Arc<StubProvider>>, config: GatewayConfig) -> TestServer {
    let registry = Arc::new(ProviderRegistry::new());
    for provider in providers {
        registry.register(provider).expect("unique stub names");
    }
    TestServer::new(build_router(registry, config)).expect("router builds")
}

pub fn consensus_body() -> serde_json::Value {
    serde_json::json!({
        "market_data": {"rsi": 65.5, "macd": 150.0, "volume_24h": 1_500_000.0},
        "pair": "BTC/USD",
        "timeframe": "1h",
        "current_price": 50_000.0,
    })
}
