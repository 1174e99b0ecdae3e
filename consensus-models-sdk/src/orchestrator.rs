//! Consensus orchestration: fan-out, collection, aggregation.
//!
//! One public operation. All available providers are queried concurrently
//! under a single absolute deadline; a provider that ignores the deadline
//! is cut off by the orchestrator's own `timeout_at` and reported as a
//! timeout. Individual failures are collected, not propagated: the call
//! only errors when quorum becomes impossible.

use crate::aggregator::{aggregate, AggregateError};
use crate::error::ProviderError;
use crate::models::{ConsensusResult, SignalRequest};
use crate::registry::ProviderRegistry;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;

const LATENCY_SAMPLES: usize = 100;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("no providers available: {available} of {required} required")]
    NoProviders { available: usize, required: usize },
    #[error("insufficient successful responses: {successes} of {required} required")]
    InsufficientSuccesses {
        successes: usize,
        required: usize,
        errors: HashMap<String, ProviderError>,
    },
    #[error("aggregation failed: {0}")]
    Aggregation(#[from] AggregateError),
}

/// Orchestrator tuning, fixed at construction.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Quorum: minimum providers that must both respond and survive the
    /// aggregator's confidence filter.
    pub min_providers: usize,
    /// Confidence floor forwarded to the aggregator.
    pub min_confidence: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            min_providers: 2,
            min_confidence: 0.0,
        }
    }
}

#[derive(Debug, Default)]
struct OrchestratorMetrics {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    latency_samples: Vec<f64>,
}

/// Point-in-time orchestrator counters.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_latency_ms: f64,
}

pub struct ConsensusOrchestrator {
    registry: Arc<ProviderRegistry>,
    config: OrchestratorConfig,
    metrics: Mutex<OrchestratorMetrics>,
}

impl ConsensusOrchestrator {
    pub fn new(registry: Arc<ProviderRegistry>, config: OrchestratorConfig) -> Self {
        Self {
            registry,
            config,
            metrics: Mutex::new(OrchestratorMetrics::default()),
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn min_providers(&self) -> usize {
        self.config.min_providers
    }

    /// Query every available provider in parallel and reconcile the
    /// responses into one consensus decision.
    ///
    /// `per_request_weights` overrides adapter default weights for this
    /// call only; negative overrides are ignored in favor of the default.
    pub async fn generate_consensus(
        &self,
        request: &SignalRequest,
        per_request_weights: Option<&HashMap<String, f64>>,
        deadline: Instant,
    ) -> Result<ConsensusResult, OrchestratorError> {
        let started = Instant::now();
        let result = self
            .fan_out(request, per_request_weights, deadline)
            .await;
        self.record_request(result.is_ok(), started.elapsed().as_secs_f64() * 1000.0);
        result
    }

    async fn fan_out(
        &self,
        request: &SignalRequest,
        per_request_weights: Option<&HashMap<String, f64>>,
        deadline: Instant,
    ) -> Result<ConsensusResult, OrchestratorError> {
        let providers = self.registry.available_providers();
        if providers.len() < self.config.min_providers {
            return Err(OrchestratorError::NoProviders {
                available: providers.len(),
                required: self.config.min_providers,
            });
        }

        let weights: HashMap<String, f64> = providers
            .iter()
            .map(|provider| {
                let name = provider.name().to_string();
                let weight = per_request_weights
                    .and_then(|w| w.get(&name))
                    .copied()
                    .filter(|w| *w >= 0.0)
                    .unwrap_or_else(|| provider.weight());
                (name, weight)
            })
            .collect();

        // Every provider shares the same absolute deadline; dropping the
        // futures at collection end cancels any stragglers.
        let tokio_deadline = tokio::time::Instant::from_std(deadline);
        let mut calls: FuturesUnordered<_> = providers
            .iter()
            .map(|provider| {
                let provider = Arc::clone(provider);
                async move {
                    let name = provider.name().to_string();
                    let outcome = match tokio::time::timeout_at(
                        tokio_deadline,
                        provider.generate_signal(request, deadline),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(ProviderError::timeout(&name)),
                    };
                    (name, outcome)
                }
            })
            .collect();

        let mut successes = Vec::new();
        let mut failures = HashMap::new();
        while let Some((name, outcome)) = calls.next().await {
            match outcome {
                Ok(response) => {
                    tracing::debug!(
                        provider = %name,
                        decision = %response.decision,
                        confidence = response.confidence,
                        latency_ms = response.latency_ms,
                        "provider voted"
                    );
                    successes.push(response);
                }
                Err(error) => {
                    tracing::warn!(
                        provider = %name,
                        kind = %error.kind,
                        error = %error,
                        "provider failed"
                    );
                    failures.insert(name, error);
                }
            }
        }
        drop(calls);

        if successes.len() < self.config.min_providers {
            return Err(OrchestratorError::InsufficientSuccesses {
                successes: successes.len(),
                required: self.config.min_providers,
                errors: failures,
            });
        }

        let mut result = aggregate(
            &successes,
            &weights,
            self.config.min_providers,
            self.config.min_confidence,
        )?;
        // The aggregator only sees successes; report the full fan-out size.
        result.consensus_metadata.total_providers = providers.len();

        tracing::info!(
            decision = %result.decision,
            confidence = result.confidence,
            agreement = result.consensus_metadata.agreement_score,
            participating = result.consensus_metadata.participating_providers,
            failed = failures.len(),
            "consensus reached"
        );
        Ok(result)
    }

    fn record_request(&self, success: bool, latency_ms: f64) {
        let mut metrics = self.metrics.lock().expect("metrics lock poisoned");
        metrics.total_requests += 1;
        if success {
            metrics.successful_requests += 1;
        } else {
            metrics.failed_requests += 1;
        }
        if metrics.latency_samples.len() == LATENCY_SAMPLES {
            metrics.latency_samples.remove(0);
        }
        metrics.latency_samples.push(latency_ms);
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        let metrics = self.metrics.lock().expect("metrics lock poisoned");
        let average_latency_ms = if metrics.latency_samples.is_empty() {
            0.0
        } else {
            metrics.latency_samples.iter().sum::<f64>() / metrics.latency_samples.len() as f64
        };
        MetricsSnapshot {
            total_requests: metrics.total_requests,
            successful_requests: metrics.successful_requests,
            failed_requests: metrics.failed_requests,
            average_latency_ms,
        }
    }
}
