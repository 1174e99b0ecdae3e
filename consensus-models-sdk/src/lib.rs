//! # Consensus Models SDK
//!
//! Core of a multi-LLM consensus engine for trading signals. Given a
//! snapshot of market indicators for a pair and timeframe, the SDK fans a
//! structured query out to several independent model providers in
//! parallel, parses their structured replies, reconciles disagreement via
//! weighted voting, and returns a single consensus decision with
//! confidence, agreement and per-provider breakdowns.
//!
//! ## Architecture
//!
//! - [`providers`]: the [`providers::SignalProvider`] contract and the
//!   four vendor adapters (Anthropic Messages, OpenAI Chat Completions,
//!   Grok as an OpenAI-compatible parameterization, Gemini
//!   GenerateContent), sharing one prompt builder, one tolerant JSON
//!   extractor, and one retry/backoff loop.
//! - [`status`]: per-adapter runtime state: counters, a trailing error
//!   window, and the circuit state machine that parks failing adapters.
//! - [`registry`]: process-wide store of live adapters with
//!   enable/disable, availability filtering and concurrent health probing.
//! - [`aggregator`]: the pure weighted-vote reconciliation with
//!   deterministic tie-breaks and conservative risk/price aggregation.
//! - [`orchestrator`]: bounded-parallel fan-out under one absolute
//!   deadline with partial-failure tolerance and rolling metrics.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use consensus_models_sdk::{
//!     create_provider, ConsensusOrchestrator, OrchestratorConfig,
//!     ProviderConfig, ProviderRegistry, SignalRequest,
//! };
//! use std::sync::Arc;
//! use std::time::{Duration, Instant};
//!
//! let registry = Arc::new(ProviderRegistry::new());
//! registry.register(create_provider(
//!     ProviderConfig::new("openai", "your-key").with_model("gpt-4o-mini"),
//! )?)?;
//! registry.register(create_provider(
//!     ProviderConfig::new("anthropic", "your-key")
//!         .with_model("claude-3-5-sonnet-20241022"),
//! )?)?;
//!
//! let orchestrator =
//!     ConsensusOrchestrator::new(registry, OrchestratorConfig::default());
//! let result = orchestrator
//!     .generate_consensus(&request, None, Instant::now() + Duration::from_secs(30))
//!     .await?;
//! println!("{} at {:.2}", result.decision, result.confidence);
//! ```
//!
//! ## Error model
//!
//! Adapters never raise transport-specific failures: every outcome is a
//! [`models::ProviderResponse`] or a classified [`error::ProviderError`].
//! The orchestrator recovers from per-provider errors and only fails when
//! quorum becomes impossible.

pub mod aggregator;
pub mod error;
pub mod extract;
pub mod models;
pub mod orchestrator;
pub mod pricing;
pub mod prompt;
pub mod registry;
pub mod status;

pub mod providers;

pub use aggregator::{aggregate, AggregateError};
pub use error::{ErrorKind, ProviderError};
pub use models::{
    ConsensusMetadata, ConsensusResult, ProviderResponse, ProviderState, ProviderStatus,
    RiskLevel, SignalRequest, TradeDecision,
};
pub use orchestrator::{ConsensusOrchestrator, MetricsSnapshot, OrchestratorConfig, OrchestratorError};
pub use providers::{create_provider, ProviderConfig, SignalProvider};
pub use registry::{ProviderRegistry, RegistryError};
