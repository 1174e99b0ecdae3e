//! Server assembly: registry construction, application state, routing.
//!
//! The registry is built once at startup from configuration and owned by
//! the application state; handlers hold only the shared state. Teardown
//! is by drop when the server exits, releasing each adapter's HTTP client.

use crate::config::GatewayConfig;
use crate::handlers;
use axum::routing::get;
use axum::Router;
use consensus_models_sdk::orchestrator::{ConsensusOrchestrator, OrchestratorConfig};
use consensus_models_sdk::providers::create_provider;
use consensus_models_sdk::registry::ProviderRegistry;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use std::time::Duration;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ConsensusOrchestrator>,
    pub settings: Arc<GatewayConfig>,
}

/// Build the router with every configured provider registered.
pub async fn create_server(config: GatewayConfig) -> anyhow::Result<Router> {
    let registry = Arc::new(ProviderRegistry::new());
    for provider_config in &config.providers {
        let provider = create_provider(provider_config.clone())?;
        registry.register(provider)?;
    }
    if registry.is_empty() {
        tracing::warn!("no providers configured; consensus requests will be rejected");
    }
    Ok(build_router(registry, config))
}

/// Router assembly over an already-populated registry.
pub fn build_router(registry: Arc<ProviderRegistry>, config: GatewayConfig) -> Router {
    let orchestrator = Arc::new(ConsensusOrchestrator::new(
        registry,
        OrchestratorConfig {
            min_providers: config.min_providers,
            min_confidence: config.min_confidence,
        },
    ));

    // The outer timeout sits above the consensus deadline as a last-resort
    // bound; the orchestrator is expected to finish first.
    let outer_timeout = config.request_timeout + Duration::from_secs(5);
    let state = AppState {
        orchestrator,
        settings: Arc::new(config),
    };

    Router::new()
        .route(
            "/v1/strategies/llm-consensus",
            get(handlers::health).post(handlers::generate_consensus),
        )
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::custom(
                    crate::service_error::panic_response,
                ))
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(TimeoutLayer::new(outer_timeout)),
        )
        .with_state(state)
}
