//! Process-wide provider registry.
//!
//! Owns every live adapter for the lifetime of the process. Reads
//! (`get`, `available_providers`) take a shared lock and never suspend;
//! writes (`register`) are serialized. `available_providers` returns
//! adapters in registration order, so iteration order is stable for the
//! process lifetime.

use crate::models::ProviderState;
use crate::providers::SignalProvider;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("provider {0} is already registered")]
    Duplicate(String),
}

#[derive(Default)]
struct RegistryInner {
    providers: HashMap<String, Arc<dyn SignalProvider>>,
    order: Vec<String>,
}

/// Store of live adapters, keyed by provider name.
#[derive(Default)]
pub struct ProviderRegistry {
    inner: RwLock<RegistryInner>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an adapter. Duplicate names are an error, never a replacement.
    pub fn register(&self, provider: Arc<dyn SignalProvider>) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        let name = provider.name().to_string();
        if inner.providers.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        tracing::info!(provider = %name, weight = provider.weight(), "registered provider");
        inner.order.push(name.clone());
        inner.providers.insert(name, provider);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SignalProvider>> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.providers.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("registry lock poisoned").order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All registered adapters in registration order.
    pub fn all(&self) -> Vec<Arc<dyn SignalProvider>> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner
            .order
            .iter()
            .filter_map(|name| inner.providers.get(name).cloned())
            .collect()
    }

    /// Adapters eligible for fan-out: enabled, and neither circuit-open
    /// nor unavailable.
    pub fn available_providers(&self) -> Vec<Arc<dyn SignalProvider>> {
        self.all()
            .into_iter()
            .filter(|provider| {
                provider.is_enabled()
                    && matches!(
                        provider.status().state,
                        ProviderState::Active | ProviderState::Degraded
                    )
            })
            .collect()
    }

    /// Flip an adapter's enabled flag. Returns false when the name is
    /// unknown. Idempotent.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        match self.get(name) {
            Some(provider) => {
                provider.set_enabled(enabled);
                true
            }
            None => false,
        }
    }

    /// Probe every registered adapter concurrently. Each probe updates the
    /// adapter's own status; the raw outcomes are returned unchanged.
    pub async fn health_check_all(&self, deadline: Instant) -> HashMap<String, bool> {
        let providers = self.all();
        let probes = providers.iter().map(|provider| {
            let provider = Arc::clone(provider);
            async move {
                let healthy = provider.health_check(deadline).await;
                (provider.name().to_string(), healthy)
            }
        });
        futures::future::join_all(probes).await.into_iter().collect()
    }
}
