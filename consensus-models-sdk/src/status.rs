//! Per-adapter runtime state and the circuit state machine.
//!
//! Each adapter owns one [`StatusTracker`]; every call records its outcome
//! here and the registry reads the derived [`ProviderState`] to decide
//! availability. Transitions:
//!
//! - error rate above 50% over the trailing window (once at least ten
//!   outcomes exist) moves ACTIVE to DEGRADED, and back when it clears;
//! - five consecutive failures open the circuit; new calls are refused for
//!   a cooldown (default 60 s), after which the state becomes DEGRADED
//!   pending the next outcome;
//! - health probes mark an adapter UNAVAILABLE, and recover it to ACTIVE,
//!   without touching an open circuit.

use crate::models::{ProviderState, ProviderStatus};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const OUTCOME_WINDOW: usize = 20;
const MIN_WINDOW_SAMPLES: usize = 10;
const DEGRADED_ERROR_RATE: f64 = 0.5;
const CIRCUIT_FAILURE_THRESHOLD: u32 = 5;
const LATENCY_SAMPLES: usize = 100;

pub const DEFAULT_CIRCUIT_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct StatusInner {
    state: ProviderState,
    requests_total: u64,
    errors_total: u64,
    consecutive_failures: u32,
    outcome_window: VecDeque<bool>,
    latency_samples: VecDeque<f64>,
    last_request_at: Option<DateTime<Utc>>,
    circuit_opened_at: Option<Instant>,
}

impl Default for StatusInner {
    fn default() -> Self {
        Self {
            state: ProviderState::Active,
            requests_total: 0,
            errors_total: 0,
            consecutive_failures: 0,
            outcome_window: VecDeque::with_capacity(OUTCOME_WINDOW),
            latency_samples: VecDeque::with_capacity(LATENCY_SAMPLES),
            last_request_at: None,
            circuit_opened_at: None,
        }
    }
}

impl StatusInner {
    fn push_outcome(&mut self, success: bool, latency_ms: f64) {
        self.requests_total += 1;
        self.last_request_at = Some(Utc::now());
        if self.outcome_window.len() == OUTCOME_WINDOW {
            self.outcome_window.pop_front();
        }
        self.outcome_window.push_back(success);
        if self.latency_samples.len() == LATENCY_SAMPLES {
            self.latency_samples.pop_front();
        }
        self.latency_samples.push_back(latency_ms);
    }

    fn window_error_rate(&self) -> Option<f64> {
        if self.outcome_window.len() < MIN_WINDOW_SAMPLES {
            return None;
        }
        let failures = self.outcome_window.iter().filter(|ok| !**ok).count();
        Some(failures as f64 / self.outcome_window.len() as f64)
    }

    /// Re-derive ACTIVE/DEGRADED from the trailing window. Leaves the
    /// UNAVAILABLE and CIRCUIT_OPEN states alone.
    fn reconcile_window_state(&mut self) {
        if !matches!(
            self.state,
            ProviderState::Active | ProviderState::Degraded
        ) {
            return;
        }
        match self.window_error_rate() {
            Some(rate) if rate > DEGRADED_ERROR_RATE => self.state = ProviderState::Degraded,
            Some(_) => self.state = ProviderState::Active,
            None => {}
        }
    }

    /// An expired cooldown moves CIRCUIT_OPEN to DEGRADED.
    fn reconcile_cooldown(&mut self, cooldown: Duration, provider: &str) {
        if self.state != ProviderState::CircuitOpen {
            return;
        }
        if let Some(opened_at) = self.circuit_opened_at {
            if opened_at.elapsed() >= cooldown {
                self.state = ProviderState::Degraded;
                self.circuit_opened_at = None;
                self.consecutive_failures = 0;
                tracing::info!(provider, "circuit cooldown elapsed, provider degraded");
            }
        }
    }
}

/// Thread-safe runtime state owned by one adapter.
#[derive(Debug)]
pub struct StatusTracker {
    provider: String,
    enabled: AtomicBool,
    cooldown: Duration,
    inner: Mutex<StatusInner>,
}

impl StatusTracker {
    pub fn new(provider: impl Into<String>, enabled: bool) -> Self {
        Self::with_cooldown(provider, enabled, DEFAULT_CIRCUIT_COOLDOWN)
    }

    pub fn with_cooldown(provider: impl Into<String>, enabled: bool, cooldown: Duration) -> Self {
        Self {
            provider: provider.into(),
            enabled: AtomicBool::new(enabled),
            cooldown,
            inner: Mutex::new(StatusInner::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Gate for new work. Refuses while the circuit is open and the
    /// cooldown has not elapsed.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock().expect("status lock poisoned");
        inner.reconcile_cooldown(self.cooldown, &self.provider);
        inner.state != ProviderState::CircuitOpen
    }

    pub fn record_success(&self, latency_ms: f64) {
        let mut inner = self.inner.lock().expect("status lock poisoned");
        inner.push_outcome(true, latency_ms);
        inner.consecutive_failures = 0;
        if inner.state == ProviderState::CircuitOpen {
            // A call slipped through right as the cooldown expired.
            inner.circuit_opened_at = None;
            inner.state = ProviderState::Active;
        }
        if inner.state == ProviderState::Unavailable {
            inner.state = ProviderState::Active;
        }
        inner.reconcile_window_state();
    }

    pub fn record_failure(&self, latency_ms: f64) {
        let mut inner = self.inner.lock().expect("status lock poisoned");
        inner.push_outcome(false, latency_ms);
        inner.errors_total += 1;
        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= CIRCUIT_FAILURE_THRESHOLD
            && inner.state != ProviderState::CircuitOpen
        {
            inner.state = ProviderState::CircuitOpen;
            inner.circuit_opened_at = Some(Instant::now());
            tracing::warn!(
                provider = %self.provider,
                failures = inner.consecutive_failures,
                "circuit opened after consecutive failures"
            );
            return;
        }
        inner.reconcile_window_state();
    }

    /// Health-probe outcome. A failed probe parks the adapter as
    /// UNAVAILABLE; a successful probe recovers it. An open circuit is
    /// left to its cooldown.
    pub fn record_probe(&self, healthy: bool) {
        let mut inner = self.inner.lock().expect("status lock poisoned");
        if inner.state == ProviderState::CircuitOpen {
            return;
        }
        if healthy {
            if inner.state == ProviderState::Unavailable {
                inner.state = ProviderState::Active;
                tracing::info!(provider = %self.provider, "provider recovered by health probe");
            }
        } else if inner.state != ProviderState::Unavailable {
            inner.state = ProviderState::Unavailable;
            tracing::warn!(provider = %self.provider, "health probe failed, provider unavailable");
        }
    }

    pub fn snapshot(&self) -> ProviderStatus {
        let mut inner = self.inner.lock().expect("status lock poisoned");
        inner.reconcile_cooldown(self.cooldown, &self.provider);
        let error_rate = if inner.requests_total == 0 {
            0.0
        } else {
            inner.errors_total as f64 / inner.requests_total as f64
        };
        let average_latency_ms = if inner.latency_samples.is_empty() {
            0.0
        } else {
            inner.latency_samples.iter().sum::<f64>() / inner.latency_samples.len() as f64
        };
        ProviderStatus {
            state: inner.state,
            requests_total: inner.requests_total,
            errors_total: inner.errors_total,
            error_rate,
            average_latency_ms,
            consecutive_failures: inner.consecutive_failures,
            last_request_at: inner.last_request_at,
        }
    }

    pub fn state(&self) -> ProviderState {
        self.snapshot().state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_active() {
        let tracker = StatusTracker::new("openai", true);
        assert_eq!(tracker.state(), ProviderState::Active);
        assert!(tracker.allow_request());
    }

    #[test]
    fn five_consecutive_failures_open_the_circuit() {
        let tracker = StatusTracker::new("openai", true);
        for _ in 0..4 {
            tracker.record_failure(10.0);
        }
        assert_ne!(tracker.state(), ProviderState::CircuitOpen);
        tracker.record_failure(10.0);
        assert_eq!(tracker.state(), ProviderState::CircuitOpen);
        assert!(!tracker.allow_request());
    }

    #[test]
    fn success_resets_the_consecutive_counter() {
        let tracker = StatusTracker::new("openai", true);
        for _ in 0..4 {
            tracker.record_failure(10.0);
        }
        tracker.record_success(10.0);
        for _ in 0..4 {
            tracker.record_failure(10.0);
        }
        assert_ne!(tracker.state(), ProviderState::CircuitOpen);
    }

    #[test]
    fn cooldown_reopens_as_degraded() {
        let tracker = StatusTracker::with_cooldown("openai", true, Duration::from_millis(0));
        for _ in 0..5 {
            tracker.record_failure(10.0);
        }
        // Zero cooldown: the next gate check must degrade instead of refuse.
        assert!(tracker.allow_request());
        assert_eq!(tracker.state(), ProviderState::Degraded);
    }

    #[test]
    fn high_window_error_rate_degrades() {
        let tracker = StatusTracker::new("gemini", true);
        // Interleave so the consecutive-failure threshold never trips.
        for _ in 0..6 {
            tracker.record_failure(10.0);
            tracker.record_failure(10.0);
            tracker.record_success(10.0);
        }
        assert_eq!(tracker.state(), ProviderState::Degraded);
    }

    #[test]
    fn recovery_clears_degraded_state() {
        let tracker = StatusTracker::new("gemini", true);
        for _ in 0..6 {
            tracker.record_failure(10.0);
            tracker.record_failure(10.0);
            tracker.record_success(10.0);
        }
        assert_eq!(tracker.state(), ProviderState::Degraded);
        for _ in 0..OUTCOME_WINDOW {
            tracker.record_success(10.0);
        }
        assert_eq!(tracker.state(), ProviderState::Active);
    }

    #[test]
    fn probe_failure_marks_unavailable_and_probe_success_recovers() {
        let tracker = StatusTracker::new("anthropic", true);
        tracker.record_probe(false);
        assert_eq!(tracker.state(), ProviderState::Unavailable);
        tracker.record_probe(true);
        assert_eq!(tracker.state(), ProviderState::Active);
    }

    #[test]
    fn probe_does_not_touch_an_open_circuit() {
        let tracker = StatusTracker::new("anthropic", true);
        for _ in 0..5 {
            tracker.record_failure(10.0);
        }
        tracker.record_probe(true);
        assert_eq!(tracker.state(), ProviderState::CircuitOpen);
    }

    #[test]
    fn snapshot_reports_counters() {
        let tracker = StatusTracker::new("grok", true);
        tracker.record_success(100.0);
        tracker.record_failure(300.0);
        let status = tracker.snapshot();
        assert_eq!(status.requests_total, 2);
        assert_eq!(status.errors_total, 1);
        assert!((status.error_rate - 0.5).abs() < 1e-9);
        assert!((status.average_latency_ms - 200.0).abs() < 1e-9);
        assert!(status.last_request_at.is_some());
    }

    #[test]
    fn enabled_flag_toggles_idempotently() {
        let tracker = StatusTracker::new("grok", true);
        tracker.set_enabled(false);
        tracker.set_enabled(false);
        assert!(!tracker.is_enabled());
        tracker.set_enabled(true);
        assert!(tracker.is_enabled());
    }
}
