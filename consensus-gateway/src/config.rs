//! Environment-driven configuration.
//!
//! All provider settings are read from the process environment exactly
//! once at startup. For each supported provider `P` in {ANTHROPIC, OPENAI,
//! GEMINI, GROK}:
//!
//! - `{P}_API_KEY`: absence means the provider is not registered
//! - `{P}_ENABLED` (default true)
//! - `{P}_MODEL` (per-provider default)
//! - `{P}_WEIGHT` (default 1.0)
//! - `{P}_MAX_TOKENS` (default 1024)
//! - `{P}_TEMPERATURE` (default 0.7)
//! - `{P}_TIMEOUT` seconds (default 30)
//! - `{P}_MAX_RETRIES` (default 3)
//! - `{P}_BASE_URL` (optional override)
//!
//! Service-level knobs: `CONSENSUS_MIN_PROVIDERS` (default 2),
//! `CONSENSUS_MIN_CONFIDENCE` (default 0.0), `CONSENSUS_REQUEST_TIMEOUT`
//! seconds (default 30), `CONSENSUS_REASONING_MAX_CHARS` (default 500).
//!
//! A malformed value is a startup error, never a silent default.

use anyhow::{bail, Context};
use consensus_models_sdk::ProviderConfig;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// (registry name, env prefix, default model)
const KNOWN_PROVIDERS: [(&str, &str, &str); 4] = [
    ("anthropic", "ANTHROPIC", "claude-3-5-sonnet-20241022"),
    ("openai", "OPENAI", "gpt-4o-mini"),
    ("gemini", "GEMINI", "gemini-1.5-flash"),
    ("grok", "GROK", "grok-2-latest"),
];

/// Full gateway configuration, assembled once at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub providers: Vec<ProviderConfig>,
    pub min_providers: usize,
    pub min_confidence: f64,
    /// Fixed server-side total deadline for one consensus request.
    pub request_timeout: Duration,
    /// Transport truncation of per-provider reasonings.
    pub reasoning_max_chars: usize,
}

impl GatewayConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Testable core: `lookup` stands in for the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut providers = Vec::new();
        for (name, prefix, default_model) in KNOWN_PROVIDERS {
            let Some(api_key) = lookup(&format!("{prefix}_API_KEY")) else {
                continue;
            };
            let config = ProviderConfig::new(name, api_key)
                .with_model(
                    lookup(&format!("{prefix}_MODEL"))
                        .unwrap_or_else(|| default_model.to_string()),
                )
                .with_enabled(parse_or(&lookup, &format!("{prefix}_ENABLED"), true)?)
                .with_weight(parse_or(&lookup, &format!("{prefix}_WEIGHT"), 1.0)?)
                .with_max_tokens(parse_or(&lookup, &format!("{prefix}_MAX_TOKENS"), 1024)?)
                .with_temperature(parse_or(&lookup, &format!("{prefix}_TEMPERATURE"), 0.7)?)
                .with_request_timeout(Duration::from_secs(parse_or(
                    &lookup,
                    &format!("{prefix}_TIMEOUT"),
                    30,
                )?))
                .with_max_retries(parse_or(&lookup, &format!("{prefix}_MAX_RETRIES"), 3)?);
            let config = match lookup(&format!("{prefix}_BASE_URL")) {
                Some(base_url) => config.with_base_url(base_url),
                None => config,
            };
            config
                .validate()
                .with_context(|| format!("invalid configuration for provider {name}"))?;
            providers.push(config);
        }

        let min_providers = parse_or(&lookup, "CONSENSUS_MIN_PROVIDERS", 2usize)?;
        if min_providers == 0 {
            bail!("CONSENSUS_MIN_PROVIDERS must be at least 1");
        }
        let min_confidence = parse_or(&lookup, "CONSENSUS_MIN_CONFIDENCE", 0.0f64)?;
        if !(0.0..=1.0).contains(&min_confidence) {
            bail!("CONSENSUS_MIN_CONFIDENCE must be within [0, 1]");
        }

        Ok(Self {
            providers,
            min_providers,
            min_confidence,
            request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "CONSENSUS_REQUEST_TIMEOUT",
                30,
            )?),
            reasoning_max_chars: parse_or(&lookup, "CONSENSUS_REASONING_MAX_CHARS", 500)?,
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}
