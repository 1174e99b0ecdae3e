//! # Consensus Gateway
//!
//! Synchronous HTTP surface over the multi-LLM consensus engine:
//!
//! - `POST /v1/strategies/llm-consensus`: validate a market snapshot,
//!   fan out to every available provider, and return the weighted
//!   consensus with per-provider breakdowns.
//! - `GET /v1/strategies/llm-consensus`: health probe reporting
//!   availability against the configured quorum.
//!
//! Providers are configured entirely through the process environment and
//! registered once at startup; see [`config`] for the variable reference.

pub mod config;
pub mod handlers;
pub mod server;
pub mod service_error;

pub use server::create_server;

#[cfg(test)]
mod tests;
