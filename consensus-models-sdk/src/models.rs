//! Wire-independent data model shared by adapters, aggregator and callers.
//!
//! Every type here is a plain value: adapters normalize vendor payloads into
//! [`ProviderResponse`], the aggregator folds a set of them into a
//! [`ConsensusResult`], and the HTTP layer serializes both without further
//! interpretation. Map-typed fields use `BTreeMap` so serialized output is
//! deterministic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// A trading decision as voted by a single model or by the consensus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeDecision {
    Buy,
    Sell,
    Hold,
}

impl TradeDecision {
    pub const ALL: [TradeDecision; 3] = [TradeDecision::Buy, TradeDecision::Sell, TradeDecision::Hold];

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDecision::Buy => "BUY",
            TradeDecision::Sell => "SELL",
            TradeDecision::Hold => "HOLD",
        }
    }

    /// Tie-break preference: HOLD beats BUY beats SELL.
    pub fn conservative_rank(&self) -> u8 {
        match self {
            TradeDecision::Hold => 2,
            TradeDecision::Buy => 1,
            TradeDecision::Sell => 0,
        }
    }
}

impl std::fmt::Display for TradeDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeDecision {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Ok(TradeDecision::Buy),
            "SELL" => Ok(TradeDecision::Sell),
            "HOLD" => Ok(TradeDecision::Hold),
            _ => Err(()),
        }
    }
}

/// Reported risk of acting on a signal. Ordering is `low < medium < high`
/// so conservative aggregation is a plain `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            _ => Err(()),
        }
    }
}

/// One consensus query: a snapshot of market indicators for a pair and
/// timeframe. Adapters forward the indicator map verbatim into the prompt
/// and never interpret indicator semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRequest {
    pub pair: String,
    pub timeframe: String,
    pub current_price: f64,
    pub market_data: BTreeMap<String, f64>,
}

/// Normalized output of one successful provider call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    #[serde(rename = "provider")]
    pub provider_name: String,
    pub decision: TradeDecision,
    pub confidence: f64,
    pub reasoning: String,
    pub risk_level: RiskLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_stop_loss: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_take_profit: Option<f64>,
    pub latency_ms: f64,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub cost_usd: f64,
    /// Unparsed model text, kept for debugging only.
    #[serde(skip)]
    pub raw_text: String,
}

/// Aggregation metadata attached to every consensus result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusMetadata {
    pub total_providers: usize,
    pub participating_providers: usize,
    pub agreement_score: f64,
    pub weighted_confidence: f64,
    pub vote_breakdown: BTreeMap<TradeDecision, usize>,
    pub weighted_votes: BTreeMap<TradeDecision, f64>,
    pub total_latency_ms: f64,
    pub total_cost_usd: f64,
    pub total_tokens: u64,
    pub timestamp: DateTime<Utc>,
}

/// The single reconciled decision returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub decision: TradeDecision,
    pub confidence: f64,
    pub reasoning: String,
    pub risk_level: RiskLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_stop_loss: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_take_profit: Option<f64>,
    pub consensus_metadata: ConsensusMetadata,
    pub provider_responses: Vec<ProviderResponse>,
}

/// Lifecycle state of a registered adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderState {
    Active,
    Degraded,
    Unavailable,
    CircuitOpen,
}

impl std::fmt::Display for ProviderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderState::Active => "active",
            ProviderState::Degraded => "degraded",
            ProviderState::Unavailable => "unavailable",
            ProviderState::CircuitOpen => "circuit_open",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of an adapter's runtime counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub state: ProviderState,
    pub requests_total: u64,
    pub errors_total: u64,
    pub error_rate: f64,
    pub average_latency_ms: f64,
    pub consecutive_failures: u32,
    pub last_request_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_parses_case_insensitively() {
        assert_eq!("buy".parse::<TradeDecision>(), Ok(TradeDecision::Buy));
        assert_eq!("Sell".parse::<TradeDecision>(), Ok(TradeDecision::Sell));
        assert_eq!("HOLD".parse::<TradeDecision>(), Ok(TradeDecision::Hold));
        assert!("LONG".parse::<TradeDecision>().is_err());
    }

    #[test]
    fn risk_orders_conservatively() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert_eq!(
            [RiskLevel::Medium, RiskLevel::Low, RiskLevel::High]
                .into_iter()
                .max(),
            Some(RiskLevel::High)
        );
    }

    #[test]
    fn decision_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&TradeDecision::Buy).unwrap(),
            "\"BUY\""
        );
        assert_eq!(
            serde_json::from_str::<TradeDecision>("\"HOLD\"").unwrap(),
            TradeDecision::Hold
        );
    }

    #[test]
    fn consensus_result_round_trips() {
        let result = ConsensusResult {
            decision: TradeDecision::Buy,
            confidence: 0.82,
            reasoning: "Consensus (3/4 providers agree): momentum up".to_string(),
            risk_level: RiskLevel::Medium,
            suggested_stop_loss: Some(48_500.0),
            suggested_take_profit: None,
            consensus_metadata: ConsensusMetadata {
                total_providers: 4,
                participating_providers: 4,
                agreement_score: 0.75,
                weighted_confidence: 0.82,
                vote_breakdown: TradeDecision::ALL.iter().map(|d| (*d, 0usize)).collect(),
                weighted_votes: TradeDecision::ALL.iter().map(|d| (*d, 0.0f64)).collect(),
                total_latency_ms: 420.5,
                total_cost_usd: 0.0245,
                total_tokens: 4_850,
                timestamp: Utc::now(),
            },
            provider_responses: vec![],
        };

        let json = serde_json::to_string(&result).unwrap();
        let back: ConsensusResult = serde_json::from_str(&json).unwrap();
        assert_eq!(serde_json::to_string(&back).unwrap(), json);
    }

    #[test]
    fn vote_maps_serialize_in_stable_order() {
        let votes: BTreeMap<TradeDecision, f64> = [
            (TradeDecision::Hold, 0.8),
            (TradeDecision::Buy, 3.5),
            (TradeDecision::Sell, 0.0),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            serde_json::to_string(&votes).unwrap(),
            r#"{"BUY":3.5,"SELL":0.0,"HOLD":0.8}"#
        );
    }
}
