//! Weighted-vote consensus aggregation.
//!
//! A pure function over already-normalized provider responses. Given the
//! same responses and weights it always produces the same decision,
//! confidence and breakdowns; only the metadata timestamp reads the clock.
//!
//! Tie-break between decisions whose weighted votes are within `1e-9`:
//! higher raw vote count, then higher mean confidence among that
//! decision's voters, then the conservative order HOLD over BUY over SELL.

use crate::models::{
    ConsensusMetadata, ConsensusResult, ProviderResponse, RiskLevel, TradeDecision,
};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Weighted votes closer than this are considered tied.
const VOTE_EPSILON: f64 = 1e-9;

/// Longest reasoning excerpt embedded in the consensus synthesis.
const REASONING_EXCERPT_MAX: usize = 500;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("insufficient responses after filtering: {participating} of {required} required")]
    Insufficient {
        participating: usize,
        required: usize,
    },
    #[error("all weighted votes are zero")]
    EmptyVotes,
}

/// Reconcile provider responses into one consensus decision.
///
/// `weights` maps provider name to vote weight; providers absent from the
/// map weigh 1.0, and negative weights count as 0. Responses below
/// `min_confidence` are dropped before voting; fewer than `min_providers`
/// survivors is an error, as is a vote where every weight is zero.
pub fn aggregate(
    responses: &[ProviderResponse],
    weights: &HashMap<String, f64>,
    min_providers: usize,
    min_confidence: f64,
) -> Result<ConsensusResult, AggregateError> {
    let participants: Vec<&ProviderResponse> = responses
        .iter()
        .filter(|r| r.confidence >= min_confidence)
        .collect();
    let participating = participants.len();
    if participating < min_providers {
        return Err(AggregateError::Insufficient {
            participating,
            required: min_providers,
        });
    }

    let weight_of = |response: &ProviderResponse| -> f64 {
        weights
            .get(&response.provider_name)
            .copied()
            .unwrap_or(1.0)
            .max(0.0)
    };

    let mut weighted_votes: BTreeMap<TradeDecision, f64> =
        TradeDecision::ALL.iter().map(|d| (*d, 0.0)).collect();
    let mut vote_breakdown: BTreeMap<TradeDecision, usize> =
        TradeDecision::ALL.iter().map(|d| (*d, 0)).collect();
    for response in &participants {
        *weighted_votes.get_mut(&response.decision).expect("all decisions present") +=
            weight_of(response) * response.confidence;
        *vote_breakdown.get_mut(&response.decision).expect("all decisions present") += 1;
    }

    let total_weight: f64 = weighted_votes.values().sum();
    if total_weight <= 0.0 {
        return Err(AggregateError::EmptyVotes);
    }

    let winner = select_winner(&weighted_votes, &vote_breakdown, &participants);
    let winners: Vec<&ProviderResponse> = participants
        .iter()
        .copied()
        .filter(|r| r.decision == winner)
        .collect();

    let confidence = (weighted_votes[&winner] / total_weight).clamp(0.0, 1.0);
    let agreement_score = vote_breakdown[&winner] as f64 / participating as f64;

    let risk_level = winners
        .iter()
        .map(|r| r.risk_level)
        .max()
        .unwrap_or(RiskLevel::Medium);

    let suggested_stop_loss = median(
        winners
            .iter()
            .filter_map(|r| r.suggested_stop_loss)
            .collect(),
    );
    let suggested_take_profit = median(
        winners
            .iter()
            .filter_map(|r| r.suggested_take_profit)
            .collect(),
    );

    let reasoning = synthesize_reasoning(&winners, participating);

    let total_latency_ms = participants.iter().map(|r| r.latency_ms).sum();
    let total_cost_usd = participants.iter().map(|r| r.cost_usd).sum();
    let total_tokens = participants
        .iter()
        .map(|r| u64::from(r.tokens_in) + u64::from(r.tokens_out))
        .sum();

    Ok(ConsensusResult {
        decision: winner,
        confidence,
        reasoning,
        risk_level,
        suggested_stop_loss,
        suggested_take_profit,
        consensus_metadata: ConsensusMetadata {
            total_providers: responses.len(),
            participating_providers: participating,
            agreement_score,
            weighted_confidence: confidence,
            vote_breakdown,
            weighted_votes,
            total_latency_ms,
            total_cost_usd,
            total_tokens,
            timestamp: Utc::now(),
        },
        provider_responses: participants.into_iter().cloned().collect(),
    })
}

fn select_winner(
    weighted_votes: &BTreeMap<TradeDecision, f64>,
    vote_breakdown: &BTreeMap<TradeDecision, usize>,
    participants: &[&ProviderResponse],
) -> TradeDecision {
    let max_votes = weighted_votes.values().cloned().fold(f64::MIN, f64::max);
    let mut candidates: Vec<TradeDecision> = TradeDecision::ALL
        .iter()
        .copied()
        .filter(|d| (max_votes - weighted_votes[d]).abs() <= VOTE_EPSILON)
        .collect();
    if candidates.len() > 1 {
        let max_count = candidates.iter().map(|d| vote_breakdown[d]).max().unwrap_or(0);
        candidates.retain(|d| vote_breakdown[d] == max_count);
    }
    if candidates.len() > 1 {
        let mean_confidence = |d: TradeDecision| -> f64 {
            let voters: Vec<f64> = participants
                .iter()
                .filter(|r| r.decision == d)
                .map(|r| r.confidence)
                .collect();
            if voters.is_empty() {
                0.0
            } else {
                voters.iter().sum::<f64>() / voters.len() as f64
            }
        };
        let max_mean = candidates
            .iter()
            .map(|d| mean_confidence(*d))
            .fold(f64::MIN, f64::max);
        candidates.retain(|d| (max_mean - mean_confidence(*d)).abs() <= VOTE_EPSILON);
    }
    candidates
        .into_iter()
        .max_by_key(|d| d.conservative_rank())
        .expect("at least one candidate decision")
}

/// Median over the collected values; an even count averages the middle two.
fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).expect("finite price suggestions"));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

fn synthesize_reasoning(winners: &[&ProviderResponse], participating: usize) -> String {
    let best = winners
        .iter()
        .max_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .expect("confidence validated finite")
        })
        .expect("winner set is never empty");
    let mut excerpt = best.reasoning.clone();
    if excerpt.chars().count() > REASONING_EXCERPT_MAX {
        excerpt = excerpt.chars().take(REASONING_EXCERPT_MAX).collect::<String>() + "…";
    }
    format!(
        "Consensus ({}/{} providers agree): {}",
        winners.len(),
        participating,
        excerpt
    )
}
