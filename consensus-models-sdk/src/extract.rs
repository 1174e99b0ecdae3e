//! Tolerant JSON extraction from free-form model text.
//!
//! Vendors are asked for bare JSON but routinely reply with fenced blocks or
//! prose around the payload. Extraction tries, in order: the whole content,
//! the content with an outer code fence stripped, and the first balanced
//! `{ … }` found by brace tracking (string literals and escapes respected).
//!
//! Normalization is centralized here so every adapter produces identical
//! [`ParsedSignal`] values for identical content; the aggregator depends on
//! that for reproducible consensus.

use crate::error::ProviderError;
use crate::models::{RiskLevel, TradeDecision};
use serde_json::Value;

/// The provider-independent fields recovered from one model reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSignal {
    pub decision: TradeDecision,
    pub confidence: f64,
    pub reasoning: String,
    pub risk_level: RiskLevel,
    pub suggested_stop_loss: Option<f64>,
    pub suggested_take_profit: Option<f64>,
}

/// Pull the first JSON object out of `content`, tolerating fences and prose.
pub fn extract_json(content: &str) -> Option<Value> {
    let trimmed = content.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return Some(value);
        }
    }

    if let Some(inner) = strip_code_fence(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(inner.trim()) {
            if value.is_object() {
                return Some(value);
            }
        }
    }

    // Prose may hold several {...} fragments; take the first that parses.
    let mut search_from = 0;
    while let Some(offset) = trimmed[search_from..].find('{') {
        let start = search_from + offset;
        match balanced_object_at(trimmed, start) {
            Some(fragment) => {
                if let Ok(value) = serde_json::from_str::<Value>(fragment) {
                    if value.is_object() {
                        return Some(value);
                    }
                }
                search_from = start + 1;
            }
            None => break,
        }
    }

    None
}

/// Strip an outer ```-fence and its optional language tag.
fn strip_code_fence(content: &str) -> Option<&str> {
    let rest = content.strip_prefix("```")?;
    let body_start = rest.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &rest[body_start..];
    let end = body.rfind("```")?;
    Some(&body[..end])
}

/// Locate the balanced `{ … }` starting at `start`, tracking brace depth
/// while skipping string literals and escape sequences.
fn balanced_object_at(content: &str, start: usize) -> Option<&str> {
    let bytes = content.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&content[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Case-insensitive object field lookup.
fn get_ci<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    let object = value.as_object()?;
    object
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Extract and validate one model reply into a [`ParsedSignal`].
///
/// `decision`, `confidence` and `reasoning` are required; `risk_level`
/// defaults to medium when missing; price suggestions are dropped unless
/// they are finite and positive.
pub fn normalize_signal(provider: &str, content: &str) -> Result<ParsedSignal, ProviderError> {
    let value = extract_json(content).ok_or_else(|| {
        ProviderError::parse(provider, "no JSON object found in model response")
    })?;

    let decision = get_ci(&value, "decision")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::parse(provider, "missing decision field"))?
        .parse::<TradeDecision>()
        .map_err(|_| ProviderError::parse(provider, "decision is not BUY, SELL or HOLD"))?;

    let confidence = get_ci(&value, "confidence")
        .and_then(coerce_number)
        .ok_or_else(|| ProviderError::parse(provider, "missing or non-numeric confidence"))?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(ProviderError::parse(
            provider,
            format!("confidence {confidence} outside [0, 1]"),
        ));
    }

    let reasoning = get_ci(&value, "reasoning")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ProviderError::parse(provider, "missing or empty reasoning"))?
        .to_string();

    let risk_level = match get_ci(&value, "risk_level") {
        None | Some(Value::Null) => RiskLevel::Medium,
        Some(v) => v
            .as_str()
            .and_then(|s| s.parse::<RiskLevel>().ok())
            .ok_or_else(|| ProviderError::parse(provider, "risk_level is not low, medium or high"))?,
    };

    let price_field = |key: &str| {
        get_ci(&value, key)
            .and_then(coerce_number)
            .filter(|p| p.is_finite() && *p > 0.0)
    };

    Ok(ParsedSignal {
        decision,
        confidence,
        reasoning,
        risk_level,
        suggested_stop_loss: price_field("suggested_stop_loss"),
        suggested_take_profit: price_field("suggested_take_profit"),
    })
}
