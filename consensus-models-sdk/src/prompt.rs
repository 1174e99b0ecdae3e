//! Shared prompt construction.
//!
//! All adapters send the same schema; only the transport differs. Keeping
//! the text here means a change to the expected payload shape cannot drift
//! between vendors.

use crate::models::SignalRequest;

/// System instruction: the model must answer with a single JSON object.
pub const SYSTEM_PROMPT: &str = "You are a quantitative trading analyst. \
Analyze the provided market indicators and respond with ONLY a JSON object, \
no prose and no code fences, of the exact shape: \
{\"decision\": \"BUY\" | \"SELL\" | \"HOLD\", \
\"confidence\": <number between 0.0 and 1.0>, \
\"reasoning\": \"<one short paragraph>\", \
\"risk_level\": \"low\" | \"medium\" | \"high\", \
\"suggested_stop_loss\": <price or null>, \
\"suggested_take_profit\": <price or null>}";

/// User message embedding the pair, timeframe, price and indicator map.
pub fn build_user_prompt(request: &SignalRequest) -> String {
    let mut prompt = String::with_capacity(256);
    prompt.push_str(&format!(
        "Trading pair: {}\nTimeframe: {}\nCurrent price: {}\n\nMarket indicators:\n",
        request.pair, request.timeframe, request.current_price
    ));
    for (name, value) in &request.market_data {
        prompt.push_str(&format!("{name}: {value}\n"));
    }
    prompt.push_str("\nProvide your trading decision as the JSON object described.");
    prompt
}
