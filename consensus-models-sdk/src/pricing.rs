//! Per-model pricing tables, in USD per one million tokens.
//!
//! Lookup is exact-match first, then longest prefix, then the table default.
//! Prices only feed cost reporting; they never influence the consensus.

/// (model prefix, input $/1M tokens, output $/1M tokens)
pub type PricingTable = &'static [(&'static str, f64, f64)];

pub const ANTHROPIC_PRICING: PricingTable = &[
    ("claude-3-5-sonnet", 3.00, 15.00),
    ("claude-3-5-haiku", 0.80, 4.00),
    ("claude-3-opus", 15.00, 75.00),
    ("claude-3-haiku", 0.25, 1.25),
];
pub const ANTHROPIC_DEFAULT: (f64, f64) = (3.00, 15.00);

pub const OPENAI_PRICING: PricingTable = &[
    ("gpt-4o-mini", 0.15, 0.60),
    ("gpt-4o", 2.50, 10.00),
    ("gpt-4-turbo", 10.00, 30.00),
    ("gpt-3.5-turbo", 0.50, 1.50),
];
pub const OPENAI_DEFAULT: (f64, f64) = (2.50, 10.00);

pub const GEMINI_PRICING: PricingTable = &[
    ("gemini-1.5-flash", 0.075, 0.30),
    ("gemini-1.5-pro", 3.50, 10.50),
    ("gemini-1.0-pro", 0.50, 1.50),
];
pub const GEMINI_DEFAULT: (f64, f64) = (0.075, 0.30);

pub const GROK_PRICING: PricingTable = &[
    ("grok-2", 2.00, 10.00),
    ("grok-beta", 5.00, 15.00),
];
pub const GROK_DEFAULT: (f64, f64) = (2.00, 10.00);

/// Resolve the (input, output) rate for `model` against a table.
pub fn rates_for(table: PricingTable, default: (f64, f64), model: &str) -> (f64, f64) {
    if let Some((_, input, output)) = table.iter().find(|(name, _, _)| *name == model) {
        return (*input, *output);
    }
    table
        .iter()
        .filter(|(prefix, _, _)| model.starts_with(prefix))
        .max_by_key(|(prefix, _, _)| prefix.len())
        .map(|(_, input, output)| (*input, *output))
        .unwrap_or(default)
}

/// Cost of one call in USD.
pub fn estimate_cost(
    table: PricingTable,
    default: (f64, f64),
    model: &str,
    tokens_in: u32,
    tokens_out: u32,
) -> f64 {
    let (input_rate, output_rate) = rates_for(table, default, model);
    (tokens_in as f64 / 1_000_000.0) * input_rate + (tokens_out as f64 / 1_000_000.0) * output_rate
}
