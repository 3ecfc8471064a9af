//! Static model pricing.
//!
//! All rates are USD per million tokens. Unknown model ids fall back to
//! [`DEFAULT_MODEL`]; lookups never fail.
//!
//! ```
//! use loopdeck_lib::cost::{calculate_cost, TokenUsage};
//!
//! let usage = TokenUsage::new(1_000_000, 500_000);
//! let cost = calculate_cost(&usage, "claude-3-haiku-20240307");
//! assert!((cost - 0.875).abs() < 1e-9);
//! ```

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

const TOKENS_PER_UNIT: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub const fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }
}

/// Cost of a usage sample (or an accumulation of them) for one model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

impl CostBreakdown {
    pub(crate) fn absorb(&mut self, other: &CostBreakdown) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.input_cost += other.input_cost;
        self.output_cost += other.output_cost;
        self.total_cost += other.total_cost;
    }
}

static PRICING_TABLE: Lazy<HashMap<&'static str, ModelPricing>> = Lazy::new(|| {
    let haiku_3 = ModelPricing::new(0.25, 1.25);
    let haiku_3_5 = ModelPricing::new(0.8, 4.0);
    let haiku_4_5 = ModelPricing::new(1.0, 5.0);
    let sonnet = ModelPricing::new(3.0, 15.0);
    let opus = ModelPricing::new(15.0, 75.0);

    HashMap::from([
        ("claude-3-haiku-20240307", haiku_3),
        ("claude-3-5-haiku-20241022", haiku_3_5),
        ("claude-haiku-4-5-20251001", haiku_4_5),
        ("claude-3-sonnet-20240229", sonnet),
        ("claude-3-5-sonnet-20240620", sonnet),
        ("claude-3-5-sonnet-20241022", sonnet),
        ("claude-3-7-sonnet-20250219", sonnet),
        ("claude-sonnet-4-20250514", sonnet),
        ("claude-sonnet-4-5-20250929", sonnet),
        ("claude-3-opus-20240229", opus),
        ("claude-opus-4-20250514", opus),
        ("claude-opus-4-1-20250805", opus),
    ])
});

pub fn is_known_model(model: &str) -> bool {
    PRICING_TABLE.contains_key(model)
}

pub fn known_models() -> Vec<&'static str> {
    let mut models: Vec<_> = PRICING_TABLE.keys().copied().collect();
    models.sort_unstable();
    models
}

pub fn pricing_for(model: &str) -> ModelPricing {
    PRICING_TABLE
        .get(model)
        .or_else(|| PRICING_TABLE.get(DEFAULT_MODEL))
        .copied()
        .unwrap_or(ModelPricing::new(3.0, 15.0))
}

pub fn calculate_cost_breakdown(usage: &TokenUsage, model: &str) -> CostBreakdown {
    let pricing = pricing_for(model);
    let input_cost = usage.input_tokens as f64 / TOKENS_PER_UNIT * pricing.input_per_million;
    let output_cost = usage.output_tokens as f64 / TOKENS_PER_UNIT * pricing.output_per_million;
    CostBreakdown {
        model: model.to_string(),
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        input_cost,
        output_cost,
        total_cost: input_cost + output_cost,
    }
}

pub fn calculate_cost(usage: &TokenUsage, model: &str) -> f64 {
    calculate_cost_breakdown(usage, model).total_cost
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haiku_3_rates() {
        let pricing = pricing_for("claude-3-haiku-20240307");
        assert_eq!(pricing.input_per_million, 0.25);
        assert_eq!(pricing.output_per_million, 1.25);
    }

    #[test]
    fn test_unknown_model_uses_default() {
        assert!(!is_known_model("gpt-nonexistent"));
        assert_eq!(pricing_for("gpt-nonexistent"), pricing_for(DEFAULT_MODEL));
    }

    #[test]
    fn test_default_model_is_priced() {
        assert!(is_known_model(DEFAULT_MODEL));
        assert!(known_models().contains(&DEFAULT_MODEL));
    }

    #[test]
    fn test_breakdown_splits_input_and_output() {
        let breakdown = calculate_cost_breakdown(&TokenUsage::new(2_000_000, 1_000_000), "claude-opus-4-20250514");
        assert_eq!(breakdown.input_cost, 30.0);
        assert_eq!(breakdown.output_cost, 75.0);
        assert_eq!(breakdown.total_cost, 105.0);
        assert_eq!(breakdown.input_tokens, 2_000_000);
    }

    #[test]
    fn test_zero_usage_costs_nothing() {
        assert_eq!(calculate_cost(&TokenUsage::default(), "anything"), 0.0);
    }

    #[test]
    fn test_small_sample() {
        // 10K sonnet input tokens = $0.03
        let cost = calculate_cost(&TokenUsage::new(10_000, 0), "claude-sonnet-4-20250514");
        assert!((cost - 0.03).abs() < 1e-12);
    }
}
