//! Spend accounting.
//!
//! `pricing` turns token usage into dollars; `CostLedger` keeps running
//! totals per project, agent and model and raises budget alerts.

mod ledger;
pub mod pricing;

pub use ledger::{BudgetAlertPolicy, BudgetStatus, CostLedger, CostSummary, DEFAULT_WARNING_THRESHOLD};
pub use pricing::{
    calculate_cost, calculate_cost_breakdown, pricing_for, CostBreakdown, ModelPricing, TokenUsage, DEFAULT_MODEL,
};
