use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, Weak};

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::pricing::{calculate_cost_breakdown, CostBreakdown, TokenUsage, DEFAULT_MODEL};
use crate::bus::{Event, EventDraft, EventEmitter, EventRouter, EventType, Subscription};

pub const DEFAULT_WARNING_THRESHOLD: f64 = 0.8;

/// Running spend for one project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub project_id: String,
    pub total_cost: f64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub budget_limit: Option<f64>,
    /// Fraction of the budget spent (`0.85` = 85%); 0 without a budget.
    pub budget_used_percentage: f64,
    pub cost_by_model: HashMap<String, CostBreakdown>,
    pub agent_costs: HashMap<String, f64>,
}

impl CostSummary {
    fn new(project_id: &str, budget_limit: Option<f64>) -> Self {
        let mut summary = Self {
            project_id: project_id.to_string(),
            budget_limit,
            ..Self::default()
        };
        summary.recompute_usage();
        summary
    }

    fn recompute_usage(&mut self) {
        self.budget_used_percentage = match self.budget_limit {
            Some(limit) if limit > 0.0 => self.total_cost / limit,
            _ => 0.0,
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetStatus {
    pub current_cost: f64,
    pub remaining: f64,
    pub percentage_used: f64,
    pub is_at_warning: bool,
    pub is_exceeded: bool,
}

/// When `check_budget` announces threshold crossings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BudgetAlertPolicy {
    /// Emit on every call where a threshold holds.
    #[default]
    EveryCheck,
    /// Emit only when a project's alert level rises; a drop re-arms it.
    OncePerLevel,
}

impl BudgetAlertPolicy {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EveryCheck => "every-check",
            Self::OncePerLevel => "once-per-level",
        }
    }
}

impl FromStr for BudgetAlertPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "every-check" | "every_check" | "always" => Ok(Self::EveryCheck),
            "once-per-level" | "once_per_level" | "once" => Ok(Self::OncePerLevel),
            _ => Err(format!("unknown budget alert policy: {value}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum AlertLevel {
    Clear,
    Warning,
    Exceeded,
}

#[derive(Deserialize)]
struct IterationUsage {
    model: Option<String>,
    usage: Option<TokenUsage>,
    budget_limit: Option<f64>,
}

/// In-memory spend per project, agent and model.
///
/// This is a derived view for budgeting and UI; the persisted project record
/// remains the source of truth for billed totals.
pub struct CostLedger {
    emitter: Arc<dyn EventEmitter>,
    policy: BudgetAlertPolicy,
    default_model: String,
    warning_threshold: f64,
    summaries: Mutex<HashMap<String, CostSummary>>,
    alert_levels: Mutex<HashMap<String, AlertLevel>>,
}

impl CostLedger {
    pub fn new(emitter: Arc<dyn EventEmitter>) -> Self {
        Self::with_policy(emitter, BudgetAlertPolicy::default())
    }

    pub fn with_policy(emitter: Arc<dyn EventEmitter>, policy: BudgetAlertPolicy) -> Self {
        Self {
            emitter,
            policy,
            default_model: DEFAULT_MODEL.to_string(),
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
            summaries: Mutex::new(HashMap::new()),
            alert_levels: Mutex::new(HashMap::new()),
        }
    }

    /// Model assumed for iteration reports that do not name one.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Threshold used when usage arriving through [`CostLedger::attach`]
    /// triggers a budget check.
    pub fn with_warning_threshold(mut self, threshold: f64) -> Self {
        self.warning_threshold = threshold;
        self
    }

    pub fn policy(&self) -> BudgetAlertPolicy {
        self.policy
    }

    pub fn calculate_cost(usage: &TokenUsage, model: &str) -> f64 {
        super::pricing::calculate_cost(usage, model)
    }

    pub fn calculate_cost_breakdown(usage: &TokenUsage, model: &str) -> CostBreakdown {
        calculate_cost_breakdown(usage, model)
    }

    /// Subscribe to `agent_iteration_complete` and track the usage it carries,
    /// then check the project's budget when it has one.
    ///
    /// The listener holds a weak reference, so the router does not keep the
    /// ledger alive.
    pub fn attach(self: &Arc<Self>, router: &EventRouter) -> Subscription {
        let ledger: Weak<Self> = Arc::downgrade(self);
        router.subscribe(EventType::AgentIterationComplete, move |event| {
            if let Some(ledger) = ledger.upgrade() {
                ledger.track_iteration(event);
            }
        })
    }

    fn track_iteration(&self, event: &Event) {
        let Some(project_id) = event.project_id.as_deref() else {
            return;
        };
        let report: IterationUsage = match serde_json::from_value(event.data.clone()) {
            Ok(report) => report,
            Err(e) => {
                tracing::debug!(project_id, "ignoring iteration event without usage: {e}");
                return;
            }
        };
        let Some(usage) = report.usage else {
            return;
        };
        let agent_id = event.agent_id.as_deref().unwrap_or("unassigned");
        let model = report.model.as_deref().unwrap_or(&self.default_model);
        self.track_cost(project_id, agent_id, &usage, model, report.budget_limit);

        let limit = self.get_project_cost(project_id).and_then(|summary| summary.budget_limit);
        if let Some(limit) = limit {
            self.check_budget(project_id, limit, self.warning_threshold);
        }
    }

    /// Add one usage sample to a project's running totals and announce it.
    ///
    /// Returns the cost of this sample alone.
    pub fn track_cost(
        &self,
        project_id: &str,
        agent_id: &str,
        usage: &TokenUsage,
        model: &str,
        budget_limit: Option<f64>,
    ) -> CostBreakdown {
        let increment = calculate_cost_breakdown(usage, model);
        let budget_limit = budget_limit.filter(|limit| valid_limit(*limit, project_id));

        let snapshot = {
            let mut guard = self.summaries.lock().expect("cost ledger mutex poisoned");
            let summary = guard
                .entry(project_id.to_string())
                .or_insert_with(|| CostSummary::new(project_id, None));

            summary.total_cost += increment.total_cost;
            summary.total_input_tokens = summary.total_input_tokens.saturating_add(usage.input_tokens);
            summary.total_output_tokens = summary.total_output_tokens.saturating_add(usage.output_tokens);
            if budget_limit.is_some() {
                summary.budget_limit = budget_limit;
            }
            summary.recompute_usage();
            summary
                .cost_by_model
                .entry(model.to_string())
                .or_insert_with(|| CostBreakdown {
                    model: model.to_string(),
                    ..CostBreakdown::default()
                })
                .absorb(&increment);
            *summary.agent_costs.entry(agent_id.to_string()).or_insert(0.0) += increment.total_cost;
            summary.clone()
        };

        self.emitter.emit(
            EventType::CostUpdated,
            EventDraft::for_project(
                project_id,
                json!({
                    "model": model,
                    "input_tokens": usage.input_tokens,
                    "output_tokens": usage.output_tokens,
                    "cost": increment.total_cost,
                    "total_cost": snapshot.total_cost,
                    "total_input_tokens": snapshot.total_input_tokens,
                    "total_output_tokens": snapshot.total_output_tokens,
                    "budget_limit": snapshot.budget_limit,
                    "budget_used_percentage": snapshot.budget_used_percentage,
                }),
            )
            .with_agent(agent_id),
        );

        increment
    }

    /// Evaluate a project's spend against `budget_limit`, emitting
    /// `budget_warning` / `budget_exceeded` as dictated by the alert policy.
    ///
    /// A non-positive or non-finite limit means "no budget": every flag is
    /// false and nothing is emitted.
    pub fn check_budget(&self, project_id: &str, budget_limit: f64, warning_threshold: f64) -> BudgetStatus {
        let current_cost = {
            let guard = self.summaries.lock().expect("cost ledger mutex poisoned");
            guard.get(project_id).map_or(0.0, |summary| summary.total_cost)
        };

        if !(budget_limit.is_finite() && budget_limit > 0.0) {
            return BudgetStatus {
                current_cost,
                remaining: 0.0,
                percentage_used: 0.0,
                is_at_warning: false,
                is_exceeded: false,
            };
        }

        let percentage_used = current_cost / budget_limit;
        let is_exceeded = current_cost >= budget_limit;
        let status = BudgetStatus {
            current_cost,
            remaining: (budget_limit - current_cost).max(0.0),
            percentage_used,
            is_at_warning: percentage_used >= warning_threshold,
            is_exceeded,
        };

        let level = if status.is_exceeded {
            AlertLevel::Exceeded
        } else if status.is_at_warning {
            AlertLevel::Warning
        } else {
            AlertLevel::Clear
        };
        if self.should_alert(project_id, level) {
            let event_type = match level {
                AlertLevel::Exceeded => EventType::BudgetExceeded,
                _ => EventType::BudgetWarning,
            };
            tracing::info!(project_id, current_cost, budget_limit, "{event_type}");
            self.emitter.emit(
                event_type,
                EventDraft::for_project(
                    project_id,
                    json!({
                        "current_cost": status.current_cost,
                        "budget_limit": budget_limit,
                        "remaining": status.remaining,
                        "percentage_used": status.percentage_used,
                        "warning_threshold": warning_threshold,
                    }),
                ),
            );
        }

        status
    }

    fn should_alert(&self, project_id: &str, level: AlertLevel) -> bool {
        match self.policy {
            BudgetAlertPolicy::EveryCheck => level != AlertLevel::Clear,
            BudgetAlertPolicy::OncePerLevel => {
                let mut guard = self.alert_levels.lock().expect("cost ledger mutex poisoned");
                let previous = guard.insert(project_id.to_string(), level).unwrap_or(AlertLevel::Clear);
                level > previous
            }
        }
    }

    pub fn initialize_project(&self, project_id: &str, budget_limit: Option<f64>) {
        let budget_limit = budget_limit.filter(|limit| valid_limit(*limit, project_id));
        let mut guard = self.summaries.lock().expect("cost ledger mutex poisoned");
        let summary = guard
            .entry(project_id.to_string())
            .or_insert_with(|| CostSummary::new(project_id, None));
        if budget_limit.is_some() {
            summary.budget_limit = budget_limit;
            summary.recompute_usage();
        }
    }

    /// Replace the stored limit; accumulated spend is untouched.
    pub fn update_budget_limit(&self, project_id: &str, budget_limit: Option<f64>) {
        let budget_limit = budget_limit.filter(|limit| valid_limit(*limit, project_id));
        let mut guard = self.summaries.lock().expect("cost ledger mutex poisoned");
        let summary = guard
            .entry(project_id.to_string())
            .or_insert_with(|| CostSummary::new(project_id, None));
        summary.budget_limit = budget_limit;
        summary.recompute_usage();
    }

    /// Discard the project's entry entirely. Returns whether one existed.
    pub fn reset_project(&self, project_id: &str) -> bool {
        self.alert_levels
            .lock()
            .expect("cost ledger mutex poisoned")
            .remove(project_id);
        self.summaries
            .lock()
            .expect("cost ledger mutex poisoned")
            .remove(project_id)
            .is_some()
    }

    pub fn get_project_cost(&self, project_id: &str) -> Option<CostSummary> {
        let guard = self.summaries.lock().expect("cost ledger mutex poisoned");
        guard.get(project_id).cloned()
    }

    pub fn get_agent_cost(&self, project_id: &str, agent_id: &str) -> f64 {
        let guard = self.summaries.lock().expect("cost ledger mutex poisoned");
        guard
            .get(project_id)
            .and_then(|summary| summary.agent_costs.get(agent_id))
            .copied()
            .unwrap_or(0.0)
    }

    /// Snapshots of every tracked project, ordered by project id.
    pub fn get_all_project_costs(&self) -> Vec<CostSummary> {
        let guard = self.summaries.lock().expect("cost ledger mutex poisoned");
        let mut summaries: Vec<_> = guard.values().cloned().collect();
        summaries.sort_by(|a, b| a.project_id.cmp(&b.project_id));
        summaries
    }

    pub fn clear_all(&self) {
        self.summaries.lock().expect("cost ledger mutex poisoned").clear();
        self.alert_levels.lock().expect("cost ledger mutex poisoned").clear();
    }
}

fn valid_limit(limit: f64, project_id: &str) -> bool {
    let valid = limit.is_finite() && limit >= 0.0;
    if !valid {
        tracing::warn!(project_id, limit, "ignoring invalid budget limit");
    }
    valid
}
