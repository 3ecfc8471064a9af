//! Spend tracking and budget alerts through the wired core.

use std::sync::Arc;

use serde_json::json;

use super::project_with_budget;
use crate::bus::{EventDraft, EventType};
use crate::config::CoreConfig;
use crate::cost::{BudgetAlertPolicy, TokenUsage};
use crate::db::Database;
use crate::testing::collect_events;
use crate::LoopdeckCore;

const HAIKU: &str = "claude-3-haiku-20240307";

#[tokio::test]
async fn test_first_haiku_call_stays_under_budget() {
    let core = LoopdeckCore::open_in_memory().unwrap();
    let warnings = collect_events(core.router(), EventType::BudgetWarning);
    let exceeded = collect_events(core.router(), EventType::BudgetExceeded);
    let project = core
        .lifecycle()
        .create(project_with_budget("scenario a", Some(10.0)))
        .await
        .unwrap();

    let cost = core.ledger().track_cost(
        &project.id,
        "worker",
        &TokenUsage::new(1_000_000, 500_000),
        HAIKU,
        None,
    );
    let status = core.ledger().check_budget(&project.id, 10.0, 0.8);

    assert_eq!(cost.total_cost, 0.875);
    assert_eq!(status.current_cost, 0.875);
    assert!(!status.is_at_warning);
    assert!(!status.is_exceeded);
    assert!(warnings.lock().unwrap().is_empty());
    assert!(exceeded.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_crossing_eighty_five_percent_warns() {
    let core = LoopdeckCore::open_in_memory().unwrap();
    let warnings = collect_events(core.router(), EventType::BudgetWarning);
    let project = core
        .lifecycle()
        .create(project_with_budget("scenario b", Some(10.0)))
        .await
        .unwrap();

    core.ledger()
        .track_cost(&project.id, "worker", &TokenUsage::new(1_000_000, 500_000), HAIKU, None);
    core.ledger()
        .track_cost(&project.id, "worker", &TokenUsage::new(30_500_000, 0), HAIKU, None);
    let status = core.ledger().check_budget(&project.id, 10.0, 0.8);

    assert_eq!(status.current_cost, 8.5);
    assert!((status.percentage_used - 0.85).abs() < 1e-9);
    assert!(status.is_at_warning);
    assert!(!status.is_exceeded);

    let warnings = warnings.lock().unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].project_id.as_deref(), Some(project.id.as_str()));
    assert_eq!(warnings[0].data["current_cost"], 8.5);
}

#[tokio::test]
async fn test_cost_updates_are_batched_until_flush() {
    let core = LoopdeckCore::open_in_memory().unwrap();
    let updates = collect_events(core.router(), EventType::CostUpdated);

    for agent in ["a1", "a2", "a3"] {
        core.ledger()
            .track_cost("p1", agent, &TokenUsage::new(1_000, 1_000), HAIKU, None);
    }
    assert!(updates.lock().unwrap().is_empty());
    assert_eq!(core.throttle().queue_size(), 3);

    core.throttle().force_flush();

    let updates = updates.lock().unwrap();
    let agents: Vec<_> = updates.iter().filter_map(|event| event.agent_id.clone()).collect();
    assert_eq!(agents, vec!["a1", "a2", "a3"]);
}

#[tokio::test]
async fn test_reported_usage_is_tracked_and_exceeding_is_immediate() {
    let core = LoopdeckCore::open_in_memory().unwrap();
    let exceeded = collect_events(core.router(), EventType::BudgetExceeded);
    let project = core
        .lifecycle()
        .create(project_with_budget("auto", Some(1.0)))
        .await
        .unwrap();

    core.router().emit(
        EventType::AgentIterationComplete,
        EventDraft::for_project(
            &project.id,
            json!({ "model": HAIKU, "usage": { "input_tokens": 4_000_000, "output_tokens": 800_000 } }),
        )
        .with_agent("worker"),
    );

    let summary = core.ledger().get_project_cost(&project.id).unwrap();
    assert_eq!(summary.total_cost, 2.0);
    assert_eq!(summary.agent_costs.get("worker"), Some(&2.0));
    let exceeded = exceeded.lock().unwrap();
    assert_eq!(exceeded.len(), 1);
    assert_eq!(exceeded[0].data["budget_limit"], 1.0);
}

#[tokio::test]
async fn test_once_per_level_policy_from_config() {
    let config = CoreConfig {
        budget_alert_policy: BudgetAlertPolicy::OncePerLevel,
        ..CoreConfig::default()
    };
    let core = LoopdeckCore::from_database(Arc::new(Database::open_in_memory().unwrap()), config).unwrap();
    let warnings = collect_events(core.router(), EventType::BudgetWarning);

    core.ledger()
        .track_cost("p1", "a1", &TokenUsage::new(36_000_000, 0), HAIKU, Some(10.0));
    for _ in 0..3 {
        assert!(core.ledger().check_budget("p1", 10.0, 0.8).is_at_warning);
    }

    assert_eq!(warnings.lock().unwrap().len(), 1);
}
