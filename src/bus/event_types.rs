//! Event type tags and throttling policy.
//!
//! Single source of truth for which events bypass throttling (critical),
//! which are merged per agent, and which are batched at the flush cadence.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ProjectCreated,
    ProjectStarted,
    ProjectPaused,
    ProjectResumed,
    ProjectStopped,
    ProjectCompleted,
    ProjectFailed,
    AgentCreated,
    AgentStatusChanged,
    AgentOutputChunk,
    AgentToolCall,
    AgentToolResult,
    AgentIterationComplete,
    CostUpdated,
    BudgetWarning,
    BudgetExceeded,
    CircuitBreakerTriggered,
    Error,
    FileCreated,
    FileModified,
    FileDeleted,
}

impl EventType {
    pub const ALL: &'static [EventType] = &[
        Self::ProjectCreated,
        Self::ProjectStarted,
        Self::ProjectPaused,
        Self::ProjectResumed,
        Self::ProjectStopped,
        Self::ProjectCompleted,
        Self::ProjectFailed,
        Self::AgentCreated,
        Self::AgentStatusChanged,
        Self::AgentOutputChunk,
        Self::AgentToolCall,
        Self::AgentToolResult,
        Self::AgentIterationComplete,
        Self::CostUpdated,
        Self::BudgetWarning,
        Self::BudgetExceeded,
        Self::CircuitBreakerTriggered,
        Self::Error,
        Self::FileCreated,
        Self::FileModified,
        Self::FileDeleted,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ProjectCreated => "project_created",
            Self::ProjectStarted => "project_started",
            Self::ProjectPaused => "project_paused",
            Self::ProjectResumed => "project_resumed",
            Self::ProjectStopped => "project_stopped",
            Self::ProjectCompleted => "project_completed",
            Self::ProjectFailed => "project_failed",
            Self::AgentCreated => "agent_created",
            Self::AgentStatusChanged => "agent_status_changed",
            Self::AgentOutputChunk => "agent_output_chunk",
            Self::AgentToolCall => "agent_tool_call",
            Self::AgentToolResult => "agent_tool_result",
            Self::AgentIterationComplete => "agent_iteration_complete",
            Self::CostUpdated => "cost_updated",
            Self::BudgetWarning => "budget_warning",
            Self::BudgetExceeded => "budget_exceeded",
            Self::CircuitBreakerTriggered => "circuit_breaker_triggered",
            Self::Error => "error",
            Self::FileCreated => "file_created",
            Self::FileModified => "file_modified",
            Self::FileDeleted => "file_deleted",
        }
    }

    pub const fn tier(&self) -> ThrottleTier {
        match self {
            Self::Error | Self::BudgetExceeded | Self::CircuitBreakerTriggered | Self::ProjectFailed => {
                ThrottleTier::Critical
            }
            Self::AgentOutputChunk => ThrottleTier::StreamingMerge,
            Self::CostUpdated => ThrottleTier::Batchable,
            _ => ThrottleTier::Immediate,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|candidate| candidate.as_str() == value)
            .ok_or_else(|| format!("unknown event type: {value}"))
    }
}

// ---------------------------------------------------------------------------
// Throttle policy
// ---------------------------------------------------------------------------

/// Delivery latency class of an event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThrottleTier {
    /// Never delayed, forwarded straight to the router.
    Critical,
    /// Buffered per agent and merged into one event per flush.
    StreamingMerge,
    /// Queued in arrival order and forwarded at the next flush.
    Batchable,
    /// Not throttled.
    Immediate,
}

impl ThrottleTier {
    pub const fn is_deferred(&self) -> bool {
        matches!(self, Self::StreamingMerge | Self::Batchable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trips_every_tag() {
        for event_type in EventType::ALL {
            let parsed: EventType = event_type.as_str().parse().unwrap();
            assert_eq!(parsed, *event_type);
            let json = serde_json::to_string(event_type).unwrap();
            assert_eq!(json, format!("\"{}\"", event_type.as_str()));
        }
    }

    #[test]
    fn test_critical_set_is_exact() {
        let critical: Vec<_> = EventType::ALL
            .iter()
            .filter(|t| t.tier() == ThrottleTier::Critical)
            .copied()
            .collect();
        assert_eq!(
            critical,
            vec![
                EventType::ProjectFailed,
                EventType::BudgetExceeded,
                EventType::CircuitBreakerTriggered,
                EventType::Error,
            ]
        );
    }

    #[test]
    fn test_only_chunks_merge_and_cost_batches() {
        assert_eq!(EventType::AgentOutputChunk.tier(), ThrottleTier::StreamingMerge);
        assert_eq!(EventType::CostUpdated.tier(), ThrottleTier::Batchable);
        assert_eq!(EventType::BudgetWarning.tier(), ThrottleTier::Immediate);
        assert!(!EventType::ProjectStarted.tier().is_deferred());
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        assert!("agent_exploded".parse::<EventType>().is_err());
    }
}
