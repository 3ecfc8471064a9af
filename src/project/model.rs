use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cost::CostSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Created,
    Running,
    Paused,
    Completed,
    Failed,
    Stopped,
}

impl ProjectStatus {
    pub const ALL: &'static [ProjectStatus] = &[
        Self::Created,
        Self::Running,
        Self::Paused,
        Self::Completed,
        Self::Failed,
        Self::Stopped,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }

    /// The legal targets from this status; empty for terminal statuses.
    pub const fn allowed_transitions(&self) -> &'static [ProjectStatus] {
        match self {
            Self::Created => &[Self::Running],
            Self::Running => &[Self::Paused, Self::Stopped, Self::Completed, Self::Failed],
            Self::Paused => &[Self::Running, Self::Stopped],
            Self::Completed | Self::Failed | Self::Stopped => &[],
        }
    }

    pub fn can_transition_to(&self, next: ProjectStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "stopped" => Ok(Self::Stopped),
            _ => Err(format!("unknown project status: {s}")),
        }
    }
}

/// Per-project knobs. Unknown keys are preserved in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ProjectSettings {
    /// Overlay the keys set in `patch`. Unset keys keep their value; a budget
    /// is lifted by setting `budget_limit` to `0`.
    pub fn merge(&mut self, patch: ProjectSettings) {
        if patch.budget_limit.is_some() {
            self.budget_limit = patch.budget_limit;
        }
        if patch.max_iterations.is_some() {
            self.max_iterations = patch.max_iterations;
        }
        if patch.model.is_some() {
            self.model = patch.model;
        }
        self.extra.extend(patch.extra);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub settings: ProjectSettings,
    pub cost_total: f64,
    pub iteration_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub settings: ProjectSettings,
}

/// Partial update; `None` fields are left as they are. `settings` is merged
/// key by key, see [`ProjectSettings::merge`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub settings: Option<ProjectSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub project_id: String,
    pub parent_agent_id: Option<String>,
    pub name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectStatistics {
    pub project: Project,
    pub agent_count: u64,
    pub cost_summary: Option<CostSummary>,
}
