use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use super::model::{NewProject, Project, ProjectSettings, ProjectStatistics, ProjectStatus, ProjectUpdate};
use super::store::{AgentStore, ProjectStore, StoreError};
use crate::bus::{EventDraft, EventEmitter, EventType};
use crate::cost::CostLedger;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("invalid transition: cannot move project from {from} to {to}")]
    InvalidTransition { from: ProjectStatus, to: ProjectStatus },
    #[error("project not found: {0}")]
    NotFound(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Owns project records and the legal moves between their statuses.
///
/// Every mutation is written to the store before the matching event is
/// emitted, so listeners never observe a change that was not committed.
/// Calls for one project are expected to be issued sequentially; there is no
/// per-project lock.
pub struct ProjectLifecycle {
    projects: Arc<dyn ProjectStore>,
    agents: Arc<dyn AgentStore>,
    ledger: Arc<CostLedger>,
    emitter: Arc<dyn EventEmitter>,
}

impl ProjectLifecycle {
    pub fn new(
        projects: Arc<dyn ProjectStore>,
        agents: Arc<dyn AgentStore>,
        ledger: Arc<CostLedger>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            projects,
            agents,
            ledger,
            emitter,
        }
    }

    pub fn ledger(&self) -> &Arc<CostLedger> {
        &self.ledger
    }

    pub async fn create(&self, data: NewProject) -> Result<Project, LifecycleError> {
        let name = validate_name(&data.name)?;
        validate_settings(&data.settings)?;

        let project = Project {
            id: Uuid::new_v4().to_string(),
            name,
            description: data.description,
            status: ProjectStatus::Created,
            settings: data.settings,
            cost_total: 0.0,
            iteration_count: 0,
            created_at: Utc::now(),
            updated_at: None,
            ended_at: None,
        };
        self.projects.create(&project).await?;
        self.ledger
            .initialize_project(&project.id, project.settings.budget_limit);

        tracing::info!(project_id = %project.id, name = %project.name, "project created");
        self.announce(
            EventType::ProjectCreated,
            &project,
            json!({
                "name": project.name,
                "description": project.description,
                "settings": project.settings,
            }),
        );
        Ok(project)
    }

    pub async fn get(&self, id: &str) -> Result<Project, LifecycleError> {
        self.projects
            .find_by_id(id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(id.to_string()))
    }

    pub async fn list(&self, status: Option<ProjectStatus>) -> Result<Vec<Project>, LifecycleError> {
        Ok(self.projects.find_all(status).await?)
    }

    pub async fn update(&self, id: &str, changes: ProjectUpdate) -> Result<Project, LifecycleError> {
        let mut project = self.get(id).await?;
        let previous_limit = project.settings.budget_limit;

        if let Some(name) = changes.name.as_deref() {
            project.name = validate_name(name)?;
        }
        if let Some(description) = changes.description {
            project.description = Some(description);
        }
        if let Some(settings) = changes.settings {
            validate_settings(&settings)?;
            project.settings.merge(settings);
        }
        project.updated_at = Some(Utc::now());
        self.projects.update(&project).await?;

        if project.settings.budget_limit != previous_limit {
            tracing::debug!(project_id = id, limit = ?project.settings.budget_limit, "budget limit changed");
            self.ledger.update_budget_limit(id, project.settings.budget_limit);
        }
        Ok(project)
    }

    /// Remove a project that is not running. Dependent records are the
    /// store's concern; the cost ledger entry is discarded here.
    pub async fn delete(&self, id: &str) -> Result<(), LifecycleError> {
        let project = self.get(id).await?;
        if project.status == ProjectStatus::Running {
            return Err(LifecycleError::Validation(format!(
                "cannot delete running project {id}; stop it first"
            )));
        }
        if !self.projects.delete(id).await? {
            return Err(LifecycleError::NotFound(id.to_string()));
        }
        self.ledger.reset_project(id);
        tracing::info!(project_id = id, "project deleted");
        Ok(())
    }

    pub async fn start(&self, id: &str) -> Result<Project, LifecycleError> {
        let (project, from) = self.transition(id, ProjectStatus::Running).await?;
        self.announce(EventType::ProjectStarted, &project, status_change(from, &project));
        Ok(project)
    }

    pub async fn pause(&self, id: &str) -> Result<Project, LifecycleError> {
        let (project, from) = self.transition(id, ProjectStatus::Paused).await?;
        self.announce(EventType::ProjectPaused, &project, status_change(from, &project));
        Ok(project)
    }

    /// Like `start`, but only from `paused`.
    pub async fn resume(&self, id: &str) -> Result<Project, LifecycleError> {
        let current = self.get(id).await?;
        if current.status != ProjectStatus::Paused {
            return Err(LifecycleError::InvalidTransition {
                from: current.status,
                to: ProjectStatus::Running,
            });
        }
        let (project, from) = self.transition(id, ProjectStatus::Running).await?;
        self.announce(EventType::ProjectResumed, &project, status_change(from, &project));
        Ok(project)
    }

    pub async fn stop(&self, id: &str, reason: Option<&str>) -> Result<Project, LifecycleError> {
        let (project, from) = self.transition(id, ProjectStatus::Stopped).await?;
        let mut data = status_change(from, &project);
        data["reason"] = json!(reason);
        self.announce(EventType::ProjectStopped, &project, data);
        Ok(project)
    }

    pub async fn complete(&self, id: &str) -> Result<Project, LifecycleError> {
        let (project, from) = self.transition(id, ProjectStatus::Completed).await?;
        let duration_ms = project
            .ended_at
            .map(|ended| (ended - project.created_at).num_milliseconds())
            .unwrap_or(0);
        let mut data = status_change(from, &project);
        data["total_iterations"] = json!(project.iteration_count);
        data["total_cost"] = json!(project.cost_total);
        data["duration_ms"] = json!(duration_ms);
        self.announce(EventType::ProjectCompleted, &project, data);
        Ok(project)
    }

    pub async fn fail(&self, id: &str, error: &str) -> Result<Project, LifecycleError> {
        let (project, from) = self.transition(id, ProjectStatus::Failed).await?;
        tracing::warn!(project_id = id, "project failed: {error}");
        let mut data = status_change(from, &project);
        data["error"] = json!(error);
        self.announce(EventType::ProjectFailed, &project, data);
        Ok(project)
    }

    /// Bump the iteration counter. Not gated on status, so trailing writes
    /// from a driver that is winding down still land.
    pub async fn increment_iteration(&self, id: &str) -> Result<u64, LifecycleError> {
        let mut project = self.get(id).await?;
        if project.status.is_terminal() {
            tracing::debug!(project_id = id, status = %project.status, "iteration recorded after project ended");
        }
        project.iteration_count += 1;
        project.updated_at = Some(Utc::now());
        self.projects.update(&project).await?;
        Ok(project.iteration_count)
    }

    /// Add `delta` dollars to the persisted cost total and return the new total.
    pub async fn update_cost(&self, id: &str, delta: f64) -> Result<f64, LifecycleError> {
        if !delta.is_finite() || delta < 0.0 {
            return Err(LifecycleError::Validation(format!(
                "cost delta must be a non-negative amount, got {delta}"
            )));
        }
        let mut project = self.get(id).await?;
        if project.status.is_terminal() {
            tracing::debug!(project_id = id, status = %project.status, "cost recorded after project ended");
        }
        project.cost_total += delta;
        project.updated_at = Some(Utc::now());
        self.projects.update(&project).await?;
        Ok(project.cost_total)
    }

    pub async fn get_statistics(&self, id: &str) -> Result<ProjectStatistics, LifecycleError> {
        let project = self.get(id).await?;
        let agent_count = self.agents.count_by_project(id).await?;
        let cost_summary = self.ledger.get_project_cost(id);
        Ok(ProjectStatistics {
            project,
            agent_count,
            cost_summary,
        })
    }

    /// Validate and persist a status change. Returns the updated record and
    /// the status it left.
    async fn transition(&self, id: &str, to: ProjectStatus) -> Result<(Project, ProjectStatus), LifecycleError> {
        let mut project = self.get(id).await?;
        let from = project.status;
        if !from.can_transition_to(to) {
            return Err(LifecycleError::InvalidTransition { from, to });
        }

        let now = Utc::now();
        project.status = to;
        project.updated_at = Some(now);
        if to.is_terminal() {
            project.ended_at = Some(now);
        }
        self.projects.update(&project).await?;

        tracing::info!(project_id = id, %from, %to, "project status changed");
        Ok((project, from))
    }

    fn announce(&self, event_type: EventType, project: &Project, data: serde_json::Value) {
        self.emitter
            .emit(event_type, EventDraft::for_project(project.id.clone(), data));
    }
}

fn status_change(from: ProjectStatus, project: &Project) -> serde_json::Value {
    json!({
        "previous_status": from,
        "status": project.status,
    })
}

fn validate_name(name: &str) -> Result<String, LifecycleError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(LifecycleError::Validation("project name must not be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

fn validate_settings(settings: &ProjectSettings) -> Result<(), LifecycleError> {
    if let Some(limit) = settings.budget_limit {
        if !limit.is_finite() || limit < 0.0 {
            return Err(LifecycleError::Validation(format!(
                "budget limit must be a non-negative amount, got {limit}"
            )));
        }
    }
    Ok(())
}
