//! Capability implementations on top of the SQLite queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::queries::{self, AgentRow, EventRow, ProjectRow};
use super::Database;
use crate::bus::{Event, EventSink, SinkError};
use crate::project::{AgentRecord, AgentStore, Project, ProjectStatus, ProjectStore, StoreError};

fn parse_time(field: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("invalid {field} timestamp {raw:?}: {e}")))
}

fn parse_optional_time(field: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>, StoreError> {
    raw.map(|raw| parse_time(field, raw)).transpose()
}

impl TryFrom<ProjectRow> for Project {
    type Error = StoreError;

    fn try_from(row: ProjectRow) -> Result<Self, Self::Error> {
        let status: ProjectStatus = row.status.parse().map_err(StoreError::Serialization)?;
        let settings = serde_json::from_str(&row.settings_json)
            .map_err(|e| StoreError::Serialization(format!("invalid settings for project {}: {e}", row.id)))?;
        Ok(Self {
            created_at: parse_time("created_at", &row.created_at)?,
            updated_at: parse_optional_time("updated_at", row.updated_at.as_deref())?,
            ended_at: parse_optional_time("ended_at", row.ended_at.as_deref())?,
            id: row.id,
            name: row.name,
            description: row.description,
            status,
            settings,
            cost_total: row.cost_total,
            iteration_count: u64::try_from(row.iteration_count).unwrap_or(0),
        })
    }
}

impl TryFrom<&Project> for ProjectRow {
    type Error = StoreError;

    fn try_from(project: &Project) -> Result<Self, Self::Error> {
        let settings_json =
            serde_json::to_string(&project.settings).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Self {
            id: project.id.clone(),
            name: project.name.clone(),
            description: project.description.clone(),
            status: project.status.to_string(),
            settings_json,
            cost_total: project.cost_total,
            iteration_count: i64::try_from(project.iteration_count).unwrap_or(i64::MAX),
            created_at: project.created_at.to_rfc3339(),
            updated_at: project.updated_at.map(|time| time.to_rfc3339()),
            ended_at: project.ended_at.map(|time| time.to_rfc3339()),
        })
    }
}

impl TryFrom<AgentRow> for AgentRecord {
    type Error = StoreError;

    fn try_from(row: AgentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            created_at: parse_time("created_at", &row.created_at)?,
            id: row.id,
            project_id: row.project_id,
            parent_agent_id: row.parent_agent_id,
            name: row.name,
            status: row.status,
        })
    }
}

impl From<&Event> for EventRow {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id.clone(),
            seq: event.seq,
            event_type: event.event_type.to_string(),
            project_id: event.project_id.clone(),
            agent_id: event.agent_id.clone(),
            data_json: event.data.to_string(),
            created_at: event.timestamp.to_rfc3339(),
        }
    }
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let data = serde_json::from_str(&row.data_json)
            .map_err(|e| StoreError::Serialization(format!("invalid data for event {}: {e}", row.id)))?;
        Ok(Self {
            timestamp: parse_time("created_at", &row.created_at)?,
            event_type: row.event_type.parse().map_err(StoreError::Serialization)?,
            id: row.id,
            seq: row.seq,
            project_id: row.project_id,
            agent_id: row.agent_id,
            data,
        })
    }
}

#[async_trait]
impl EventSink for Database {
    async fn create(&self, event: &Event) -> Result<(), SinkError> {
        queries::insert_event(self, &EventRow::from(event))?;
        Ok(())
    }
}

#[async_trait]
impl ProjectStore for Database {
    async fn create(&self, project: &Project) -> Result<(), StoreError> {
        queries::insert_project(self, &ProjectRow::try_from(project)?)?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Project>, StoreError> {
        queries::get_project(self, id)?.map(Project::try_from).transpose()
    }

    async fn find_all(&self, status: Option<ProjectStatus>) -> Result<Vec<Project>, StoreError> {
        let filter = status.map(|status| status.as_str());
        queries::list_projects(self, filter)?
            .into_iter()
            .map(Project::try_from)
            .collect()
    }

    async fn update(&self, project: &Project) -> Result<(), StoreError> {
        queries::update_project(self, &ProjectRow::try_from(project)?)?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(queries::delete_project(self, id)?)
    }
}

#[async_trait]
impl AgentStore for Database {
    async fn count_by_project(&self, project_id: &str) -> Result<u64, StoreError> {
        let count = queries::count_agents_for_project(self, project_id)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn list_by_project(&self, project_id: &str) -> Result<Vec<AgentRecord>, StoreError> {
        queries::list_agents_for_project(self, project_id)?
            .into_iter()
            .map(AgentRecord::try_from)
            .collect()
    }
}
