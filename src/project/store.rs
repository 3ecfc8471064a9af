//! Narrow storage capabilities consumed by the lifecycle.

use async_trait::async_trait;
use thiserror::Error;

use super::model::{AgentRecord, Project, ProjectStatus};
use crate::db::DbError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("conflicting record: {0}")]
    Conflict(String),
    #[error("corrupt record: {0}")]
    Serialization(String),
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::NotFound(what) => Self::NotFound(what),
            DbError::Sqlite(rusqlite::Error::SqliteFailure(code, message))
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::Conflict(message.unwrap_or_else(|| code.to_string()))
            }
            other => Self::Backend(other.to_string()),
        }
    }
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn create(&self, project: &Project) -> Result<(), StoreError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Project>, StoreError>;
    async fn find_all(&self, status: Option<ProjectStatus>) -> Result<Vec<Project>, StoreError>;
    /// Overwrite the stored record; `NotFound` when it does not exist.
    async fn update(&self, project: &Project) -> Result<(), StoreError>;
    /// Returns whether a record was removed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

/// Read-only view of the agents working on a project.
#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn count_by_project(&self, project_id: &str) -> Result<u64, StoreError>;
    async fn list_by_project(&self, project_id: &str) -> Result<Vec<AgentRecord>, StoreError>;
}
