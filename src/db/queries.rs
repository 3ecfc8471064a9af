use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use super::{Database, DbError};

// ---------------------------------------------------------------------------
// Row types: flat structs that map directly to table columns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub settings_json: String,
    pub cost_total: f64,
    pub iteration_count: i64,
    pub created_at: String,
    pub updated_at: Option<String>,
    pub ended_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentRow {
    pub id: String,
    pub project_id: String,
    pub parent_agent_id: Option<String>,
    pub name: String,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRow {
    pub id: String,
    pub seq: i64,
    pub event_type: String,
    pub project_id: Option<String>,
    pub agent_id: Option<String>,
    pub data_json: String,
    pub created_at: String,
}

const PROJECT_COLUMNS: &str = "id, name, description, status, settings_json, cost_total, iteration_count, created_at, updated_at, ended_at";

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<ProjectRow> {
    Ok(ProjectRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        status: row.get(3)?,
        settings_json: row.get(4)?,
        cost_total: row.get(5)?,
        iteration_count: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        ended_at: row.get(9)?,
    })
}

// ---------------------------------------------------------------------------
// Project queries
// ---------------------------------------------------------------------------

pub fn insert_project(db: &Database, row: &ProjectRow) -> Result<(), DbError> {
    let conn = db.conn();
    conn.execute(
        "INSERT INTO projects (id, name, description, status, settings_json, cost_total, iteration_count, created_at, updated_at, ended_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            row.id,
            row.name,
            row.description,
            row.status,
            row.settings_json,
            row.cost_total,
            row.iteration_count,
            row.created_at,
            row.updated_at,
            row.ended_at,
        ],
    )?;
    Ok(())
}

pub fn get_project(db: &Database, id: &str) -> Result<Option<ProjectRow>, DbError> {
    let conn = db.conn();
    let mut stmt = conn.prepare(&format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"))?;
    let row = stmt.query_row(params![id], project_from_row).optional()?;
    Ok(row)
}

/// All projects, newest first, optionally restricted to one status.
pub fn list_projects(db: &Database, status: Option<&str>) -> Result<Vec<ProjectRow>, DbError> {
    let conn = db.conn();
    let mut stmt = conn.prepare(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects
         WHERE (?1 IS NULL OR status = ?1)
         ORDER BY created_at DESC, id ASC"
    ))?;
    let rows = stmt
        .query_map(params![status], project_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn update_project(db: &Database, row: &ProjectRow) -> Result<(), DbError> {
    let conn = db.conn();
    let changed = conn.execute(
        "UPDATE projects
         SET name = ?2, description = ?3, status = ?4, settings_json = ?5, cost_total = ?6,
             iteration_count = ?7, updated_at = ?8, ended_at = ?9
         WHERE id = ?1",
        params![
            row.id,
            row.name,
            row.description,
            row.status,
            row.settings_json,
            row.cost_total,
            row.iteration_count,
            row.updated_at,
            row.ended_at,
        ],
    )?;
    if changed == 0 {
        return Err(DbError::NotFound(format!("project {}", row.id)));
    }
    Ok(())
}

/// Delete a project; agents go with it via `ON DELETE CASCADE`.
pub fn delete_project(db: &Database, id: &str) -> Result<bool, DbError> {
    let conn = db.conn();
    let changed = conn.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

// ---------------------------------------------------------------------------
// Agent queries
// ---------------------------------------------------------------------------

pub fn insert_agent(db: &Database, row: &AgentRow) -> Result<(), DbError> {
    let conn = db.conn();
    conn.execute(
        "INSERT INTO agents (id, project_id, parent_agent_id, name, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            row.id,
            row.project_id,
            row.parent_agent_id,
            row.name,
            row.status,
            row.created_at,
        ],
    )?;
    Ok(())
}

pub fn count_agents_for_project(db: &Database, project_id: &str) -> Result<i64, DbError> {
    let conn = db.conn();
    let count = conn.query_row(
        "SELECT COUNT(*) FROM agents WHERE project_id = ?1",
        params![project_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn list_agents_for_project(db: &Database, project_id: &str) -> Result<Vec<AgentRow>, DbError> {
    let conn = db.conn();
    let mut stmt = conn.prepare(
        "SELECT id, project_id, parent_agent_id, name, status, created_at
         FROM agents
         WHERE project_id = ?1
         ORDER BY created_at ASC, id ASC",
    )?;
    let rows = stmt
        .query_map(params![project_id], |row| {
            Ok(AgentRow {
                id: row.get(0)?,
                project_id: row.get(1)?,
                parent_agent_id: row.get(2)?,
                name: row.get(3)?,
                status: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Event queries
// ---------------------------------------------------------------------------

pub fn insert_event(db: &Database, row: &EventRow) -> Result<(), DbError> {
    let conn = db.conn();
    conn.execute(
        "INSERT INTO events (id, seq, event_type, project_id, agent_id, data_json, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            row.id,
            row.seq,
            row.event_type,
            row.project_id,
            row.agent_id,
            row.data_json,
            row.created_at,
        ],
    )?;
    Ok(())
}

/// Events for a project with `seq > after_seq`, oldest first.
pub fn list_events_after(
    db: &Database,
    project_id: &str,
    after_seq: i64,
    limit: i64,
) -> Result<Vec<EventRow>, DbError> {
    let conn = db.conn();
    let mut stmt = conn.prepare(
        "SELECT id, seq, event_type, project_id, agent_id, data_json, created_at
         FROM events
         WHERE project_id = ?1 AND seq > ?2
         ORDER BY seq ASC
         LIMIT ?3",
    )?;
    let rows = stmt
        .query_map(params![project_id, after_seq, limit], |row| {
            Ok(EventRow {
                id: row.get(0)?,
                seq: row.get(1)?,
                event_type: row.get(2)?,
                project_id: row.get(3)?,
                agent_id: row.get(4)?,
                data_json: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Highest sequence number in the event log, if any event was stored.
pub fn max_event_seq(db: &Database) -> Result<Option<i64>, DbError> {
    let conn = db.conn();
    let seq = conn.query_row("SELECT MAX(seq) FROM events", [], |row| row.get(0))?;
    Ok(seq)
}
