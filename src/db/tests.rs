//! Database operations unit tests

use chrono::Utc;
use pretty_assertions::assert_eq;
use uuid::Uuid;

use crate::db::queries::{self, AgentRow, EventRow, ProjectRow};
use crate::db::{Database, DbError};

fn project_row(name: &str, status: &str) -> ProjectRow {
    ProjectRow {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        description: None,
        status: status.to_string(),
        settings_json: "{}".to_string(),
        cost_total: 0.0,
        iteration_count: 0,
        created_at: Utc::now().to_rfc3339(),
        updated_at: None,
        ended_at: None,
    }
}

fn agent_row(project_id: &str, name: &str) -> AgentRow {
    AgentRow {
        id: Uuid::new_v4().to_string(),
        project_id: project_id.to_string(),
        parent_agent_id: None,
        name: name.to_string(),
        status: "idle".to_string(),
        created_at: Utc::now().to_rfc3339(),
    }
}

fn event_row(project_id: &str, seq: i64) -> EventRow {
    EventRow {
        id: Uuid::new_v4().to_string(),
        seq,
        event_type: "agent_output_chunk".to_string(),
        project_id: Some(project_id.to_string()),
        agent_id: None,
        data_json: format!(r#"{{"chunk":"line {seq}"}}"#),
        created_at: Utc::now().to_rfc3339(),
    }
}

#[test]
fn test_project_round_trips_through_sqlite() {
    let db = Database::open_in_memory().expect("in-memory DB");
    let mut row = project_row("nightly", "created");
    row.description = Some("keep it green".to_string());
    row.settings_json = r#"{"budget_limit":5.0}"#.to_string();
    queries::insert_project(&db, &row).unwrap();

    assert_eq!(queries::get_project(&db, &row.id).unwrap(), Some(row));
    assert_eq!(queries::get_project(&db, "missing").unwrap(), None);
}

#[test]
fn test_update_missing_project_is_not_found() {
    let db = Database::open_in_memory().expect("in-memory DB");
    let row = project_row("ghost", "created");

    let err = queries::update_project(&db, &row).unwrap_err();

    assert!(matches!(err, DbError::NotFound(_)));
}

#[test]
fn test_update_overwrites_mutable_columns() {
    let db = Database::open_in_memory().expect("in-memory DB");
    let mut row = project_row("loop", "created");
    queries::insert_project(&db, &row).unwrap();

    row.status = "running".to_string();
    row.iteration_count = 3;
    row.cost_total = 1.5;
    row.updated_at = Some(Utc::now().to_rfc3339());
    queries::update_project(&db, &row).unwrap();

    let stored = queries::get_project(&db, &row.id).unwrap().unwrap();
    assert_eq!(stored.status, "running");
    assert_eq!(stored.iteration_count, 3);
    assert_eq!(stored.cost_total, 1.5);
}

#[test]
fn test_list_projects_filters_by_status() {
    let db = Database::open_in_memory().expect("in-memory DB");
    queries::insert_project(&db, &project_row("a", "running")).unwrap();
    queries::insert_project(&db, &project_row("b", "paused")).unwrap();
    queries::insert_project(&db, &project_row("c", "running")).unwrap();

    assert_eq!(queries::list_projects(&db, None).unwrap().len(), 3);
    let running = queries::list_projects(&db, Some("running")).unwrap();
    assert_eq!(running.len(), 2);
    assert!(running.iter().all(|row| row.status == "running"));
    assert!(queries::list_projects(&db, Some("failed")).unwrap().is_empty());
}

#[test]
fn test_delete_project_cascades_to_agents() {
    let db = Database::open_in_memory().expect("in-memory DB");
    let project = project_row("cascade", "stopped");
    queries::insert_project(&db, &project).unwrap();
    queries::insert_agent(&db, &agent_row(&project.id, "planner")).unwrap();
    queries::insert_agent(&db, &agent_row(&project.id, "worker")).unwrap();
    assert_eq!(queries::count_agents_for_project(&db, &project.id).unwrap(), 2);

    assert!(queries::delete_project(&db, &project.id).unwrap());

    assert_eq!(queries::count_agents_for_project(&db, &project.id).unwrap(), 0);
    assert!(queries::list_agents_for_project(&db, &project.id).unwrap().is_empty());
    assert!(!queries::delete_project(&db, &project.id).unwrap());
}

#[test]
fn test_agent_requires_existing_project() {
    let db = Database::open_in_memory().expect("in-memory DB");
    let err = queries::insert_agent(&db, &agent_row("no-such-project", "orphan")).unwrap_err();
    assert!(matches!(err, DbError::Sqlite(_)));
}

#[test]
fn test_events_after_seq_are_ordered_and_scoped() {
    let db = Database::open_in_memory().expect("in-memory DB");
    for seq in [3, 1, 2, 5, 4] {
        queries::insert_event(&db, &event_row("p1", seq)).unwrap();
    }
    queries::insert_event(&db, &event_row("p2", 6)).unwrap();

    let rows = queries::list_events_after(&db, "p1", 2, 100).unwrap();
    assert_eq!(rows.iter().map(|row| row.seq).collect::<Vec<_>>(), vec![3, 4, 5]);

    let limited = queries::list_events_after(&db, "p1", 0, 2).unwrap();
    assert_eq!(limited.iter().map(|row| row.seq).collect::<Vec<_>>(), vec![1, 2]);

    assert_eq!(queries::max_event_seq(&db).unwrap(), Some(6));
}

#[test]
fn test_max_event_seq_is_none_for_empty_log() {
    let db = Database::open_in_memory().expect("in-memory DB");
    assert_eq!(queries::max_event_seq(&db).unwrap(), None);
}

#[test]
fn test_on_disk_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("loopdeck.db");
    let row = project_row("persistent", "created");

    {
        let db = Database::open(&path).unwrap();
        queries::insert_project(&db, &row).unwrap();
        queries::insert_event(&db, &event_row(&row.id, 9)).unwrap();
    }

    let db = Database::open(&path).unwrap();
    assert_eq!(queries::get_project(&db, &row.id).unwrap().map(|r| r.name), Some("persistent".to_string()));
    assert_eq!(queries::max_event_seq(&db).unwrap(), Some(9));
}

#[tokio::test]
async fn test_agent_store_lists_project_agents_oldest_first() {
    use crate::project::AgentStore;

    let db = Database::open_in_memory().expect("in-memory DB");
    let project = project_row("team", "running");
    let other = project_row("solo", "created");
    queries::insert_project(&db, &project).unwrap();
    queries::insert_project(&db, &other).unwrap();

    let mut planner = agent_row(&project.id, "planner");
    planner.created_at = "2026-01-01T00:00:00+00:00".to_string();
    let mut worker = agent_row(&project.id, "worker");
    worker.created_at = "2026-01-01T00:00:05+00:00".to_string();
    worker.parent_agent_id = Some(planner.id.clone());
    worker.status = "running".to_string();
    queries::insert_agent(&db, &worker).unwrap();
    queries::insert_agent(&db, &planner).unwrap();
    queries::insert_agent(&db, &agent_row(&other.id, "loner")).unwrap();

    let agents = AgentStore::list_by_project(&db, &project.id).await.unwrap();

    let names: Vec<_> = agents.iter().map(|agent| agent.name.as_str()).collect();
    assert_eq!(names, vec!["planner", "worker"]);
    assert_eq!(agents[1].parent_agent_id.as_deref(), Some(planner.id.as_str()));
    assert_eq!(agents[1].status, "running");
    assert_eq!(agents[0].created_at.to_rfc3339(), "2026-01-01T00:00:00+00:00");
    assert_eq!(AgentStore::count_by_project(&db, &project.id).await.unwrap(), 2);
    assert!(AgentStore::list_by_project(&db, "missing").await.unwrap().is_empty());
}
