//! Common helpers for the public-API integration tests.

use std::sync::{Arc, Mutex};

use loopdeck_lib::bus::{Event, EventRouter, EventType};
use loopdeck_lib::config::CoreConfig;
use loopdeck_lib::project::{NewProject, ProjectSettings};
use tempfile::TempDir;

/// Configuration rooted in a fresh temporary data directory. Keep the
/// returned `TempDir` alive for the duration of the test.
pub fn temp_config() -> (TempDir, CoreConfig) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let config = CoreConfig::from_lookup(|key| match key {
        "LOOPDECK_DATA_DIR" => Some(dir.path().join("loopdeck").display().to_string()),
        _ => None,
    });
    (dir, config)
}

pub fn new_project(name: &str, budget_limit: Option<f64>) -> NewProject {
    NewProject {
        name: name.to_string(),
        description: Some(format!("{name} integration run")),
        settings: ProjectSettings {
            budget_limit,
            ..ProjectSettings::default()
        },
    }
}

pub fn record(router: &EventRouter, event_type: EventType) -> Arc<Mutex<Vec<Event>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    router.subscribe(event_type, move |event| sink.lock().unwrap().push(event.clone()));
    seen
}
