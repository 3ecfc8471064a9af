//! Scenarios run against a fully wired [`crate::LoopdeckCore`].

mod budget;

use crate::project::{NewProject, ProjectSettings};

pub fn project_with_budget(name: &str, budget_limit: Option<f64>) -> NewProject {
    NewProject {
        name: name.to_string(),
        description: None,
        settings: ProjectSettings {
            budget_limit,
            ..ProjectSettings::default()
        },
    }
}
