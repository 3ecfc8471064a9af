//! Project records and their execution state machine.
//!
//! ```text
//! created ──► running ──► completed | failed | stopped
//!               ▲  │
//!               │  ▼
//!              paused ──► stopped
//! ```

mod lifecycle;
mod model;
mod store;

pub use lifecycle::{LifecycleError, ProjectLifecycle};
pub use model::{
    AgentRecord, NewProject, Project, ProjectSettings, ProjectStatistics, ProjectStatus, ProjectUpdate,
};
pub use store::{AgentStore, ProjectStore, StoreError};
