//! Test doubles shared by the unit and scenario tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::bus::{
    BroadcastSink, ErrorReporter, Event, EventDraft, EventEmitter, EventRouter, EventSink, EventType, RouterError,
    SinkError,
};
use crate::cost::CostLedger;
use crate::db::queries::{self, AgentRow};
use crate::db::Database;
use crate::project::{Project, ProjectLifecycle, ProjectStatus, ProjectStore, StoreError};

/// Emitter that records every call and delivers nothing.
#[derive(Default)]
pub struct RecordingEmitter {
    events: Mutex<Vec<(EventType, EventDraft)>>,
}

impl RecordingEmitter {
    pub fn events(&self) -> Vec<(EventType, EventDraft)> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event_type: EventType) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(recorded, _)| *recorded == event_type)
            .count()
    }

    pub fn of_type(&self, event_type: EventType) -> Vec<EventDraft> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(recorded, _)| *recorded == event_type)
            .map(|(_, draft)| draft.clone())
            .collect()
    }
}

impl EventEmitter for RecordingEmitter {
    fn emit(&self, event_type: EventType, draft: EventDraft) -> Option<Event> {
        self.events.lock().unwrap().push((event_type, draft));
        None
    }
}

/// Captures what reaches either the event store or the broadcast target.
#[derive(Default)]
pub struct RecordingSink {
    received: Mutex<Vec<(String, Event)>>,
}

impl RecordingSink {
    pub fn ids(&self) -> Vec<String> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .map(|(_, event)| event.id.clone())
            .collect()
    }

    pub fn channels(&self) -> Vec<String> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .map(|(channel, _)| channel.clone())
            .collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn create(&self, event: &Event) -> Result<(), SinkError> {
        self.received
            .lock()
            .unwrap()
            .push((String::new(), event.clone()));
        Ok(())
    }
}

#[async_trait]
impl BroadcastSink for RecordingSink {
    async fn send(&self, channel: &str, event: &Event) -> Result<(), SinkError> {
        self.received
            .lock()
            .unwrap()
            .push((channel.to_string(), event.clone()));
        Ok(())
    }
}

pub struct FailingSink;

#[async_trait]
impl EventSink for FailingSink {
    async fn create(&self, _event: &Event) -> Result<(), SinkError> {
        Err(SinkError::Backend("disk full".to_string()))
    }
}

#[async_trait]
impl BroadcastSink for FailingSink {
    async fn send(&self, channel: &str, _event: &Event) -> Result<(), SinkError> {
        Err(SinkError::Closed(channel.to_string()))
    }
}

#[derive(Default)]
pub struct RecordingReporter {
    messages: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, error: &RouterError) {
        self.messages.lock().unwrap().push(error.to_string());
    }
}

/// Subscribe a collector for `event_type` and hand back its buffer.
pub fn collect_events(router: &EventRouter, event_type: EventType) -> Arc<Mutex<Vec<Event>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    router.subscribe(event_type, move |event| {
        sink.lock().unwrap().push(event.clone());
    });
    seen
}

/// A lifecycle over an in-memory database with a recording emitter.
pub struct LifecycleFixture {
    pub db: Arc<Database>,
    pub emitter: Arc<RecordingEmitter>,
    pub ledger: Arc<CostLedger>,
    pub lifecycle: ProjectLifecycle,
}

impl LifecycleFixture {
    pub fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let emitter = Arc::new(RecordingEmitter::default());
        let ledger = Arc::new(CostLedger::new(emitter.clone()));
        let lifecycle = ProjectLifecycle::new(db.clone(), db.clone(), ledger.clone(), emitter.clone());
        Self {
            db,
            emitter,
            ledger,
            lifecycle,
        }
    }

    pub fn seed_agent(&self, project_id: &str, name: &str) -> String {
        let id = Uuid::new_v4().to_string();
        queries::insert_agent(
            &self.db,
            &AgentRow {
                id: id.clone(),
                project_id: project_id.to_string(),
                parent_agent_id: None,
                name: name.to_string(),
                status: "idle".to_string(),
                created_at: Utc::now().to_rfc3339(),
            },
        )
        .unwrap();
        id
    }
}

/// Project store whose reads work and whose writes always fail.
pub struct ReadOnlyProjects(pub Arc<Database>);

#[async_trait]
impl ProjectStore for ReadOnlyProjects {
    async fn create(&self, _project: &Project) -> Result<(), StoreError> {
        Err(StoreError::Backend("read-only store".to_string()))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Project>, StoreError> {
        ProjectStore::find_by_id(self.0.as_ref(), id).await
    }

    async fn find_all(&self, status: Option<ProjectStatus>) -> Result<Vec<Project>, StoreError> {
        ProjectStore::find_all(self.0.as_ref(), status).await
    }

    async fn update(&self, _project: &Project) -> Result<(), StoreError> {
        Err(StoreError::Backend("read-only store".to_string()))
    }

    async fn delete(&self, _id: &str) -> Result<bool, StoreError> {
        Err(StoreError::Backend("read-only store".to_string()))
    }
}
