use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::sink::{BroadcastSink, ErrorReporter, EventSink, RouterError, TracingReporter};
use super::EventType;

pub const DEFAULT_BROADCAST_CHANNEL: &str = "loopdeck://events";

pub type ListenerId = u64;

type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// An emitted event. Listeners only ever see it by shared reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub seq: i64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub project_id: Option<String>,
    pub agent_id: Option<String>,
    pub data: serde_json::Value,
}

/// Everything an emitter supplies; the router adds id, seq and timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    pub project_id: Option<String>,
    pub agent_id: Option<String>,
    pub data: serde_json::Value,
}

impl EventDraft {
    pub fn new(data: serde_json::Value) -> Self {
        Self {
            project_id: None,
            agent_id: None,
            data,
        }
    }

    pub fn for_project(project_id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            project_id: Some(project_id.into()),
            agent_id: None,
            data,
        }
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }
}

/// The `emit` capability shared by the router and anything decorating it.
///
/// Returns the delivered event, or `None` when delivery was deferred.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event_type: EventType, draft: EventDraft) -> Option<Event>;
}

struct ListenerRegistration {
    id: ListenerId,
    callback: Listener,
}

#[derive(Default)]
struct Registry {
    next_id: ListenerId,
    listeners: HashMap<EventType, Vec<ListenerRegistration>>,
}

impl Registry {
    fn remove(&mut self, event_type: EventType, id: ListenerId) -> bool {
        let Some(registrations) = self.listeners.get_mut(&event_type) else {
            return false;
        };
        let before = registrations.len();
        registrations.retain(|registration| registration.id != id);
        let removed = registrations.len() != before;
        if registrations.is_empty() {
            self.listeners.remove(&event_type);
        }
        removed
    }
}

/// Handle returned by [`EventRouter::subscribe`].
///
/// Dropping it does not unsubscribe; call [`Subscription::unsubscribe`].
#[derive(Debug, Clone)]
pub struct Subscription {
    event_type: EventType,
    id: ListenerId,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Idempotent; a no-op once the listener is gone or the router dropped.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut guard = registry.lock().expect("event router mutex poisoned");
            guard.remove(self.event_type, self.id);
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("next_id", &self.next_id)
            .field("types", &self.listeners.len())
            .finish()
    }
}

/// Typed publish/subscribe hub.
///
/// `emit` hands the event to the persistence and broadcast sinks on a
/// spawned task, then calls every listener for the type inline, in
/// registration order. Neither sink failures nor listener panics reach the
/// emitter; they go to the configured [`ErrorReporter`].
#[derive(Clone)]
pub struct EventRouter {
    registry: Arc<Mutex<Registry>>,
    seq: Arc<AtomicI64>,
    sink: Option<Arc<dyn EventSink>>,
    broadcaster: Option<Arc<dyn BroadcastSink>>,
    channel: String,
    reporter: Arc<dyn ErrorReporter>,
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRouter {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            seq: Arc::new(AtomicI64::new(0)),
            sink: None,
            broadcaster: None,
            channel: DEFAULT_BROADCAST_CHANNEL.to_string(),
            reporter: Arc::new(TracingReporter),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn BroadcastSink>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Continue numbering from `next` instead of 0, e.g. past the highest
    /// sequence already in the event log.
    pub fn with_next_seq(self, next: i64) -> Self {
        self.seq.store(next, Ordering::Relaxed);
        self
    }

    /// Build, dispatch and return an event.
    pub fn emit(&self, event_type: EventType, draft: EventDraft) -> Event {
        let event = Event {
            id: Uuid::new_v4().to_string(),
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            event_type,
            timestamp: Utc::now(),
            project_id: draft.project_id,
            agent_id: draft.agent_id,
            data: draft.data,
        };
        self.dispatch_external(&event);
        self.notify(&event);
        event
    }

    pub fn subscribe<F>(&self, event_type: EventType, callback: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let mut guard = self.registry.lock().expect("event router mutex poisoned");
        guard.next_id += 1;
        let id = guard.next_id;
        guard
            .listeners
            .entry(event_type)
            .or_default()
            .push(ListenerRegistration {
                id,
                callback: Arc::new(callback),
            });
        Subscription {
            event_type,
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Remove one listener. Returns whether anything was removed.
    pub fn off(&self, event_type: EventType, id: ListenerId) -> bool {
        let mut guard = self.registry.lock().expect("event router mutex poisoned");
        guard.remove(event_type, id)
    }

    pub fn remove_all_listeners(&self, event_type: Option<EventType>) {
        let mut guard = self.registry.lock().expect("event router mutex poisoned");
        match event_type {
            Some(event_type) => {
                guard.listeners.remove(&event_type);
            }
            None => guard.listeners.clear(),
        }
    }

    pub fn listener_count(&self, event_type: EventType) -> usize {
        let guard = self.registry.lock().expect("event router mutex poisoned");
        guard.listeners.get(&event_type).map_or(0, Vec::len)
    }

    /// Number of event types with at least one listener.
    pub fn registered_types(&self) -> usize {
        let guard = self.registry.lock().expect("event router mutex poisoned");
        guard.listeners.len()
    }

    fn dispatch_external(&self, event: &Event) {
        if self.sink.is_none() && self.broadcaster.is_none() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(
                event_type = %event.event_type,
                "no async runtime; skipping event persistence and broadcast"
            );
            return;
        };

        let event = event.clone();
        let sink = self.sink.clone();
        let broadcaster = self.broadcaster.clone();
        let channel = self.channel.clone();
        let reporter = self.reporter.clone();

        handle.spawn(async move {
            let persist = async {
                match &sink {
                    Some(sink) => sink.create(&event).await,
                    None => Ok(()),
                }
            };
            let broadcast = async {
                match &broadcaster {
                    Some(broadcaster) => broadcaster.send(&channel, &event).await,
                    None => Ok(()),
                }
            };
            let (persisted, broadcasted) = futures::future::join(persist, broadcast).await;

            if let Err(source) = persisted {
                reporter.report(&RouterError::Persist {
                    event_id: event.id.clone(),
                    event_type: event.event_type,
                    source,
                });
            }
            if let Err(source) = broadcasted {
                reporter.report(&RouterError::Broadcast {
                    event_id: event.id.clone(),
                    event_type: event.event_type,
                    source,
                });
            }
        });
    }

    fn notify(&self, event: &Event) {
        // Snapshot so listeners can subscribe, unsubscribe or emit re-entrantly.
        let listeners: Vec<(ListenerId, Listener)> = {
            let guard = self.registry.lock().expect("event router mutex poisoned");
            guard
                .listeners
                .get(&event.event_type)
                .map(|registrations| {
                    registrations
                        .iter()
                        .map(|registration| (registration.id, registration.callback.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };

        for (id, callback) in listeners {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(event))) {
                self.reporter.report(&RouterError::Listener {
                    event_type: event.event_type,
                    listener_id: id,
                    message: panic_message(panic.as_ref()),
                });
            }
        }
    }
}

impl EventEmitter for EventRouter {
    fn emit(&self, event_type: EventType, draft: EventDraft) -> Option<Event> {
        Some(EventRouter::emit(self, event_type, draft))
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
