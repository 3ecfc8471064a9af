//! Outbound capabilities the router hands events to, and the reporter it
//! uses for failures it must not surface to callers.

use async_trait::async_trait;
use thiserror::Error;

use super::event_router::{Event, ListenerId};
use super::EventType;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink backend error: {0}")]
    Backend(String),
    #[error("sink closed: {0}")]
    Closed(String),
}

impl From<crate::db::DbError> for SinkError {
    fn from(value: crate::db::DbError) -> Self {
        Self::Backend(value.to_string())
    }
}

/// Durable event storage. Writes are best-effort from the router's side.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn create(&self, event: &Event) -> Result<(), SinkError>;
}

/// External broadcast target (a frontend bridge, a websocket fan-out).
#[async_trait]
pub trait BroadcastSink: Send + Sync {
    async fn send(&self, channel: &str, event: &Event) -> Result<(), SinkError>;
}

/// Failures swallowed by the router on behalf of its callers.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("failed to persist event {event_id} ({event_type}): {source}")]
    Persist {
        event_id: String,
        event_type: EventType,
        #[source]
        source: SinkError,
    },
    #[error("failed to broadcast event {event_id} ({event_type}): {source}")]
    Broadcast {
        event_id: String,
        event_type: EventType,
        #[source]
        source: SinkError,
    },
    #[error("listener {listener_id} for {event_type} panicked: {message}")]
    Listener {
        event_type: EventType,
        listener_id: ListenerId,
        message: String,
    },
}

pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &RouterError);
}

/// Default reporter: logs through `tracing` at warn level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, error: &RouterError) {
        match error {
            RouterError::Listener {
                event_type,
                listener_id,
                message,
            } => tracing::warn!(
                event_type = %event_type,
                listener_id = *listener_id,
                "event listener failed: {message}"
            ),
            other => tracing::warn!("{other}"),
        }
    }
}
