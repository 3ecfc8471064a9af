use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::event_router::Event;
use super::sink::{BroadcastSink, SinkError};

const BUS_CAPACITY: usize = 1024;

/// An event tagged with the channel it was sent on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub channel: String,
    pub event: Event,
}

/// Broadcast sink backed by an in-memory `tokio::sync::broadcast` channel.
///
/// The desktop shell subscribes and forwards messages to its frontend.
/// Sending with no live receivers is not an error.
#[derive(Clone)]
pub struct ChannelBroadcaster {
    tx: broadcast::Sender<ChannelMessage>,
}

impl ChannelBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Get a new receiver for this channel.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelMessage> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BroadcastSink for ChannelBroadcaster {
    async fn send(&self, channel: &str, event: &Event) -> Result<(), SinkError> {
        let message = ChannelMessage {
            channel: channel.to_string(),
            event: event.clone(),
        };
        if self.tx.send(message).is_err() {
            tracing::debug!(event_type = %event.event_type, "broadcast skipped: no receivers");
        }
        Ok(())
    }
}
