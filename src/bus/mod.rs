//! Event system shared by every other part of the core.
//!
//! The bus provides:
//! - Typed publish-subscribe with synchronous in-process delivery
//! - Best-effort persistence and external broadcast of every event
//! - Throttling of high-frequency events (output chunks, cost updates)
//!
//! # Architecture
//!
//! Events flow from producers → ThrottlingLayer → EventRouter → listeners:
//! - `EventRouter`: assigns identity, persists and broadcasts in the
//!   background, notifies listeners inline
//! - `ThrottlingLayer`: merges output chunks per agent and batches cost
//!   updates at ~60 Hz; critical events are never delayed
//! - `ChannelBroadcaster`: broadcast sink the desktop shell forwards to its
//!   frontend

mod batcher;
mod broadcast;
mod event_router;
mod event_types;
mod sink;

pub use batcher::{ThrottlingLayer, DEFAULT_FLUSH_INTERVAL};
pub use broadcast::{ChannelBroadcaster, ChannelMessage};
pub use event_router::{
    Event, EventDraft, EventEmitter, EventRouter, ListenerId, Subscription, DEFAULT_BROADCAST_CHANNEL,
};
pub use event_types::{EventType, ThrottleTier};
pub use sink::{BroadcastSink, ErrorReporter, EventSink, RouterError, SinkError, TracingReporter};
