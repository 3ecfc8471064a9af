use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;

use super::event_router::{Event, EventDraft, EventEmitter};
use super::event_types::{EventType, ThrottleTier};

/// ~60 Hz.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(16);

struct ChunkBuffer {
    agent_id: String,
    /// First draft seen for the agent; supplies project id and extra fields.
    template: EventDraft,
    chunks: Vec<String>,
}

#[derive(Default)]
struct ThrottleState {
    buffers: Vec<ChunkBuffer>,
    queue: Vec<(EventType, EventDraft)>,
    flush_pending: bool,
    timer: Option<JoinHandle<()>>,
    /// Bumped whenever pending work is taken; a timer armed under an older
    /// generation must not flush.
    generation: u64,
}

impl ThrottleState {
    fn buffer_chunk(&mut self, draft: EventDraft) {
        let agent_id = draft.agent_id.clone().unwrap_or_default();
        let chunk = chunk_text(&draft.data);
        match self.buffers.iter_mut().find(|buffer| buffer.agent_id == agent_id) {
            Some(buffer) => buffer.chunks.push(chunk),
            None => self.buffers.push(ChunkBuffer {
                agent_id,
                template: draft,
                chunks: vec![chunk],
            }),
        }
    }

    fn take_pending(&mut self, abort_timer: bool) -> (Vec<ChunkBuffer>, Vec<(EventType, EventDraft)>) {
        if let Some(timer) = self.timer.take() {
            if abort_timer {
                timer.abort();
            }
        }
        self.flush_pending = false;
        self.generation = self.generation.wrapping_add(1);
        (std::mem::take(&mut self.buffers), std::mem::take(&mut self.queue))
    }
}

/// Rate-limiting decorator over any [`EventEmitter`].
///
/// - Critical and untiered events pass straight through.
/// - `agent_output_chunk` events are buffered per agent and merged into a
///   single event per flush.
/// - Batchable events (`cost_updated`) are queued and forwarded in arrival
///   order at the next flush.
///
/// The flush timer is armed by the first deferred event and not re-armed
/// until it has fired or been cancelled.
#[derive(Clone)]
pub struct ThrottlingLayer {
    base: Arc<dyn EventEmitter>,
    state: Arc<Mutex<ThrottleState>>,
    interval: Duration,
}

impl ThrottlingLayer {
    pub fn new(base: Arc<dyn EventEmitter>) -> Self {
        Self::with_interval(base, DEFAULT_FLUSH_INTERVAL)
    }

    pub fn with_interval(base: Arc<dyn EventEmitter>, interval: Duration) -> Self {
        Self {
            base,
            state: Arc::new(Mutex::new(ThrottleState::default())),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Cancel any pending timer and forward everything buffered now.
    pub fn force_flush(&self) {
        let pending = {
            let mut guard = self.state.lock().expect("throttle mutex poisoned");
            guard.take_pending(true)
        };
        forward(self.base.as_ref(), pending);
    }

    /// Drop everything buffered without forwarding it.
    pub fn clear_queues(&self) {
        let (buffers, queue) = {
            let mut guard = self.state.lock().expect("throttle mutex poisoned");
            guard.take_pending(true)
        };
        if !buffers.is_empty() || !queue.is_empty() {
            tracing::debug!(
                agents = buffers.len(),
                queued = queue.len(),
                "discarded throttled events"
            );
        }
    }

    /// Number of batchable events waiting for the next flush.
    pub fn queue_size(&self) -> usize {
        let guard = self.state.lock().expect("throttle mutex poisoned");
        guard.queue.len()
    }

    /// Number of agents with buffered output chunks.
    pub fn buffer_size(&self) -> usize {
        let guard = self.state.lock().expect("throttle mutex poisoned");
        guard.buffers.len()
    }

    pub fn buffered_chunk_count(&self) -> usize {
        let guard = self.state.lock().expect("throttle mutex poisoned");
        guard.buffers.iter().map(|buffer| buffer.chunks.len()).sum()
    }

    pub fn has_pending_flush(&self) -> bool {
        let guard = self.state.lock().expect("throttle mutex poisoned");
        guard.flush_pending
    }

    fn defer(&self, event_type: EventType, draft: EventDraft) {
        let flush_inline = {
            let mut guard = self.state.lock().expect("throttle mutex poisoned");
            match event_type.tier() {
                ThrottleTier::StreamingMerge => guard.buffer_chunk(draft),
                _ => guard.queue.push((event_type, draft)),
            }
            if guard.flush_pending {
                false
            } else {
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        guard.flush_pending = true;
                        guard.timer = Some(handle.spawn(flush_after(
                            self.interval,
                            guard.generation,
                            self.state.clone(),
                            self.base.clone(),
                        )));
                        false
                    }
                    Err(_) => true,
                }
            }
        };

        if flush_inline {
            tracing::debug!(event_type = %event_type, "no async runtime; flushing throttled events inline");
            self.force_flush();
        }
    }
}

impl EventEmitter for ThrottlingLayer {
    fn emit(&self, event_type: EventType, draft: EventDraft) -> Option<Event> {
        if event_type.tier().is_deferred() {
            self.defer(event_type, draft);
            None
        } else {
            self.base.emit(event_type, draft)
        }
    }
}

async fn flush_after(
    interval: Duration,
    generation: u64,
    state: Arc<Mutex<ThrottleState>>,
    base: Arc<dyn EventEmitter>,
) {
    tokio::time::sleep(interval).await;
    let pending = {
        let mut guard = state.lock().expect("throttle mutex poisoned");
        if guard.generation != generation {
            // Superseded by a force_flush or clear_queues that ran while we slept.
            return;
        }
        guard.take_pending(false)
    };
    forward(base.as_ref(), pending);
}

fn forward(base: &dyn EventEmitter, (buffers, queue): (Vec<ChunkBuffer>, Vec<(EventType, EventDraft)>)) {
    for buffer in buffers {
        let mut draft = buffer.template;
        draft.data = merged_chunk_data(draft.data, buffer.chunks.concat());
        base.emit(EventType::AgentOutputChunk, draft);
    }
    for (event_type, draft) in queue {
        base.emit(event_type, draft);
    }
}

fn chunk_text(data: &Value) -> String {
    data.get("chunk")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn merged_chunk_data(data: Value, chunk: String) -> Value {
    let mut fields = match data {
        Value::Object(fields) => fields,
        _ => serde_json::Map::new(),
    };
    fields.insert("chunk".to_string(), Value::String(chunk));
    fields.insert("chunk_index".to_string(), Value::from(0));
    Value::Object(fields)
}
