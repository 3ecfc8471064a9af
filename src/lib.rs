//! Loopdeck core library.
//!
//! The backend services a Loopdeck desktop shell holds in its managed state:
//! - Event routing with best-effort persistence and broadcast
//! - Throttling of high-frequency agent output and cost updates
//! - Spend accounting and budget alerts
//! - Project records and their execution state machine
//!
//! # Architecture
//!
//! - `bus`: event router, throttling layer, broadcast channel
//! - `cost`: pricing table and the cost ledger
//! - `project`: project model, store capabilities, lifecycle service
//! - `db`: SQLite storage implementing the store and sink capabilities
//! - `config`: environment-driven runtime configuration
//!
//! [`LoopdeckCore`] wires these together; nothing here is a global.

pub mod bus;
pub mod config;
pub mod cost;
pub mod db;
pub mod project;

#[cfg(test)]
mod testing;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use serde::Serialize;

use bus::{ChannelBroadcaster, Event, EventEmitter, EventRouter, SinkError, Subscription, ThrottlingLayer};
use config::CoreConfig;
use cost::CostLedger;
use db::{queries, Database};
use project::{LifecycleError, ProjectLifecycle, StoreError};

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{0}")]
    Db(#[from] db::DbError),
    #[error("{0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Lifecycle(#[from] LifecycleError),
    #[error("{0}")]
    Sink(#[from] SinkError),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

impl Serialize for CoreError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Install the fmt subscriber. `RUST_LOG` wins over `config.log_filter`.
/// A second call is a no-op.
pub fn init_tracing(config: &CoreConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

// ---------------------------------------------------------------------------
// Composition root
// ---------------------------------------------------------------------------

/// Every core service, built once and shared by reference.
///
/// Producers emit through [`LoopdeckCore::emitter`] so output chunks and cost
/// updates are throttled; listeners subscribe on [`LoopdeckCore::router`].
pub struct LoopdeckCore {
    config: CoreConfig,
    db: Arc<Database>,
    router: EventRouter,
    throttle: Arc<ThrottlingLayer>,
    ledger: Arc<CostLedger>,
    lifecycle: ProjectLifecycle,
    broadcaster: Arc<ChannelBroadcaster>,
    usage_subscription: Subscription,
}

impl LoopdeckCore {
    /// Open the database under `config.data_dir` and build the services.
    pub fn open(config: CoreConfig) -> Result<Self, CoreError> {
        std::fs::create_dir_all(&config.data_dir)?;
        let path = config.database_path();
        let db = Database::open(&path)?;
        tracing::info!(path = %path.display(), "opened loopdeck database");
        Self::from_database(Arc::new(db), config)
    }

    /// Default configuration over an in-memory database.
    pub fn open_in_memory() -> Result<Self, CoreError> {
        Self::from_database(Arc::new(Database::open_in_memory()?), CoreConfig::default())
    }

    pub fn from_database(db: Arc<Database>, config: CoreConfig) -> Result<Self, CoreError> {
        let next_seq = queries::max_event_seq(&db)?.map_or(0, |seq| seq + 1);
        let broadcaster = Arc::new(ChannelBroadcaster::new());
        let router = EventRouter::new()
            .with_sink(db.clone())
            .with_broadcaster(broadcaster.clone())
            .with_next_seq(next_seq);
        let throttle = Arc::new(ThrottlingLayer::with_interval(
            Arc::new(router.clone()),
            config.flush_interval,
        ));

        let ledger = Arc::new(
            CostLedger::with_policy(throttle.clone(), config.budget_alert_policy)
                .with_default_model(config.default_model.clone())
                .with_warning_threshold(config.budget_warning_threshold),
        );
        let usage_subscription = ledger.attach(&router);
        let lifecycle = ProjectLifecycle::new(db.clone(), db.clone(), ledger.clone(), throttle.clone());

        tracing::debug!(
            next_seq,
            flush_interval_ms = config.flush_interval.as_millis() as u64,
            policy = config.budget_alert_policy.as_str(),
            "loopdeck core ready"
        );
        Ok(Self {
            config,
            db,
            router,
            throttle,
            ledger,
            lifecycle,
            broadcaster,
            usage_subscription,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    pub fn throttle(&self) -> &Arc<ThrottlingLayer> {
        &self.throttle
    }

    /// The throttled emit path producers should use.
    pub fn emitter(&self) -> Arc<dyn EventEmitter> {
        self.throttle.clone()
    }

    pub fn ledger(&self) -> &Arc<CostLedger> {
        &self.ledger
    }

    pub fn lifecycle(&self) -> &ProjectLifecycle {
        &self.lifecycle
    }

    pub fn broadcaster(&self) -> &Arc<ChannelBroadcaster> {
        &self.broadcaster
    }

    /// Stored events for `project_id` after `after_seq`, oldest first.
    pub fn events_after(&self, project_id: &str, after_seq: i64, limit: i64) -> Result<Vec<Event>, CoreError> {
        queries::list_events_after(&self.db, project_id, after_seq, limit)?
            .into_iter()
            .map(|row| Event::try_from(row).map_err(CoreError::from))
            .collect()
    }

    /// Deliver anything still buffered, then drop every listener.
    pub fn shutdown(&self) {
        self.throttle.force_flush();
        self.usage_subscription.unsubscribe();
        self.router.remove_all_listeners(None);
        tracing::info!("loopdeck core shut down");
    }
}
