use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::Config;
use crate::engine::dispatch::DispatchEngine;
use crate::models::assignment::Assignment;
use crate::observability::metrics::Metrics;
use crate::presence::{MemoryPresenceRegistry, PresenceRegistry};
use crate::store::{DriverStore, RideStore};

pub struct AppState {
    pub rides: Arc<dyn RideStore>,
    pub drivers: Arc<dyn DriverStore>,
    pub presence: Arc<dyn PresenceRegistry>,
    pub engine: Arc<DispatchEngine>,
    pub metrics: Metrics,
    pub assignment_events_tx: broadcast::Sender<Assignment>,
    pub jwt_secret: String,
}

impl AppState {
    pub fn new(config: &Config, rides: Arc<dyn RideStore>, drivers: Arc<dyn DriverStore>) -> Self {
        let presence: Arc<dyn PresenceRegistry> = Arc::new(MemoryPresenceRegistry::new());
        let metrics = Metrics::new();
        let (assignment_events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);

        let engine = Arc::new(DispatchEngine::new(
            presence.clone(),
            rides.clone(),
            drivers.clone(),
            metrics.clone(),
            assignment_events_tx.clone(),
            config.available_rides_limit,
            Duration::from_secs(config.accept_timeout_secs),
        ));

        Self {
            rides,
            drivers,
            presence,
            engine,
            metrics,
            assignment_events_tx,
            jwt_secret: config.jwt_secret.clone(),
        }
    }
}
