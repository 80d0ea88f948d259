use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::availability::fetch_available;
use crate::error::StoreError;
use crate::models::assignment::Assignment;
use crate::models::driver::{DriverLocation, DriverSnapshot};
use crate::models::ride::{Ride, RideOffer};
use crate::observability::metrics::Metrics;
use crate::presence::{OnlineDriver, PresenceRegistry};
use crate::protocol::ServerEvent;
use crate::store::{DriverStore, RideStore};

/// Core dispatch logic. One instance shared by every connection task and the
/// REST ingress; all cross-driver coordination goes through the presence
/// registry and the ride store, so methods can be called concurrently.
pub struct DispatchEngine {
    presence: Arc<dyn PresenceRegistry>,
    rides: Arc<dyn RideStore>,
    drivers: Arc<dyn DriverStore>,
    metrics: Metrics,
    assignment_events_tx: broadcast::Sender<Assignment>,
    available_rides_limit: usize,
    accept_timeout: Duration,
}

impl DispatchEngine {
    pub fn new(
        presence: Arc<dyn PresenceRegistry>,
        rides: Arc<dyn RideStore>,
        drivers: Arc<dyn DriverStore>,
        metrics: Metrics,
        assignment_events_tx: broadcast::Sender<Assignment>,
        available_rides_limit: usize,
        accept_timeout: Duration,
    ) -> Self {
        Self {
            presence,
            rides,
            drivers,
            metrics,
            assignment_events_tx,
            available_rides_limit,
            accept_timeout,
        }
    }

    /// Driver asked to start receiving rides. Confirms the status first,
    /// then pushes the current ride list to this driver only. A failed list
    /// fetch leaves the driver online without an initial list.
    pub async fn driver_online(&self, driver_id: Uuid, conn_id: u64, location: Option<DriverLocation>) {
        if !self
            .presence
            .set_online(driver_id, conn_id, location.clone())
            .await
        {
            debug!(driver_id = %driver_id, "ignoring goOnline from a replaced connection");
            return;
        }
        self.metrics
            .online_drivers
            .set(self.presence.online_count().await as i64);
        info!(driver_id = %driver_id, "driver online");

        if let Err(err) = self
            .drivers
            .update_presence_flag(driver_id, true, Utc::now(), location)
            .await
        {
            warn!(driver_id = %driver_id, error = %err, "failed to persist online status");
        }

        self.presence
            .send(
                driver_id,
                &ServerEvent::StatusUpdated {
                    is_online: true,
                    message: "You are now online".to_string(),
                },
            )
            .await;
        self.count_pushes("statusUpdated", 1);

        self.push_available(&[driver_id]).await;
    }

    /// Driver stops taking rides but keeps the socket, so the confirmation
    /// still reaches them.
    pub async fn driver_offline(&self, driver_id: Uuid, conn_id: u64) {
        if !self.presence.set_offline(driver_id, conn_id).await {
            debug!(driver_id = %driver_id, "ignoring goOffline from a replaced connection");
            return;
        }
        self.metrics
            .online_drivers
            .set(self.presence.online_count().await as i64);
        info!(driver_id = %driver_id, "driver offline");

        if let Err(err) = self
            .drivers
            .update_presence_flag(driver_id, false, Utc::now(), None)
            .await
        {
            warn!(driver_id = %driver_id, error = %err, "failed to persist offline status");
        }

        self.presence
            .send(
                driver_id,
                &ServerEvent::StatusUpdated {
                    is_online: false,
                    message: "You are now offline".to_string(),
                },
            )
            .await;
        self.count_pushes("statusUpdated", 1);
    }

    /// Transport-level disconnect. No farewell frame; the socket is gone.
    pub async fn disconnected(&self, driver_id: Uuid, conn_id: u64) {
        if !self.presence.remove(driver_id, conn_id).await {
            return;
        }
        self.metrics
            .online_drivers
            .set(self.presence.online_count().await as i64);
        info!(driver_id = %driver_id, "driver disconnected");

        if let Err(err) = self
            .drivers
            .update_presence_flag(driver_id, false, Utc::now(), None)
            .await
        {
            warn!(driver_id = %driver_id, error = %err, "failed to persist offline status");
        }
    }

    /// Claim a ride for the driver. The store performs the claim as one
    /// conditional update, so under contention exactly one caller wins.
    /// Failures and deadline overruns fail closed with an error frame;
    /// the claim is never retried.
    pub async fn accept_ride(&self, driver_id: Uuid, conn_id: u64, ride_id: Uuid) {
        let started = Instant::now();

        let conn = match self.presence.get(driver_id).await {
            Some(conn) if conn.conn_id == conn_id => conn,
            _ => {
                debug!(driver_id = %driver_id, "ignoring acceptRide from a replaced connection");
                return;
            }
        };

        if !conn.online {
            debug!(driver_id = %driver_id, ride_id = %ride_id, "accept rejected: driver is offline");
            self.presence
                .send(
                    driver_id,
                    &ServerEvent::AcceptError {
                        message: "Go online to accept rides".to_string(),
                    },
                )
                .await;
            self.count_pushes("acceptError", 1);
            self.finish_accept("rejected_offline", started);
            return;
        }

        let profile = match self.drivers.find_by_id(driver_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                error!(driver_id = %driver_id, "accepting driver has no profile");
                self.send_accept_failure(driver_id).await;
                self.finish_accept("error", started);
                return;
            }
            Err(err) => {
                error!(driver_id = %driver_id, error = %err, "failed to load driver profile");
                self.send_accept_failure(driver_id).await;
                self.finish_accept("error", started);
                return;
            }
        };

        let snapshot = DriverSnapshot::from(&profile);
        let accepted_at = Utc::now();

        let claim = timeout(
            self.accept_timeout,
            self.rides.conditional_assign(ride_id, snapshot, accepted_at),
        )
        .await;

        match claim {
            Ok(Ok(Some(ride))) => {
                info!(ride_id = %ride.id, driver_id = %driver_id, fare = ride.fare, "ride accepted");

                if let Err(err) = self.drivers.increment_ride_count(driver_id).await {
                    warn!(driver_id = %driver_id, error = %err, "failed to update driver ride count");
                }

                let assignment = Assignment {
                    ride_id: ride.id,
                    driver_id,
                    driver_name: profile.name.clone(),
                    fare: ride.fare,
                    accepted_at,
                };

                self.presence
                    .send(
                        driver_id,
                        &ServerEvent::Accepted {
                            ride,
                            message: "Ride accepted".to_string(),
                        },
                    )
                    .await;
                self.count_pushes("accepted", 1);

                let others: Vec<Uuid> = self
                    .presence
                    .online_ids()
                    .await
                    .into_iter()
                    .filter(|id| *id != driver_id)
                    .collect();
                self.presence
                    .broadcast(&others, &ServerEvent::TakenByOther { ride_id })
                    .await;
                self.count_pushes("takenByOther", others.len());

                let online = self.presence.online_ids().await;
                self.push_available(&online).await;

                let _ = self.assignment_events_tx.send(assignment);
                self.finish_accept("won", started);
            }
            Ok(Ok(None)) => {
                info!(ride_id = %ride_id, driver_id = %driver_id, "ride already taken");
                self.presence
                    .send(
                        driver_id,
                        &ServerEvent::AcceptError {
                            message: "Ride no longer available".to_string(),
                        },
                    )
                    .await;
                self.count_pushes("acceptError", 1);
                self.push_available(&[driver_id]).await;
                self.finish_accept("lost_race", started);
            }
            Ok(Err(err)) => {
                error!(ride_id = %ride_id, driver_id = %driver_id, error = %err, "ride claim failed");
                self.send_accept_failure(driver_id).await;
                self.finish_accept("error", started);
            }
            Err(_) => {
                error!(ride_id = %ride_id, driver_id = %driver_id, "ride claim timed out");
                self.send_accept_failure(driver_id).await;
                self.finish_accept("timeout", started);
            }
        }
    }

    /// Announce a newly payable ride to every online driver. Callers hand
    /// over the ride as stored; anything not dispatchable is dropped here
    /// rather than trusted.
    pub async fn notify_new_payable_ride(&self, ride: &Ride) {
        if !ride.dispatch_eligible() {
            warn!(ride_id = %ride.id, "skipping broadcast for a ride that is not dispatchable");
            return;
        }

        let online = self.presence.online_ids().await;
        if online.is_empty() {
            debug!(ride_id = %ride.id, "no online drivers to notify");
            return;
        }

        self.presence
            .broadcast(&online, &ServerEvent::NewRide(RideOffer::from(ride)))
            .await;
        self.count_pushes("newRide", online.len());
        info!(ride_id = %ride.id, drivers = online.len(), "new ride broadcast");
    }

    pub async fn online_snapshot(&self) -> Vec<OnlineDriver> {
        self.presence.snapshot().await
    }

    /// The ride list as a driver would see it right now.
    pub async fn available_offers(&self) -> Result<Vec<RideOffer>, StoreError> {
        fetch_available(self.rides.as_ref(), self.available_rides_limit).await
    }

    async fn push_available(&self, driver_ids: &[Uuid]) {
        if driver_ids.is_empty() {
            return;
        }
        match self.available_offers().await {
            Ok(offers) => {
                self.presence
                    .broadcast(driver_ids, &ServerEvent::AvailableRides(offers))
                    .await;
                self.count_pushes("availableRides", driver_ids.len());
            }
            Err(err) => {
                warn!(error = %err, "failed to fetch available rides");
            }
        }
    }

    async fn send_accept_failure(&self, driver_id: Uuid) {
        self.presence
            .send(
                driver_id,
                &ServerEvent::AcceptError {
                    message: "Could not accept ride".to_string(),
                },
            )
            .await;
        self.count_pushes("acceptError", 1);
    }

    fn finish_accept(&self, outcome: &str, started: Instant) {
        let elapsed = started.elapsed().as_secs_f64();
        self.metrics
            .accept_latency_seconds
            .with_label_values(&[outcome])
            .observe(elapsed);
        self.metrics
            .accepts_total
            .with_label_values(&[outcome])
            .inc();
    }

    fn count_pushes(&self, event: &str, count: usize) {
        if count > 0 {
            self.metrics
                .events_pushed_total
                .with_label_values(&[event])
                .inc_by(count as u64);
        }
    }
}
