pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::driver::{DriverLocation, DriverProfile, DriverSnapshot};
use crate::models::ride::Ride;

/// Ride collection seam. The dispatch engine is the only writer of `status`
/// and `driverInfo`, and it writes them exclusively through
/// `conditional_assign`.
#[async_trait]
pub trait RideStore: Send + Sync {
    /// Fresh snapshot of offerable rides: pending, payment done, unassigned;
    /// newest first, capped at `limit`. Read-only.
    async fn find_available(&self, limit: usize) -> Result<Vec<Ride>, StoreError>;

    /// Claim a ride for a driver: set `status=accepted`, `driverInfo`, and
    /// `acceptedAt` only if the ride is still offerable per
    /// `dispatch_eligible`. Returns the updated ride, or `None` when the
    /// guard no longer matches (someone else won, or the ride was cancelled).
    /// Implementations must perform this as one atomic conditional write;
    /// the single-assignment invariant rests entirely on that.
    async fn conditional_assign(
        &self,
        ride_id: Uuid,
        driver: DriverSnapshot,
        accepted_at: DateTime<Utc>,
    ) -> Result<Option<Ride>, StoreError>;

    /// Write a ride record; used by the payment-completion hook.
    async fn upsert(&self, ride: Ride) -> Result<(), StoreError>;
}

/// Driver collection seam. Presence and ride-count writes are best-effort
/// mirrors; dispatch never depends on reading them back.
#[async_trait]
pub trait DriverStore: Send + Sync {
    async fn find_by_id(&self, driver_id: Uuid) -> Result<Option<DriverProfile>, StoreError>;

    async fn upsert(&self, profile: DriverProfile) -> Result<(), StoreError>;

    async fn update_presence_flag(
        &self,
        driver_id: Uuid,
        is_online: bool,
        last_seen: DateTime<Utc>,
        location: Option<DriverLocation>,
    ) -> Result<(), StoreError>;

    async fn increment_ride_count(&self, driver_id: Uuid) -> Result<(), StoreError>;
}
