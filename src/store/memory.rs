use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::driver::{DriverLocation, DriverProfile, DriverSnapshot};
use crate::models::ride::{Ride, RideStatus};
use crate::store::{DriverStore, RideStore};

/// Process-local ride collection. Stands in for the platform's document
/// store; `conditional_assign` does its guarded update under the map's
/// per-entry lock, so the check and the write are one atomic step.
#[derive(Default)]
pub struct MemoryRideStore {
    rides: DashMap<Uuid, Ride>,
}

impl MemoryRideStore {
    pub fn new() -> Self {
        Self {
            rides: DashMap::new(),
        }
    }

    pub fn get(&self, ride_id: Uuid) -> Option<Ride> {
        self.rides.get(&ride_id).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl RideStore for MemoryRideStore {
    async fn find_available(&self, limit: usize) -> Result<Vec<Ride>, StoreError> {
        let mut available: Vec<Ride> = self
            .rides
            .iter()
            .filter(|entry| entry.value().dispatch_eligible())
            .map(|entry| entry.value().clone())
            .collect();

        available.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        available.truncate(limit);

        Ok(available)
    }

    async fn conditional_assign(
        &self,
        ride_id: Uuid,
        driver: DriverSnapshot,
        accepted_at: DateTime<Utc>,
    ) -> Result<Option<Ride>, StoreError> {
        match self.rides.get_mut(&ride_id) {
            Some(mut ride) if ride.dispatch_eligible() => {
                ride.status = RideStatus::Accepted;
                ride.driver_info = Some(driver);
                ride.accepted_at = Some(accepted_at);
                Ok(Some(ride.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn upsert(&self, ride: Ride) -> Result<(), StoreError> {
        self.rides.insert(ride.id, ride);
        Ok(())
    }
}

/// Process-local mirror of the externally-owned driver collection.
#[derive(Default)]
pub struct MemoryDriverStore {
    drivers: DashMap<Uuid, DriverProfile>,
}

impl MemoryDriverStore {
    pub fn new() -> Self {
        Self {
            drivers: DashMap::new(),
        }
    }
}

#[async_trait]
impl DriverStore for MemoryDriverStore {
    async fn find_by_id(&self, driver_id: Uuid) -> Result<Option<DriverProfile>, StoreError> {
        Ok(self
            .drivers
            .get(&driver_id)
            .map(|entry| entry.value().clone()))
    }

    async fn upsert(&self, profile: DriverProfile) -> Result<(), StoreError> {
        self.drivers.insert(profile.id, profile);
        Ok(())
    }

    async fn update_presence_flag(
        &self,
        driver_id: Uuid,
        is_online: bool,
        last_seen: DateTime<Utc>,
        location: Option<DriverLocation>,
    ) -> Result<(), StoreError> {
        if let Some(mut driver) = self.drivers.get_mut(&driver_id) {
            driver.is_online = is_online;
            driver.last_seen = Some(last_seen);
            if location.is_some() {
                driver.location = location;
            }
        }
        Ok(())
    }

    async fn increment_ride_count(&self, driver_id: Uuid) -> Result<(), StoreError> {
        if let Some(mut driver) = self.drivers.get_mut(&driver_id) {
            driver.total_rides = driver.total_rides.saturating_add(1);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::MemoryRideStore;
    use crate::models::driver::DriverSnapshot;
    use crate::models::ride::{Place, Ride, RideStatus, RiderInfo};
    use crate::store::RideStore;

    fn place(address: &str) -> Place {
        Place {
            address: address.to_string(),
            latitude: 52.52,
            longitude: 13.405,
        }
    }

    fn ride(id_seed: u128, age_secs: i64) -> Ride {
        Ride {
            id: Uuid::from_u128(id_seed),
            rider: RiderInfo {
                name: "test-rider".to_string(),
                phone: "+4915200000000".to_string(),
            },
            pickup: place("Alexanderplatz 1"),
            dropoff: place("Hauptstr. 9"),
            fare: 14.5,
            distance: 6.2,
            duration: 19.0,
            status: RideStatus::Pending,
            is_payment_done: true,
            driver_info: None,
            accepted_at: None,
            created_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    fn snapshot(id_seed: u128) -> DriverSnapshot {
        DriverSnapshot {
            driver_id: Uuid::from_u128(id_seed),
            name: "test-driver".to_string(),
            phone: "+4915211111111".to_string(),
            vehicle: "Grey VW Golf".to_string(),
            license_plate: "B-XY 1234".to_string(),
            rating: 4.7,
        }
    }

    #[tokio::test]
    async fn find_available_excludes_ineligible_rides() {
        let store = MemoryRideStore::new();

        store.upsert(ride(1, 10)).await.unwrap();

        let mut unpaid = ride(2, 20);
        unpaid.is_payment_done = false;
        store.upsert(unpaid).await.unwrap();

        let mut cancelled = ride(3, 30);
        cancelled.status = RideStatus::Cancelled;
        store.upsert(cancelled).await.unwrap();

        let mut taken = ride(4, 40);
        taken.status = RideStatus::Accepted;
        taken.driver_info = Some(snapshot(9));
        store.upsert(taken).await.unwrap();

        let available = store.find_available(10).await.unwrap();

        assert_eq!(available.len(), 1);
        assert_eq!(available[0].id, Uuid::from_u128(1));
    }

    #[tokio::test]
    async fn find_available_returns_newest_first_capped() {
        let store = MemoryRideStore::new();
        for seed in 0..5u128 {
            store.upsert(ride(seed, seed as i64 * 60)).await.unwrap();
        }

        let available = store.find_available(3).await.unwrap();

        assert_eq!(available.len(), 3);
        assert_eq!(available[0].id, Uuid::from_u128(0));
        assert_eq!(available[1].id, Uuid::from_u128(1));
        assert_eq!(available[2].id, Uuid::from_u128(2));
    }

    #[tokio::test]
    async fn conditional_assign_claims_eligible_ride_once() {
        let store = MemoryRideStore::new();
        store.upsert(ride(1, 0)).await.unwrap();

        let won = store
            .conditional_assign(Uuid::from_u128(1), snapshot(7), Utc::now())
            .await
            .unwrap();
        assert!(won.is_some());
        let won = won.unwrap();
        assert_eq!(won.status, RideStatus::Accepted);
        assert_eq!(won.driver_info.unwrap().driver_id, Uuid::from_u128(7));

        let lost = store
            .conditional_assign(Uuid::from_u128(1), snapshot(8), Utc::now())
            .await
            .unwrap();
        assert!(lost.is_none());

        let stored = store.get(Uuid::from_u128(1)).unwrap();
        assert_eq!(stored.driver_info.unwrap().driver_id, Uuid::from_u128(7));
    }

    #[tokio::test]
    async fn conditional_assign_rejects_unpaid_and_cancelled() {
        let store = MemoryRideStore::new();

        let mut unpaid = ride(1, 0);
        unpaid.is_payment_done = false;
        store.upsert(unpaid).await.unwrap();

        let mut cancelled = ride(2, 0);
        cancelled.status = RideStatus::Cancelled;
        store.upsert(cancelled).await.unwrap();

        let unpaid_claim = store
            .conditional_assign(Uuid::from_u128(1), snapshot(7), Utc::now())
            .await
            .unwrap();
        let cancelled_claim = store
            .conditional_assign(Uuid::from_u128(2), snapshot(7), Utc::now())
            .await
            .unwrap();

        assert!(unpaid_claim.is_none());
        assert!(cancelled_claim.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claims_resolve_to_exactly_one_winner() {
        let store = Arc::new(MemoryRideStore::new());
        store.upsert(ride(1, 0)).await.unwrap();

        let mut handles = Vec::new();
        for seed in 0..8u128 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .conditional_assign(Uuid::from_u128(1), snapshot(100 + seed), Utc::now())
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        assert!(store.get(Uuid::from_u128(1)).unwrap().driver_info.is_some());
    }
}
