use crate::error::StoreError;
use crate::models::ride::RideOffer;
use crate::store::RideStore;

/// Current dispatchable rides shaped for the driver feed, newest first,
/// capped at `limit`.
pub async fn fetch_available(
    store: &dyn RideStore,
    limit: usize,
) -> Result<Vec<RideOffer>, StoreError> {
    let rides = store.find_available(limit).await?;
    Ok(rides.iter().map(RideOffer::from).collect())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::fetch_available;
    use crate::models::ride::{Place, Ride, RideStatus, RiderInfo};
    use crate::store::memory::MemoryRideStore;
    use crate::store::RideStore;

    fn ride(fare: f64, age_secs: i64) -> Ride {
        Ride {
            id: Uuid::new_v4(),
            rider: RiderInfo {
                name: "Maya".to_string(),
                phone: "+15550100".to_string(),
            },
            pickup: Place {
                address: "12 Grand St".to_string(),
                latitude: 40.71,
                longitude: -74.0,
            },
            dropoff: Place {
                address: "88 Pine Ave".to_string(),
                latitude: 40.73,
                longitude: -73.98,
            },
            fare,
            distance: 4.2,
            duration: 13.0,
            status: RideStatus::Pending,
            is_payment_done: true,
            driver_info: None,
            accepted_at: None,
            created_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[tokio::test]
    async fn maps_rides_to_offers_newest_first() {
        let store = MemoryRideStore::new();
        let older = ride(12.0, 60);
        let newer = ride(20.0, 5);
        store.upsert(older.clone()).await.unwrap();
        store.upsert(newer.clone()).await.unwrap();

        let offers = fetch_available(&store, 10).await.unwrap();

        assert_eq!(offers.len(), 2);
        assert_eq!(offers[0].ride_id, newer.id);
        assert_eq!(offers[0].fare, 20.0);
        assert_eq!(offers[0].rider_name, "Maya");
        assert_eq!(offers[1].ride_id, older.id);
    }

    #[tokio::test]
    async fn respects_limit() {
        let store = MemoryRideStore::new();
        for age in 0..5 {
            store.upsert(ride(10.0, age)).await.unwrap();
        }

        let offers = fetch_available(&store, 3).await.unwrap();
        assert_eq!(offers.len(), 3);
    }
}
