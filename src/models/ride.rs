use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::DriverSnapshot;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Place {
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiderInfo {
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RideStatus {
    Pending,
    Accepted,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ride {
    pub id: Uuid,
    pub rider: RiderInfo,
    pub pickup: Place,
    pub dropoff: Place,
    pub fare: f64,
    pub distance: f64,
    pub duration: f64,
    pub status: RideStatus,
    pub is_payment_done: bool,
    pub driver_info: Option<DriverSnapshot>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Ride {
    /// A ride may be offered to drivers only while it is still pending with
    /// payment done and no driver assigned.
    pub fn dispatch_eligible(&self) -> bool {
        self.status == RideStatus::Pending && self.is_payment_done && self.driver_info.is_none()
    }
}

/// Projection of a ride sent to drivers. Rebuilt from the store on every
/// query; the rider is reduced to a display name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideOffer {
    pub ride_id: Uuid,
    pub rider_name: String,
    pub pickup: Place,
    pub dropoff: Place,
    pub fare: f64,
    pub distance: f64,
    pub duration: f64,
    pub status: RideStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&Ride> for RideOffer {
    fn from(ride: &Ride) -> Self {
        Self {
            ride_id: ride.id,
            rider_name: ride.rider.name.clone(),
            pickup: ride.pickup.clone(),
            dropoff: ride.dropoff.clone(),
            fare: ride.fare,
            distance: ride.distance,
            duration: ride.duration,
            status: ride.status,
            created_at: ride.created_at,
        }
    }
}
