use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::DriverLocation;
use crate::models::ride::{Ride, RideOffer};

/// Frames sent by driver apps, `{"event": <name>, "data": <payload>}`. The
/// event names are the platform's established realtime surface and must not
/// change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum DriverEvent {
    GoOnline { location: Option<DriverLocation> },
    GoOffline,
    #[serde(rename_all = "camelCase")]
    AcceptRide { ride_id: Uuid },
}

/// Frames pushed to driver apps, same envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    StatusUpdated { is_online: bool, message: String },
    AvailableRides(Vec<RideOffer>),
    NewRide(RideOffer),
    Accepted { ride: Ride, message: String },
    AcceptError { message: String },
    #[serde(rename_all = "camelCase")]
    TakenByOther { ride_id: Uuid },
}
