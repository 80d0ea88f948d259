use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Emitted on the event feed whenever a driver wins a ride. The assignment
/// itself lives in the ride record; this is the observability copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub ride_id: Uuid,
    pub driver_id: Uuid,
    pub driver_name: String,
    pub fare: f64,
    pub accepted_at: DateTime<Utc>,
}
