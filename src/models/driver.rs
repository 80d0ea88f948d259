use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Subset of the externally-owned driver record that dispatch reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverProfile {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub vehicle: String,
    pub license_plate: String,
    pub rating: f64,
    pub approval_status: ApprovalStatus,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub location: Option<DriverLocation>,
    pub total_rides: u32,
}

/// What gets written into a ride's `driverInfo` when a claim wins. Captured
/// from the profile before the conditional assign so the claim carries it
/// atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverSnapshot {
    pub driver_id: Uuid,
    pub name: String,
    pub phone: String,
    pub vehicle: String,
    pub license_plate: String,
    pub rating: f64,
}

impl From<&DriverProfile> for DriverSnapshot {
    fn from(profile: &DriverProfile) -> Self {
        Self {
            driver_id: profile.id,
            name: profile.name.clone(),
            phone: profile.phone.clone(),
            vehicle: profile.vehicle.clone(),
            license_plate: profile.license_plate.clone(),
            rating: profile.rating,
        }
    }
}
