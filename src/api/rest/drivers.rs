use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::{ApprovalStatus, DriverLocation, DriverProfile};
use crate::presence::OnlineDriver;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(register_driver))
        .route("/drivers/online", get(list_online_drivers))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDriverRequest {
    pub id: Option<Uuid>,
    pub name: String,
    pub phone: String,
    pub vehicle: String,
    pub license_plate: String,
    #[serde(default = "default_rating")]
    pub rating: f64,
    pub approval_status: Option<ApprovalStatus>,
    pub location: Option<DriverLocation>,
}

fn default_rating() -> f64 {
    5.0
}

async fn register_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterDriverRequest>,
) -> Result<Json<DriverProfile>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    if payload.phone.trim().is_empty() {
        return Err(AppError::BadRequest("phone cannot be empty".to_string()));
    }

    let profile = DriverProfile {
        id: payload.id.unwrap_or_else(Uuid::new_v4),
        name: payload.name,
        phone: payload.phone,
        vehicle: payload.vehicle,
        license_plate: payload.license_plate,
        rating: payload.rating.clamp(0.0, 5.0),
        approval_status: payload.approval_status.unwrap_or(ApprovalStatus::Approved),
        is_online: false,
        last_seen: None,
        location: payload.location,
        total_rides: 0,
    };

    state.drivers.upsert(profile.clone()).await?;
    Ok(Json(profile))
}

async fn list_online_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<OnlineDriver>> {
    Json(state.engine.online_snapshot().await)
}
