use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::ride::{Place, Ride, RideOffer, RideStatus, RiderInfo};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rides", post(create_ride))
        .route("/rides/available", get(list_available_rides))
}

/// Posted by the payment pipeline once a ride is paid for and ready to be
/// offered to drivers.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRideRequest {
    pub rider: RiderInfo,
    pub pickup: Place,
    pub dropoff: Place,
    pub fare: f64,
    pub distance: f64,
    pub duration: f64,
}

async fn create_ride(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateRideRequest>,
) -> Result<Json<Ride>, AppError> {
    if payload.fare <= 0.0 {
        return Err(AppError::BadRequest("fare must be > 0".to_string()));
    }

    if payload.pickup.address.trim().is_empty() || payload.dropoff.address.trim().is_empty() {
        return Err(AppError::BadRequest(
            "pickup and dropoff addresses cannot be empty".to_string(),
        ));
    }

    let ride = Ride {
        id: Uuid::new_v4(),
        rider: payload.rider,
        pickup: payload.pickup,
        dropoff: payload.dropoff,
        fare: payload.fare,
        distance: payload.distance,
        duration: payload.duration,
        status: RideStatus::Pending,
        is_payment_done: true,
        driver_info: None,
        accepted_at: None,
        created_at: Utc::now(),
    };

    state.rides.upsert(ride.clone()).await?;
    state.engine.notify_new_payable_ride(&ride).await;

    Ok(Json(ride))
}

async fn list_available_rides(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<RideOffer>>, AppError> {
    let offers = state.engine.available_offers().await?;
    Ok(Json(offers))
}
