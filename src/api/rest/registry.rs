use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::courier;
use crate::engine::registry::{self, NewCourier, NewHub, NewStaff, NewVehicle};
use crate::error::AppError;
use crate::models::courier::Courier;
use crate::models::hub::{Hub, HubStaff};
use crate::models::vehicle::Vehicle;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/hubs", post(create_hub).get(list_hubs))
        .route("/couriers", post(create_courier))
        .route("/staff", post(create_staff))
        .route("/vehicles", post(create_vehicle))
        .route("/vehicles/:id/release", post(release_vehicle))
}

async fn create_hub(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewHub>,
) -> Result<Json<Hub>, AppError> {
    Ok(Json(registry::register_hub(&state, payload)?))
}

async fn list_hubs(State(state): State<Arc<AppState>>) -> Json<Vec<Hub>> {
    let mut hubs = state.store.hubs.filter(|_| true);
    hubs.sort_by_key(|hub| hub.created_at);
    Json(hubs)
}

async fn create_courier(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewCourier>,
) -> Result<Json<Courier>, AppError> {
    Ok(Json(registry::register_courier(&state, payload)?))
}

async fn create_staff(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewStaff>,
) -> Result<Json<HubStaff>, AppError> {
    Ok(Json(registry::register_staff(&state, payload)?))
}

async fn create_vehicle(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewVehicle>,
) -> Result<Json<Vehicle>, AppError> {
    Ok(Json(registry::register_vehicle(&state, payload)?))
}

#[derive(Deserialize)]
pub struct ReleaseVehicleRequest {
    pub courier_id: Uuid,
}

async fn release_vehicle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReleaseVehicleRequest>,
) -> Result<Json<Vehicle>, AppError> {
    Ok(Json(courier::release_vehicle(&state, payload.courier_id, id)?))
}
