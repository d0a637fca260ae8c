use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::courier::{self, ParcelInput};
use crate::engine::pickup::PickupRequestView;
use crate::engine::proof::{self, DeliveryReceipt, ProofFields};
use crate::engine::tracking::{self, NextActions};
use crate::error::AppError;
use crate::models::parcel::{Parcel, ParcelAction};
use crate::models::pickup::PickupRequest;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/pickups/available", get(list_available))
        .route("/pickups/:id/accept", post(accept))
        .route(
            "/pickups/:id/items/:item_id/parcels",
            post(materialize),
        )
        .route("/parcels/:id/actions", post(parcel_action))
        .route("/parcels/:id/next-actions", get(next_actions))
        .route("/parcels/:id/deliver", post(deliver))
        .route("/parcels/:id/fail", post(fail))
}

#[derive(Deserialize)]
pub struct AcceptRequest {
    pub courier_id: Uuid,
    pub vehicle_id: Uuid,
}

#[derive(Deserialize)]
pub struct MaterializeRequest {
    pub courier_id: Uuid,
    #[serde(flatten)]
    pub input: ParcelInput,
}

#[derive(Deserialize)]
pub struct ParcelActionRequest {
    pub courier_id: Uuid,
    pub action: String,
    pub hub_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct DeliverRequest {
    pub courier_id: Uuid,
    #[serde(flatten)]
    pub proof: ProofFields,
}

#[derive(Deserialize)]
pub struct FailRequest {
    pub courier_id: Uuid,
    pub reason: String,
}

async fn list_available(State(state): State<Arc<AppState>>) -> Json<Vec<PickupRequestView>> {
    Json(courier::list_available(&state))
}

async fn accept(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AcceptRequest>,
) -> Result<Json<PickupRequest>, AppError> {
    let request = courier::accept(&state, payload.courier_id, id, payload.vehicle_id)?;
    Ok(Json(request))
}

async fn materialize(
    State(state): State<Arc<AppState>>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<MaterializeRequest>,
) -> Result<Json<Vec<Parcel>>, AppError> {
    let parcels = courier::materialize(&state, payload.courier_id, id, item_id, payload.input)?;
    Ok(Json(parcels))
}

async fn parcel_action(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ParcelActionRequest>,
) -> Result<Json<Parcel>, AppError> {
    let action = payload
        .action
        .parse::<ParcelAction>()
        .map_err(AppError::Validation)?;
    let parcel = courier::parcel_action(
        &state,
        payload.courier_id,
        id,
        action,
        payload.hub_id,
        payload.notes,
    )?;
    Ok(Json(parcel))
}

async fn next_actions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<NextActions>, AppError> {
    Ok(Json(tracking::next_actions(&state, id)?))
}

async fn deliver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DeliverRequest>,
) -> Result<Json<DeliveryReceipt>, AppError> {
    let receipt = proof::finalize(&state, id, payload.courier_id, payload.proof)?;
    Ok(Json(receipt))
}

async fn fail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<FailRequest>,
) -> Result<Json<Parcel>, AppError> {
    let parcel = proof::fail(&state, id, payload.courier_id, &payload.reason)?;
    Ok(Json(parcel))
}
