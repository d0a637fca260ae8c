use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::pickup::{self, ItemFields, PickupRequestView};
use crate::error::AppError;
use crate::models::parcel::Parcel;
use crate::models::pickup::{PickupLocation, PickupRequest, PickupRequestItem};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/pickups/draft", post(draft))
        .route("/pickups/:id", get(get_request))
        .route("/pickups/:id/items", post(add_item))
        .route(
            "/pickups/:id/items/:item_id",
            patch(update_item).delete(delete_item),
        )
        .route("/pickups/:id/submit", post(submit))
        .route("/pickups/:id/cancel", post(cancel))
        .route("/parcels/:id/cancel", post(cancel_parcel))
}

/// Every sender-side call names the requester; ownership is checked against it.
#[derive(Deserialize)]
pub struct RequesterRef {
    pub requester_id: Uuid,
}

#[derive(Deserialize)]
pub struct DraftRequest {
    pub requester_id: Uuid,
    pub pickup_location: Option<PickupLocation>,
}

#[derive(Deserialize)]
pub struct ItemRequest {
    pub requester_id: Uuid,
    #[serde(flatten)]
    pub fields: ItemFields,
}

#[derive(Deserialize)]
pub struct CancelParcelRequest {
    pub requester_id: Uuid,
    pub reason: Option<String>,
}

async fn draft(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DraftRequest>,
) -> Result<Json<PickupRequest>, AppError> {
    let request =
        pickup::get_or_create_draft(&state, payload.requester_id, payload.pickup_location)?;
    Ok(Json(request))
}

async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<PickupRequestView>, AppError> {
    Ok(Json(pickup::get(&state, id)?))
}

async fn add_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ItemRequest>,
) -> Result<Json<PickupRequestItem>, AppError> {
    let item = pickup::add_item(&state, payload.requester_id, id, payload.fields)?;
    Ok(Json(item))
}

async fn update_item(
    State(state): State<Arc<AppState>>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<ItemRequest>,
) -> Result<Json<PickupRequestItem>, AppError> {
    let item = pickup::update_item(&state, payload.requester_id, id, item_id, payload.fields)?;
    Ok(Json(item))
}

async fn delete_item(
    State(state): State<Arc<AppState>>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    Query(requester): Query<RequesterRef>,
) -> Result<Json<PickupRequestView>, AppError> {
    pickup::delete_item(&state, requester.requester_id, id, item_id)?;
    Ok(Json(pickup::get(&state, id)?))
}

async fn submit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RequesterRef>,
) -> Result<Json<PickupRequestView>, AppError> {
    Ok(Json(pickup::submit(&state, payload.requester_id, id)?))
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RequesterRef>,
) -> Result<Json<PickupRequestView>, AppError> {
    Ok(Json(pickup::cancel(&state, payload.requester_id, id)?))
}

async fn cancel_parcel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelParcelRequest>,
) -> Result<Json<Parcel>, AppError> {
    let parcel = pickup::cancel_parcel(&state, payload.requester_id, id, payload.reason)?;
    Ok(Json(parcel))
}
