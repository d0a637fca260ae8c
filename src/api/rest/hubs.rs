use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::hub::{self, HubAction};
use crate::error::AppError;
use crate::models::parcel::Parcel;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/hubs/:hub_id/parcels/:parcel_id/process", post(process))
}

#[derive(Deserialize)]
pub struct ProcessRequest {
    pub staff_id: Uuid,
    pub action: String,
    pub notes: Option<String>,
}

async fn process(
    State(state): State<Arc<AppState>>,
    Path((hub_id, parcel_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<ProcessRequest>,
) -> Result<Json<Parcel>, AppError> {
    let action = payload.action.parse::<HubAction>()?;
    let parcel = hub::process(
        &state,
        payload.staff_id,
        hub_id,
        parcel_id,
        action,
        payload.notes,
    )?;
    Ok(Json(parcel))
}
