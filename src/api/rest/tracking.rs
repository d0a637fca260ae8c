use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::Json;
use axum::Router;

use crate::engine::tracking::{self, TrackingView};
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/tracking/:code", get(track))
}

async fn track(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<TrackingView>, AppError> {
    Ok(Json(tracking::lookup(&state, &code)?))
}
