use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::Json;
use axum::Router;
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::route::{self, RouteStartReport};
use crate::error::AppError;
use crate::models::route::{Route, RouteAssignment};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/routes", post(create_unassigned))
        .route("/routes/today", post(create_or_get_today))
        .route("/routes/:id", get(get_route))
        .route("/routes/:id/accept", post(accept))
        .route("/routes/:id/assignments", post(assign))
        .route("/routes/:id/assignments/:parcel_id", delete(unassign))
        .route("/routes/:id/start", post(start))
        .route("/routes/:id/complete", post(complete))
        .route("/routes/:id/cancel", post(cancel))
}

#[derive(Deserialize)]
pub struct CreateRouteRequest {
    pub hub_id: Uuid,
    pub route_date: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct TodayRouteRequest {
    pub courier_id: Uuid,
    pub hub_id: Uuid,
}

#[derive(Deserialize)]
pub struct AcceptRouteRequest {
    pub courier_id: Uuid,
}

#[derive(Deserialize)]
pub struct AssignRequest {
    pub parcel_id: Uuid,
}

async fn create_unassigned(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateRouteRequest>,
) -> Result<Json<Route>, AppError> {
    let route = route::create_unassigned(&state, payload.hub_id, payload.route_date)?;
    Ok(Json(route))
}

async fn create_or_get_today(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TodayRouteRequest>,
) -> Result<Json<Route>, AppError> {
    let route = route::create_or_get_today(&state, payload.courier_id, payload.hub_id)?;
    Ok(Json(route))
}

async fn get_route(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Route>, AppError> {
    Ok(Json(state.store.routes.get(id)?))
}

async fn accept(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AcceptRouteRequest>,
) -> Result<Json<Route>, AppError> {
    Ok(Json(route::accept(&state, id, payload.courier_id)?))
}

async fn assign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<RouteAssignment>, AppError> {
    Ok(Json(route::assign(&state, payload.parcel_id, id)?))
}

async fn unassign(
    State(state): State<Arc<AppState>>,
    Path((id, parcel_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<RouteAssignment>, AppError> {
    Ok(Json(route::unassign(&state, parcel_id, id)?))
}

async fn start(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RouteStartReport>, AppError> {
    Ok(Json(route::start(&state, id)?))
}

async fn complete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Route>, AppError> {
    Ok(Json(route::complete(&state, id)?))
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Route>, AppError> {
    Ok(Json(route::cancel(&state, id)?))
}
