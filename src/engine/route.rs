//! Courier delivery routes and the parcels bound to them.

use std::time::Instant;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::lifecycle::{self, ActionContext};
use crate::error::AppError;
use crate::models::parcel::{ParcelAction, ParcelStatus};
use crate::models::route::{Route, RouteAssignment, RouteStatus};
use crate::store::{Cas, Store};
use crate::state::AppState;

/// The courier's route for today at `hub_id`, created on first request.
pub fn create_or_get_today(
    state: &AppState,
    courier_id: Uuid,
    hub_id: Uuid,
) -> Result<Route, AppError> {
    let store = &state.store;
    store.couriers.get(courier_id)?;
    store.hubs.get(hub_id)?;
    let today = Utc::now().date_naive();

    if let Some(existing) = store.route_by_courier_day.holder(&(courier_id, today)) {
        return route_at_hub(store, existing, hub_id);
    }

    let route = new_route(hub_id, Some(courier_id), today);
    store.routes.insert(route.id, route.clone())?;

    match store.route_by_courier_day.claim((courier_id, today), route.id) {
        Ok(Ok(())) => {
            info!(route_id = %route.id, courier_id = %courier_id, hub_id = %hub_id, "route created");
            Ok(route)
        }
        Ok(Err(winner)) => {
            let _ = store.routes.remove_if(route.id, |_| true);
            route_at_hub(store, winner, hub_id)
        }
        Err(err) => {
            let _ = store.routes.remove_if(route.id, |_| true);
            Err(err)
        }
    }
}

fn route_at_hub(store: &Store, route_id: Uuid, hub_id: Uuid) -> Result<Route, AppError> {
    let route = store.routes.get(route_id)?;
    if route.hub_id != hub_id {
        return Err(AppError::Conflict(format!(
            "courier already runs route {route_id} from hub {} today",
            route.hub_id
        )));
    }
    Ok(route)
}

fn new_route(hub_id: Uuid, courier_id: Option<Uuid>, route_date: NaiveDate) -> Route {
    Route {
        id: Uuid::new_v4(),
        courier_id,
        hub_id,
        route_date,
        status: RouteStatus::Planned,
        created_at: Utc::now(),
        started_at: None,
        ended_at: None,
    }
}

/// A planned route with no courier yet, for a hub to fill and offer.
pub fn create_unassigned(
    state: &AppState,
    hub_id: Uuid,
    route_date: Option<NaiveDate>,
) -> Result<Route, AppError> {
    state.store.hubs.get(hub_id)?;
    let route = new_route(hub_id, None, route_date.unwrap_or_else(|| Utc::now().date_naive()));
    let route = state.store.routes.insert(route.id, route)?;
    info!(route_id = %route.id, hub_id = %hub_id, "unassigned route created");
    Ok(route)
}

/// Binds an unassigned route to a courier who has no other route that day.
pub fn accept(state: &AppState, route_id: Uuid, courier_id: Uuid) -> Result<Route, AppError> {
    let store = &state.store;
    store.couriers.get(courier_id)?;
    let route = store.routes.get(route_id)?;
    if route.courier_id.is_some() {
        return Err(AppError::Conflict(format!(
            "route {route_id} already has a courier"
        )));
    }

    let day_key = (courier_id, route.route_date);
    if let Err(other) = store.route_by_courier_day.claim(day_key, route_id)? {
        return Err(AppError::Conflict(format!(
            "courier {courier_id} already runs route {other} on {}",
            route.route_date
        )));
    }

    match store.routes.update_if(
        route_id,
        |r| r.courier_id.is_none() && r.status == RouteStatus::Planned,
        |r| r.courier_id = Some(courier_id),
    ) {
        Ok(Cas::Applied(route)) => {
            info!(route_id = %route_id, courier_id = %courier_id, "route accepted");
            Ok(route)
        }
        Ok(Cas::Rejected(_)) => {
            store.route_by_courier_day.release(&day_key, route_id);
            Err(AppError::Conflict(format!(
                "route {route_id} is no longer open for acceptance"
            )))
        }
        Err(err) => {
            store.route_by_courier_day.release(&day_key, route_id);
            Err(err)
        }
    }
}

/// Binds a parcel to a route. The parcel's active-assignment key is the only guard:
/// a parcel already on a route is refused, never moved.
pub fn assign(
    state: &AppState,
    parcel_id: Uuid,
    route_id: Uuid,
) -> Result<RouteAssignment, AppError> {
    let store = &state.store;
    let route = store.routes.get(route_id)?;
    if !route.status.accepts_parcels() {
        return Err(AppError::InvalidState(format!(
            "route {route_id} is {}",
            route.status
        )));
    }
    let parcel = store.parcels.get(parcel_id)?;
    if parcel.status.is_terminal() {
        return Err(AppError::InvalidState(format!(
            "parcel {parcel_id} is {}",
            parcel.status
        )));
    }
    if parcel.dest_hub != route.hub_id {
        return Err(AppError::Validation(format!(
            "parcel {parcel_id} is destined for hub {}, route {route_id} runs from hub {}",
            parcel.dest_hub, route.hub_id
        )));
    }

    let assignment = RouteAssignment {
        id: Uuid::new_v4(),
        route_id,
        parcel_id,
        active: true,
        assigned_at: Utc::now(),
        released_at: None,
    };

    if let Err(holder) = store
        .active_assignment_by_parcel
        .claim(parcel_id, assignment.id)?
    {
        warn!(parcel_id = %parcel_id, route_id = %route_id, holder = %holder, "parcel already on a route");
        return Err(AppError::AlreadyAssigned(parcel_id.to_string()));
    }

    if let Err(err) = store.route_assignments.insert(assignment.id, assignment.clone()) {
        store
            .active_assignment_by_parcel
            .release(&parcel_id, assignment.id);
        return Err(err);
    }

    info!(parcel_id = %parcel_id, route_id = %route_id, "parcel assigned to route");
    Ok(assignment)
}

/// Takes a parcel off a route before it leaves the hub.
pub fn unassign(
    state: &AppState,
    parcel_id: Uuid,
    route_id: Uuid,
) -> Result<RouteAssignment, AppError> {
    let store = &state.store;
    let assignment = store
        .active_assignment(parcel_id)
        .filter(|a| a.route_id == route_id)
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "parcel {parcel_id} has no active assignment on route {route_id}"
            ))
        })?;

    let parcel = store.parcels.get(parcel_id)?;
    if parcel.status == ParcelStatus::OutForDelivery {
        return Err(AppError::InvalidState(format!(
            "parcel {parcel_id} is already out for delivery"
        )));
    }

    release_assignment(store, &assignment)?.ok_or_else(|| {
        AppError::Conflict(format!("assignment {} was already released", assignment.id))
    })
}

fn release_assignment(
    store: &Store,
    assignment: &RouteAssignment,
) -> Result<Option<RouteAssignment>, AppError> {
    match store.route_assignments.update_if(
        assignment.id,
        |a| a.active,
        |a| {
            a.active = false;
            a.released_at = Some(Utc::now());
        },
    )? {
        Cas::Applied(released) => {
            store
                .active_assignment_by_parcel
                .release(&assignment.parcel_id, assignment.id);
            Ok(Some(released))
        }
        Cas::Rejected(_) => Ok(None),
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Advanced,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParcelStartResult {
    pub parcel_id: Uuid,
    pub success: bool,
    pub outcome: StartOutcome,
    pub status: Option<ParcelStatus>,
    pub kind: Option<&'static str>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteStartReport {
    pub route: Route,
    pub parcels: Vec<ParcelStartResult>,
}

/// Puts a planned route on the road and sends its hub-ready parcels out for delivery.
///
/// Each parcel is moved independently; one refusal does not hold back the rest.
pub fn start(state: &AppState, route_id: Uuid) -> Result<RouteStartReport, AppError> {
    let timer = Instant::now();
    let store = &state.store;

    let route = match store.routes.update_if(
        route_id,
        |r| r.status == RouteStatus::Planned && r.courier_id.is_some(),
        |r| {
            r.status = RouteStatus::OutForDelivery;
            r.started_at = Some(Utc::now());
        },
    )? {
        Cas::Applied(route) => route,
        Cas::Rejected(route) if route.courier_id.is_none() => {
            return Err(AppError::InvalidState(format!(
                "route {route_id} has no courier"
            )));
        }
        Cas::Rejected(route) => {
            return Err(AppError::InvalidState(format!(
                "route {route_id} is {}, not planned",
                route.status
            )));
        }
    };

    let mut ctx = ActionContext::default().at_hub(route.hub_id);
    ctx.courier_id = route.courier_id;

    let parcels = store
        .active_assignments_of_route(route_id)
        .into_iter()
        .map(|assignment| start_parcel(state, assignment.parcel_id, &ctx))
        .collect::<Vec<_>>();

    state
        .metrics
        .route_start_latency_seconds
        .observe(timer.elapsed().as_secs_f64());
    info!(
        route_id = %route_id,
        advanced = parcels.iter().filter(|p| p.outcome == StartOutcome::Advanced).count(),
        failed = parcels.iter().filter(|p| p.outcome == StartOutcome::Failed).count(),
        "route started"
    );

    Ok(RouteStartReport { route, parcels })
}

fn start_parcel(state: &AppState, parcel_id: Uuid, ctx: &ActionContext) -> ParcelStartResult {
    let current = match state.store.parcels.get(parcel_id) {
        Ok(parcel) => parcel,
        Err(err) => return failed(parcel_id, None, err),
    };

    if current.status != ParcelStatus::AtDestHub {
        return ParcelStartResult {
            parcel_id,
            success: false,
            outcome: StartOutcome::Skipped,
            status: Some(current.status),
            kind: None,
            message: Some(format!("parcel is {}, not at_dest_hub", current.status)),
        };
    }

    match lifecycle::apply(state, parcel_id, ParcelAction::PrepareForDelivery, ctx) {
        Ok(parcel) => ParcelStartResult {
            parcel_id,
            success: true,
            outcome: StartOutcome::Advanced,
            status: Some(parcel.status),
            kind: None,
            message: None,
        },
        Err(err) => failed(parcel_id, Some(current.status), err),
    }
}

fn failed(parcel_id: Uuid, status: Option<ParcelStatus>, err: AppError) -> ParcelStartResult {
    ParcelStartResult {
        parcel_id,
        success: false,
        outcome: StartOutcome::Failed,
        status,
        kind: Some(err.kind().as_str()),
        message: Some(err.to_string()),
    }
}

/// Closes a route once no parcel on it is still out for delivery. Parcels left on the
/// route are released so they can be routed again.
pub fn complete(state: &AppState, route_id: Uuid) -> Result<Route, AppError> {
    let store = &state.store;
    if has_parcel_out(store, &store.active_assignments_of_route(route_id)) {
        return Err(AppError::InvalidState(format!(
            "route {route_id} still has parcels out for delivery"
        )));
    }

    let route = match store.routes.update_if(
        route_id,
        |r| r.status == RouteStatus::OutForDelivery,
        |r| {
            r.status = RouteStatus::Completed;
            r.ended_at = Some(Utc::now());
        },
    )? {
        Cas::Applied(route) => route,
        Cas::Rejected(route) => {
            return Err(AppError::InvalidState(format!(
                "route {route_id} is {}, not out_for_delivery",
                route.status
            )));
        }
    };

    // A retried delivery may have gone back out after the first check.
    let assignments = store.active_assignments_of_route(route_id);
    if has_parcel_out(store, &assignments) {
        reopen(store, route_id);
        return Err(AppError::InvalidState(format!(
            "route {route_id} still has parcels out for delivery"
        )));
    }

    for assignment in &assignments {
        release_assignment(store, assignment)?;
    }

    info!(route_id = %route_id, released = assignments.len(), "route completed");
    Ok(route)
}

fn has_parcel_out(store: &Store, assignments: &[RouteAssignment]) -> bool {
    assignments.iter().any(|a| {
        store
            .parcels
            .find(a.parcel_id)
            .is_some_and(|p| p.status == ParcelStatus::OutForDelivery)
    })
}

fn reopen(store: &Store, route_id: Uuid) {
    match store.routes.update_if(
        route_id,
        |r| r.status == RouteStatus::Completed,
        |r| {
            r.status = RouteStatus::OutForDelivery;
            r.ended_at = None;
        },
    ) {
        Ok(Cas::Applied(_)) => warn!(route_id = %route_id, "route completion rolled back"),
        Ok(Cas::Rejected(observed)) => {
            error!(route_id = %route_id, status = %observed.status, "route moved on before rollback")
        }
        Err(err) => error!(route_id = %route_id, error = %err, "route rollback failed"),
    }
}

/// Abandons a route that never left the hub.
pub fn cancel(state: &AppState, route_id: Uuid) -> Result<Route, AppError> {
    let store = &state.store;
    let route = match store.routes.update_if(
        route_id,
        |r| r.status == RouteStatus::Planned,
        |r| {
            r.status = RouteStatus::Canceled;
            r.ended_at = Some(Utc::now());
        },
    )? {
        Cas::Applied(route) => route,
        Cas::Rejected(route) => {
            return Err(AppError::InvalidState(format!(
                "route {route_id} is {}, not planned",
                route.status
            )));
        }
    };

    for assignment in store.active_assignments_of_route(route_id) {
        release_assignment(store, &assignment)?;
    }
    if let Some(courier_id) = route.courier_id {
        store
            .route_by_courier_day
            .release(&(courier_id, route.route_date), route_id);
    }

    info!(route_id = %route_id, "route canceled");
    Ok(route)
}
