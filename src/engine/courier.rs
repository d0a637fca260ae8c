//! Courier side of pickups: claiming a pending request, binding a vehicle, and turning
//! confirmed items into parcels.

use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::lifecycle::{self, ActionContext, NewParcel};
use crate::engine::pickup::PickupRequestView;
use crate::engine::proof;
use crate::error::AppError;
use crate::models::parcel::{Parcel, ParcelAction, SenderSnapshot};
use crate::models::pickup::{ItemStatus, PickupRequest, PickupStatus, Recipient, Size};
use crate::models::vehicle::Vehicle;
use crate::observability::metrics::outcome;
use crate::store::{Cas, Store};
use crate::state::AppState;

/// Pending requests no courier has claimed yet, oldest first.
pub fn list_available(state: &AppState) -> Vec<PickupRequestView> {
    let store = &state.store;
    let mut requests = store.pickup_requests.filter(|request| {
        request.status == PickupStatus::Pending && request.assigned_courier.is_none()
    });
    requests.sort_by_key(|request| request.created_at);

    requests
        .into_iter()
        .map(|request| PickupRequestView {
            items: store.items_of(request.id),
            request,
        })
        .collect()
}

/// Claims a pending request for `courier_id` and binds `vehicle_id` to the courier.
///
/// The request claim is a single conditional write, so of two racing couriers exactly one
/// wins and the other sees `NotPending`. A vehicle held by someone else undoes the claim.
pub fn accept(
    state: &AppState,
    courier_id: Uuid,
    request_id: Uuid,
    vehicle_id: Uuid,
) -> Result<PickupRequest, AppError> {
    let result = claim_request(state, courier_id, request_id, vehicle_id);
    state
        .metrics
        .pickup_accepts_total
        .with_label_values(&[outcome(result.is_ok())])
        .inc();

    match &result {
        Ok(_) => info!(
            request_id = %request_id,
            courier_id = %courier_id,
            vehicle_id = %vehicle_id,
            "pickup request accepted"
        ),
        Err(err) => warn!(
            request_id = %request_id,
            courier_id = %courier_id,
            error = %err,
            "pickup acceptance rejected"
        ),
    }

    result
}

fn claim_request(
    state: &AppState,
    courier_id: Uuid,
    request_id: Uuid,
    vehicle_id: Uuid,
) -> Result<PickupRequest, AppError> {
    let store = &state.store;
    let courier = store.couriers.get(courier_id)?;
    if !courier.active {
        return Err(AppError::InvalidState(format!(
            "courier {courier_id} is not active"
        )));
    }
    store.vehicles.get(vehicle_id)?;

    let now = Utc::now();
    let claimed = match store.pickup_requests.update_if(
        request_id,
        |r| r.status == PickupStatus::Pending && r.assigned_courier.is_none(),
        |r| {
            r.status = PickupStatus::Assigned;
            r.assigned_courier = Some(courier_id);
            r.assigned_vehicle = Some(vehicle_id);
            r.updated_at = now;
        },
    )? {
        Cas::Applied(request) => request,
        Cas::Rejected(_) => return Err(AppError::NotPending(request_id.to_string())),
    };

    let bind = store.vehicles.update_if(
        vehicle_id,
        |v| v.is_free_for(courier_id),
        |v| {
            v.assigned_courier = Some(courier_id);
            v.updated_at = now;
        },
    );

    match bind {
        Ok(Cas::Applied(_)) => Ok(claimed),
        Ok(Cas::Rejected(_)) => {
            unclaim_request(store, courier_id, request_id);
            Err(AppError::VehicleConflict(vehicle_id.to_string()))
        }
        Err(err) => {
            unclaim_request(store, courier_id, request_id);
            Err(err)
        }
    }
}

fn unclaim_request(store: &Store, courier_id: Uuid, request_id: Uuid) {
    let outcome = store.pickup_requests.update_if(
        request_id,
        |r| r.status == PickupStatus::Assigned && r.assigned_courier == Some(courier_id),
        |r| {
            r.status = PickupStatus::Pending;
            r.assigned_courier = None;
            r.assigned_vehicle = None;
            r.updated_at = Utc::now();
        },
    );

    match outcome {
        Ok(Cas::Applied(_)) => info!(request_id = %request_id, "pickup claim released"),
        Ok(Cas::Rejected(request)) => error!(
            request_id = %request_id,
            status = %request.status,
            "pickup claim changed before release"
        ),
        Err(err) => error!(request_id = %request_id, error = %err, "pickup claim release failed"),
    }
}

/// Unbinds a vehicle from the courier currently holding it.
pub fn release_vehicle(
    state: &AppState,
    courier_id: Uuid,
    vehicle_id: Uuid,
) -> Result<Vehicle, AppError> {
    match state.store.vehicles.update_if(
        vehicle_id,
        |v| v.assigned_courier == Some(courier_id),
        |v| {
            v.assigned_courier = None;
            v.updated_at = Utc::now();
        },
    )? {
        Cas::Applied(vehicle) => {
            info!(vehicle_id = %vehicle_id, courier_id = %courier_id, "vehicle released");
            Ok(vehicle)
        }
        Cas::Rejected(_) => Err(AppError::AccessDenied(format!(
            "vehicle {vehicle_id} is not held by courier {courier_id}"
        ))),
    }
}

/// What the courier observed when collecting an item.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParcelInput {
    /// Measured weight per unit; defaults to the sender's estimate.
    pub weight_grams: Option<u32>,
    pub size: Option<String>,
    /// Corrected recipient details, if the label differed from the request.
    pub recipient: Option<Recipient>,
    #[serde(default)]
    pub declared_value: f64,
    pub origin_hub: Option<Uuid>,
    pub dest_hub: Option<Uuid>,
}

/// Materializes one confirmed item into `quantity` parcels.
pub fn materialize(
    state: &AppState,
    courier_id: Uuid,
    request_id: Uuid,
    item_id: Uuid,
    input: ParcelInput,
) -> Result<Vec<Parcel>, AppError> {
    let store = &state.store;
    let request = store.pickup_requests.get(request_id)?;
    if request.assigned_courier != Some(courier_id) {
        return Err(AppError::AccessDenied(format!(
            "pickup request {request_id} is not assigned to courier {courier_id}"
        )));
    }
    if !request.is_open_for(courier_id) {
        return Err(AppError::InvalidState(format!(
            "pickup request {request_id} is {}",
            request.status
        )));
    }
    let location = request
        .pickup_location
        .clone()
        .ok_or(AppError::IncompleteLocation)?;

    let item = store
        .pickup_items
        .find(item_id)
        .filter(|item| item.request_id == request_id)
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "pickup item {item_id} not found in request {request_id}"
            ))
        })?;

    let recipient = match input.recipient {
        Some(recipient) => {
            if let Some(field) = recipient.missing_field() {
                return Err(AppError::Validation(format!(
                    "recipient {field} is required"
                )));
            }
            recipient
        }
        None => item.recipient.clone(),
    };
    let size = match input.size.as_deref() {
        Some(raw) => raw.parse::<Size>().map_err(AppError::Validation)?,
        None => item.size,
    };
    let weight_grams = match input.weight_grams {
        Some(0) => {
            return Err(AppError::Validation(
                "weight_grams must be greater than 0".to_string(),
            ));
        }
        Some(weight) => weight,
        None => item.estimated_weight.round().max(1.0) as u32,
    };
    if !input.declared_value.is_finite() || input.declared_value < 0.0 {
        return Err(AppError::Validation(
            "declared_value must be a non-negative number".to_string(),
        ));
    }
    let origin_hub = hub_for(store, input.origin_hub, &location.sub_area)?;
    let dest_hub = hub_for(store, input.dest_hub, &recipient.sub_area)?;

    match store.pickup_items.update_if(
        item_id,
        |i| i.status == ItemStatus::Confirmed,
        |i| {
            i.status = ItemStatus::ParcelCreated;
            i.updated_at = Utc::now();
        },
    )? {
        Cas::Applied(_) => {}
        Cas::Rejected(observed) => {
            return Err(AppError::InvalidState(format!(
                "pickup item {item_id} is {}, not confirmed",
                observed.status
            )));
        }
    }

    let sender = SenderSnapshot {
        id: request.requester_id,
        name: location.contact_name.clone(),
        phone: location.contact_phone.clone(),
    };

    let mut parcels = Vec::new();
    for _ in 0..item.quantity {
        let created = lifecycle::create_parcel(
            state,
            NewParcel {
                sender: sender.clone(),
                recipient: recipient.clone(),
                pickup_location: location.clone(),
                origin_hub,
                dest_hub,
                weight_grams,
                declared_value: input.declared_value,
                size,
                pickup_item_id: Some(item_id),
                courier_id,
            },
        );

        match created {
            Ok(parcel) => parcels.push(parcel),
            Err(err) => {
                roll_back_materialization(state, courier_id, item_id, &parcels);
                return Err(err);
            }
        }
    }

    let parcel_ids: Vec<Uuid> = parcels.iter().map(|parcel| parcel.id).collect();
    store.pickup_items.update_if(
        item_id,
        |i| i.status == ItemStatus::ParcelCreated,
        |i| i.parcel_ids = parcel_ids,
    )?;

    advance_request(store, request_id);

    info!(
        request_id = %request_id,
        item_id = %item_id,
        parcels = parcels.len(),
        "pickup item materialized"
    );
    Ok(parcels)
}

fn hub_for(store: &Store, explicit: Option<Uuid>, sub_area: &str) -> Result<Uuid, AppError> {
    if let Some(hub_id) = explicit {
        return store.hubs.get(hub_id).map(|hub| hub.id);
    }

    let mut candidates = store.hubs.filter(|hub| hub.serves(sub_area));
    candidates.sort_by_key(|hub| hub.created_at);
    candidates
        .first()
        .map(|hub| hub.id)
        .ok_or_else(|| AppError::Validation(format!("no hub serves sub-area {sub_area}")))
}

fn roll_back_materialization(state: &AppState, courier_id: Uuid, item_id: Uuid, created: &[Parcel]) {
    let ctx = ActionContext::courier(courier_id)
        .with_notes(Some("materialization rolled back".to_string()));
    for parcel in created {
        if let Err(err) = lifecycle::apply(state, parcel.id, ParcelAction::Cancel, &ctx) {
            error!(parcel_id = %parcel.id, error = %err, "failed to cancel partial parcel");
        }
    }

    if let Err(err) = state.store.pickup_items.update_if(
        item_id,
        |i| i.status == ItemStatus::ParcelCreated,
        |i| {
            i.status = ItemStatus::Confirmed;
            i.updated_at = Utc::now();
        },
    ) {
        error!(item_id = %item_id, error = %err, "failed to restore pickup item");
    }
}

/// assigned -> in_progress on the first parcel, -> completed once nothing is left to collect.
fn advance_request(store: &Store, request_id: Uuid) {
    let now = Utc::now();
    if let Err(err) = store.pickup_requests.update_if(
        request_id,
        |r| r.status == PickupStatus::Assigned,
        |r| {
            r.status = PickupStatus::InProgress;
            r.updated_at = now;
        },
    ) {
        error!(request_id = %request_id, error = %err, "failed to mark pickup request in progress");
    }

    let outstanding = store
        .items_of(request_id)
        .iter()
        .any(|item| item.status == ItemStatus::Confirmed);
    if outstanding {
        return;
    }

    match store.pickup_requests.update_if(
        request_id,
        |r| r.status == PickupStatus::InProgress,
        |r| {
            r.status = PickupStatus::Completed;
            r.updated_at = now;
        },
    ) {
        Ok(Cas::Applied(_)) => info!(request_id = %request_id, "pickup request completed"),
        Ok(Cas::Rejected(_)) => {}
        Err(err) => {
            error!(request_id = %request_id, error = %err, "failed to complete pickup request")
        }
    }
}

/// A lifecycle action issued from the courier app.
///
/// Delivery needs a proof and goes through the delivery finalizer instead; cancellation
/// belongs to the sender.
pub fn parcel_action(
    state: &AppState,
    courier_id: Uuid,
    parcel_id: Uuid,
    action: ParcelAction,
    hub_id: Option<Uuid>,
    notes: Option<String>,
) -> Result<Parcel, AppError> {
    match action {
        ParcelAction::Deliver => {
            return Err(AppError::Validation(
                "deliver requires a proof of delivery".to_string(),
            ));
        }
        ParcelAction::Cancel => {
            return Err(AppError::AccessDenied(
                "couriers cannot cancel parcels".to_string(),
            ));
        }
        _ => {}
    }

    let courier = state.store.couriers.get(courier_id)?;
    if !courier.active {
        return Err(AppError::InvalidState(format!(
            "courier {courier_id} is not active"
        )));
    }
    proof::authorize_courier(&state.store, parcel_id, courier_id)?;

    let mut ctx = ActionContext::courier(courier_id).with_notes(notes);
    ctx.hub_id = hub_id;
    lifecycle::apply(state, parcel_id, action, &ctx)
}
