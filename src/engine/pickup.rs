//! Sender-side pickup cart.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::lifecycle::{self, ActionContext};
use crate::error::AppError;
use crate::models::parcel::{Parcel, ParcelAction};
use crate::models::pickup::{
    ItemStatus, PickupLocation, PickupRequest, PickupRequestItem, PickupStatus, Recipient, Size,
};
use crate::store::{Cas, Store};
use crate::state::AppState;

/// Upper bound on the units of one item; each unit becomes its own parcel.
pub const MAX_ITEM_QUANTITY: u32 = 100;

/// Item fields as submitted by a sender; validated by [`ItemFields::validate`].
#[derive(Debug, Clone, Deserialize)]
pub struct ItemFields {
    pub recipient: Recipient,
    pub estimated_weight: f64,
    pub quantity: i64,
    pub size: String,
}

#[derive(Debug, Clone)]
pub struct ValidItem {
    pub recipient: Recipient,
    pub estimated_weight: f64,
    pub quantity: u32,
    pub size: Size,
}

impl ItemFields {
    pub fn validate(self) -> Result<ValidItem, AppError> {
        if let Some(field) = self.recipient.missing_field() {
            return Err(AppError::Validation(format!("recipient {field} is required")));
        }
        if !self.estimated_weight.is_finite() || self.estimated_weight <= 0.0 {
            return Err(AppError::Validation(
                "estimated_weight must be greater than 0".to_string(),
            ));
        }
        let quantity = u32::try_from(self.quantity)
            .ok()
            .filter(|q| (1..=MAX_ITEM_QUANTITY).contains(q))
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "quantity must be an integer between 1 and {MAX_ITEM_QUANTITY}"
                ))
            })?;
        let size = self.size.parse::<Size>().map_err(AppError::Validation)?;

        Ok(ValidItem {
            recipient: trimmed(self.recipient),
            estimated_weight: self.estimated_weight,
            quantity,
            size,
        })
    }
}

fn trimmed(recipient: Recipient) -> Recipient {
    Recipient {
        name: recipient.name.trim().to_string(),
        phone: recipient.phone.trim().to_string(),
        address: recipient.address.trim().to_string(),
        sub_area: recipient.sub_area.trim().to_string(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PickupRequestView {
    #[serde(flatten)]
    pub request: PickupRequest,
    pub items: Vec<PickupRequestItem>,
}

pub fn get(state: &AppState, request_id: Uuid) -> Result<PickupRequestView, AppError> {
    let request = state.store.pickup_requests.get(request_id)?;
    let items = state.store.items_of(request_id);
    Ok(PickupRequestView { request, items })
}

/// Returns the requester's draft, creating it on first touch.
///
/// Concurrent first touches converge: the loser of the draft key discards its own record
/// and returns the winner's draft.
pub fn get_or_create_draft(
    state: &AppState,
    requester_id: Uuid,
    location: Option<PickupLocation>,
) -> Result<PickupRequest, AppError> {
    let store = &state.store;

    if let Some(existing) = current_draft(store, requester_id) {
        return match location {
            Some(location) => update_location(store, existing.id, location),
            None => Ok(existing),
        };
    }

    let now = Utc::now();
    let draft = PickupRequest {
        id: Uuid::new_v4(),
        requester_id,
        pickup_location: location.clone(),
        status: PickupStatus::Draft,
        assigned_courier: None,
        assigned_vehicle: None,
        created_at: now,
        updated_at: now,
    };
    store.pickup_requests.insert(draft.id, draft.clone())?;

    match store.draft_by_requester.claim(requester_id, draft.id) {
        Ok(Ok(())) => {
            info!(request_id = %draft.id, requester_id = %requester_id, "pickup draft created");
            Ok(draft)
        }
        Ok(Err(winner)) => {
            let _ = store.pickup_requests.remove_if(draft.id, |_| true);
            match location {
                Some(location) => update_location(store, winner, location),
                None => store.pickup_requests.get(winner),
            }
        }
        Err(err) => {
            let _ = store.pickup_requests.remove_if(draft.id, |_| true);
            Err(err)
        }
    }
}

fn current_draft(store: &Store, requester_id: Uuid) -> Option<PickupRequest> {
    store
        .draft_by_requester
        .holder(&requester_id)
        .and_then(|id| store.pickup_requests.find(id))
        .filter(|request| request.status == PickupStatus::Draft)
}

fn update_location(
    store: &Store,
    request_id: Uuid,
    location: PickupLocation,
) -> Result<PickupRequest, AppError> {
    match store.pickup_requests.update_if(
        request_id,
        |request| request.status == PickupStatus::Draft,
        |request| {
            request.pickup_location = Some(location);
            request.updated_at = Utc::now();
        },
    )? {
        Cas::Applied(request) => Ok(request),
        Cas::Rejected(request) => Err(AppError::InvalidState(format!(
            "pickup request {} is {}, not draft",
            request.id, request.status
        ))),
    }
}

/// Loads a request the requester owns and requires it to still be a draft.
fn owned_draft(
    store: &Store,
    requester_id: Uuid,
    request_id: Uuid,
) -> Result<PickupRequest, AppError> {
    let request = store.pickup_requests.get(request_id)?;
    if request.requester_id != requester_id {
        return Err(AppError::AccessDenied(format!(
            "pickup request {request_id} belongs to another sender"
        )));
    }
    if request.status != PickupStatus::Draft {
        return Err(AppError::InvalidState(format!(
            "pickup request {request_id} is {}, not draft",
            request.status
        )));
    }
    Ok(request)
}

pub fn add_item(
    state: &AppState,
    requester_id: Uuid,
    request_id: Uuid,
    fields: ItemFields,
) -> Result<PickupRequestItem, AppError> {
    let store = &state.store;
    owned_draft(store, requester_id, request_id)?;
    let valid = fields.validate()?;

    let now = Utc::now();
    let item = PickupRequestItem {
        id: Uuid::new_v4(),
        request_id,
        recipient: valid.recipient,
        estimated_weight: valid.estimated_weight,
        quantity: valid.quantity,
        size: valid.size,
        status: ItemStatus::Draft,
        parcel_ids: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    store.pickup_items.insert(item.id, item.clone())?;

    // A concurrent submit either confirmed this item or it must be withdrawn.
    let request = store.pickup_requests.get(request_id)?;
    if request.status != PickupStatus::Draft {
        let withdrawn = store
            .pickup_items
            .remove_if(item.id, |row| row.status == ItemStatus::Draft)?;
        if withdrawn.is_some() {
            return Err(AppError::InvalidState(format!(
                "pickup request {request_id} was submitted while the item was being added"
            )));
        }
        return store.pickup_items.get(item.id);
    }

    info!(request_id = %request_id, item_id = %item.id, quantity = item.quantity, "pickup item added");
    Ok(item)
}

pub fn update_item(
    state: &AppState,
    requester_id: Uuid,
    request_id: Uuid,
    item_id: Uuid,
    fields: ItemFields,
) -> Result<PickupRequestItem, AppError> {
    let store = &state.store;
    owned_draft(store, requester_id, request_id)?;
    let valid = fields.validate()?;
    ensure_item_of(store, request_id, item_id)?;

    match store.pickup_items.update_if(
        item_id,
        |item| item.status == ItemStatus::Draft,
        |item| {
            item.recipient = valid.recipient;
            item.estimated_weight = valid.estimated_weight;
            item.quantity = valid.quantity;
            item.size = valid.size;
            item.updated_at = Utc::now();
        },
    )? {
        Cas::Applied(item) => Ok(item),
        Cas::Rejected(_) => Err(AppError::InvalidState(format!(
            "pickup item {item_id} is no longer editable"
        ))),
    }
}

pub fn delete_item(
    state: &AppState,
    requester_id: Uuid,
    request_id: Uuid,
    item_id: Uuid,
) -> Result<(), AppError> {
    let store = &state.store;
    owned_draft(store, requester_id, request_id)?;
    ensure_item_of(store, request_id, item_id)?;

    match store
        .pickup_items
        .remove_if(item_id, |item| item.status == ItemStatus::Draft)?
    {
        Some(_) => {
            info!(request_id = %request_id, item_id = %item_id, "pickup item removed");
            Ok(())
        }
        None => Err(AppError::InvalidState(format!(
            "pickup item {item_id} is no longer editable"
        ))),
    }
}

fn ensure_item_of(store: &Store, request_id: Uuid, item_id: Uuid) -> Result<(), AppError> {
    match store.pickup_items.find(item_id) {
        Some(item) if item.request_id == request_id => Ok(()),
        _ => Err(AppError::NotFound(format!(
            "pickup item {item_id} not found in request {request_id}"
        ))),
    }
}

/// Hands a draft over to couriers: draft -> pending, items draft -> confirmed.
///
/// Items are confirmed before the request flips, and a confirmed item can no longer be
/// deleted, so a request never reaches pending without items.
pub fn submit(
    state: &AppState,
    requester_id: Uuid,
    request_id: Uuid,
) -> Result<PickupRequestView, AppError> {
    let store = &state.store;
    let request = owned_draft(store, requester_id, request_id)?;

    if !request
        .pickup_location
        .as_ref()
        .is_some_and(PickupLocation::is_complete)
    {
        return Err(AppError::IncompleteLocation);
    }

    let confirmed = confirm_draft_items(store, request_id)?;
    if confirmed.is_empty() {
        return Err(AppError::EmptyRequest);
    }

    let submitted = match store.pickup_requests.update_if(
        request_id,
        |r| {
            r.status == PickupStatus::Draft
                && r.pickup_location.as_ref().is_some_and(PickupLocation::is_complete)
        },
        |r| {
            r.status = PickupStatus::Pending;
            r.updated_at = Utc::now();
        },
    ) {
        Ok(Cas::Applied(request)) => request,
        Ok(Cas::Rejected(request)) => {
            restore_items(store, &confirmed, request.status);
            return Err(AppError::InvalidState(format!(
                "pickup request {request_id} is {}, not draft",
                request.status
            )));
        }
        Err(err) => {
            restore_items(store, &confirmed, PickupStatus::Draft);
            return Err(err);
        }
    };

    store.draft_by_requester.release(&requester_id, request_id);

    // Items added while the request was flipping.
    let late = confirm_draft_items(store, request_id)?;

    info!(
        request_id = %request_id,
        items = confirmed.len() + late.len(),
        "pickup request submitted"
    );
    Ok(PickupRequestView {
        request: submitted,
        items: store.items_of(request_id),
    })
}

/// Moves every draft item of the request to confirmed; returns the ids it moved.
fn confirm_draft_items(store: &Store, request_id: Uuid) -> Result<Vec<Uuid>, AppError> {
    let mut confirmed = Vec::new();
    for item in store.items_of(request_id) {
        let outcome = store.pickup_items.update_if(
            item.id,
            |i| i.status == ItemStatus::Draft,
            |i| {
                i.status = ItemStatus::Confirmed;
                i.updated_at = Utc::now();
            },
        )?;
        if matches!(outcome, Cas::Applied(_)) {
            confirmed.push(item.id);
        }
    }
    Ok(confirmed)
}

/// Undoes [`confirm_draft_items`] after the request failed to flip. Items of a request that
/// another submit already moved to pending stay confirmed.
fn restore_items(store: &Store, item_ids: &[Uuid], request_status: PickupStatus) {
    let target = match request_status {
        PickupStatus::Pending => return,
        PickupStatus::Canceled => ItemStatus::Canceled,
        _ => ItemStatus::Draft,
    };

    for item_id in item_ids {
        if let Err(err) = store.pickup_items.update_if(
            *item_id,
            |i| i.status == ItemStatus::Confirmed,
            |i| {
                i.status = target;
                i.updated_at = Utc::now();
            },
        ) {
            error!(item_id = %item_id, error = %err, "failed to restore pickup item");
        }
    }
}

/// Withdraws a request no courier has taken yet.
pub fn cancel(
    state: &AppState,
    requester_id: Uuid,
    request_id: Uuid,
) -> Result<PickupRequestView, AppError> {
    let store = &state.store;
    let request = store.pickup_requests.get(request_id)?;
    if request.requester_id != requester_id {
        return Err(AppError::AccessDenied(format!(
            "pickup request {request_id} belongs to another sender"
        )));
    }

    let canceled = match store.pickup_requests.update_if(
        request_id,
        |r| {
            r.status == PickupStatus::Draft
                || (r.status == PickupStatus::Pending && r.assigned_courier.is_none())
        },
        |r| {
            r.status = PickupStatus::Canceled;
            r.updated_at = Utc::now();
        },
    )? {
        Cas::Applied(request) => request,
        Cas::Rejected(request) => {
            warn!(request_id = %request_id, status = %request.status, "pickup cancel refused");
            return Err(AppError::InvalidState(format!(
                "pickup request {request_id} is {} and can no longer be canceled",
                request.status
            )));
        }
    };

    store.draft_by_requester.release(&requester_id, request_id);
    for item in store.items_of(request_id) {
        store.pickup_items.update_if(
            item.id,
            |i| matches!(i.status, ItemStatus::Draft | ItemStatus::Confirmed),
            |i| {
                i.status = ItemStatus::Canceled;
                i.updated_at = Utc::now();
            },
        )?;
    }

    info!(request_id = %request_id, "pickup request canceled");
    Ok(PickupRequestView {
        request: canceled,
        items: store.items_of(request_id),
    })
}

/// Sender-initiated cancellation of a parcel that has not reached a terminal status.
pub fn cancel_parcel(
    state: &AppState,
    requester_id: Uuid,
    parcel_id: Uuid,
    reason: Option<String>,
) -> Result<Parcel, AppError> {
    let parcel = state.store.parcels.get(parcel_id)?;
    if parcel.sender.id != requester_id {
        return Err(AppError::AccessDenied(format!(
            "parcel {parcel_id} belongs to another sender"
        )));
    }

    let ctx = ActionContext::default().with_notes(reason);
    lifecycle::apply(state, parcel_id, ParcelAction::Cancel, &ctx)
}
