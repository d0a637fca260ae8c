//! Read-only views: public tracking and courier next-action hints.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::parcel::{ParcelAction, ParcelStatus};
use crate::models::scan::ScanEventType;
use crate::store::Store;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct HubSummary {
    pub id: Uuid,
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackingEvent {
    pub event_type: ScanEventType,
    pub event_time: DateTime<Utc>,
    pub hub: Option<HubSummary>,
    pub courier_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackingView {
    pub tracking_code: String,
    pub status: ParcelStatus,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub sla_due_at: Option<DateTime<Utc>>,
    pub sender_name: String,
    pub recipient_name: String,
    pub recipient_address: String,
    pub origin_hub: Option<HubSummary>,
    pub dest_hub: Option<HubSummary>,
    pub weight_grams: u32,
    pub events: Vec<TrackingEvent>,
}

fn hub_summary(store: &Store, hub_id: Uuid) -> Option<HubSummary> {
    store.hubs.find(hub_id).map(|hub| HubSummary {
        id: hub.id,
        name: hub.name,
        address: hub.address,
    })
}

pub fn lookup(state: &AppState, tracking_code: &str) -> Result<TrackingView, AppError> {
    let store = &state.store;
    let code = tracking_code.trim().to_ascii_uppercase();
    let parcel = store
        .parcel_by_tracking_code
        .holder(&code)
        .and_then(|id| store.parcels.find(id))
        .ok_or_else(|| AppError::NotFound(format!("tracking code {code} not found")))?;

    let events = store
        .scan_history(parcel.id)
        .into_iter()
        .map(|event| TrackingEvent {
            event_type: event.event_type,
            event_time: event.event_time,
            hub: event.hub_id.and_then(|hub_id| hub_summary(store, hub_id)),
            courier_id: event.courier_id,
            notes: event.notes,
        })
        .collect();

    Ok(TrackingView {
        tracking_code: parcel.tracking_code,
        status: parcel.status,
        created_at: parcel.created_at,
        delivered_at: parcel.delivered_at,
        sla_due_at: parcel.sla_due_at,
        sender_name: parcel.sender.name,
        recipient_name: parcel.recipient.name,
        recipient_address: parcel.recipient.address,
        origin_hub: hub_summary(store, parcel.origin_hub),
        dest_hub: hub_summary(store, parcel.dest_hub),
        weight_grams: parcel.weight_grams,
        events,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct NextActions {
    pub parcel_id: Uuid,
    pub status: ParcelStatus,
    pub actions: Vec<ParcelAction>,
    pub on_route: Option<Uuid>,
}

pub fn next_actions(state: &AppState, parcel_id: Uuid) -> Result<NextActions, AppError> {
    let parcel = state.store.parcels.get(parcel_id)?;
    Ok(NextActions {
        parcel_id,
        status: parcel.status,
        actions: parcel.status.next_actions().to_vec(),
        on_route: state
            .store
            .active_assignment(parcel_id)
            .map(|assignment| assignment.route_id),
    })
}
