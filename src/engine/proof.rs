//! Closing the delivery loop: proof plus terminal transition, or a recorded failure.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::engine::lifecycle::{self, ActionContext};
use crate::error::AppError;
use crate::models::parcel::{Parcel, ParcelAction, ParcelStatus};
use crate::models::proof::{DropoffLocation, ProofOfDelivery};
use crate::store::Store;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct ProofFields {
    pub recipient_name: String,
    pub signature_ref: Option<String>,
    pub photo_ref: Option<String>,
    pub dropoff_location: Option<DropoffLocation>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReceipt {
    pub parcel: Parcel,
    pub proof: ProofOfDelivery,
}

/// Records proof of delivery and marks the parcel delivered. If the transition fails the
/// proof is withdrawn, so a proof exists exactly when the parcel is delivered.
pub fn finalize(
    state: &AppState,
    parcel_id: Uuid,
    courier_id: Uuid,
    fields: ProofFields,
) -> Result<DeliveryReceipt, AppError> {
    let result = deliver(state, parcel_id, courier_id, fields);
    let label = if result.is_ok() { "delivered" } else { "error" };
    state.metrics.deliveries_total.with_label_values(&[label]).inc();
    result
}

fn deliver(
    state: &AppState,
    parcel_id: Uuid,
    courier_id: Uuid,
    fields: ProofFields,
) -> Result<DeliveryReceipt, AppError> {
    let store = &state.store;
    if fields.recipient_name.trim().is_empty() {
        return Err(AppError::Validation("recipient_name is required".to_string()));
    }
    let has_ref = |r: &Option<String>| r.as_deref().is_some_and(|s| !s.trim().is_empty());
    if !has_ref(&fields.signature_ref) && !has_ref(&fields.photo_ref) {
        return Err(AppError::Validation(
            "a signature_ref or photo_ref is required".to_string(),
        ));
    }

    let parcel = store.parcels.get(parcel_id)?;
    if parcel.status != ParcelStatus::OutForDelivery {
        return Err(AppError::illegal(ParcelAction::Deliver, parcel.status));
    }
    authorize_courier(store, parcel_id, courier_id)?;

    let proof = ProofOfDelivery {
        id: Uuid::new_v4(),
        parcel_id,
        courier_id,
        recipient_name: fields.recipient_name.trim().to_string(),
        signed_at: Utc::now(),
        signature_ref: fields.signature_ref,
        photo_ref: fields.photo_ref,
        dropoff_location: fields.dropoff_location,
        notes: fields.notes.clone(),
    };

    if store.proof_by_parcel.claim(parcel_id, proof.id)?.is_err() {
        return Err(AppError::Conflict(format!(
            "proof of delivery already recorded for parcel {parcel_id}"
        )));
    }
    if let Err(err) = store.proofs.insert(proof.id, proof.clone()) {
        store.proof_by_parcel.release(&parcel_id, proof.id);
        return Err(err);
    }

    let ctx = ActionContext::courier(courier_id).with_notes(fields.notes);
    match lifecycle::apply(state, parcel_id, ParcelAction::Deliver, &ctx) {
        Ok(parcel) => {
            info!(parcel_id = %parcel_id, courier_id = %courier_id, "parcel delivered");
            Ok(DeliveryReceipt { parcel, proof })
        }
        Err(err) => {
            withdraw_proof(store, &proof);
            Err(err)
        }
    }
}

fn withdraw_proof(store: &Store, proof: &ProofOfDelivery) {
    if let Err(err) = store.proofs.remove_if(proof.id, |_| true) {
        error!(proof_id = %proof.id, error = %err, "failed to withdraw proof of delivery");
        return;
    }
    store.proof_by_parcel.release(&proof.parcel_id, proof.id);
    info!(parcel_id = %proof.parcel_id, "proof of delivery withdrawn");
}

/// Records a failed attempt with the courier's reason.
pub fn fail(
    state: &AppState,
    parcel_id: Uuid,
    courier_id: Uuid,
    reason: &str,
) -> Result<Parcel, AppError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(AppError::Validation("a failure reason is required".to_string()));
    }
    authorize_courier(&state.store, parcel_id, courier_id)?;

    let ctx = ActionContext::courier(courier_id).with_notes(Some(reason.to_string()));
    let result = lifecycle::apply(state, parcel_id, ParcelAction::FailedDelivery, &ctx);
    let label = if result.is_ok() { "failed_attempt" } else { "error" };
    state.metrics.deliveries_total.with_label_values(&[label]).inc();
    result
}

/// A parcel on a route may only be closed out by that route's courier.
pub(crate) fn authorize_courier(
    store: &Store,
    parcel_id: Uuid,
    courier_id: Uuid,
) -> Result<(), AppError> {
    let Some(assignment) = store.active_assignment(parcel_id) else {
        return Ok(());
    };
    let route = store.routes.get(assignment.route_id)?;
    if route.courier_id != Some(courier_id) {
        return Err(AppError::AccessDenied(format!(
            "parcel {parcel_id} is on route {} of another courier",
            route.id
        )));
    }
    Ok(())
}
