//! Parcel state machine.
//!
//! [`plan`] is the single authority on which edges exist; [`apply`] turns a planned edge
//! into a conditional write on the observed source status followed by exactly one scan
//! event. A write whose scan event cannot be recorded is rolled back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::parcel::{Parcel, ParcelAction, ParcelStatus, SenderSnapshot};
use crate::models::pickup::{PickupLocation, Recipient, Size};
use crate::models::route::RouteStatus;
use crate::models::scan::{ScanEvent, ScanEventType};
use crate::store::Cas;
use crate::state::AppState;

const TRACKING_CODE_ATTEMPTS: usize = 5;
const TRACKING_CODE_LEN: usize = 12;

/// Who performs an action and where.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionContext {
    pub hub_id: Option<Uuid>,
    pub courier_id: Option<Uuid>,
    pub staff_id: Option<Uuid>,
    pub notes: Option<String>,
}

impl ActionContext {
    pub fn courier(courier_id: Uuid) -> Self {
        Self {
            courier_id: Some(courier_id),
            ..Self::default()
        }
    }

    pub fn at_hub(mut self, hub_id: Uuid) -> Self {
        self.hub_id = Some(hub_id);
        self
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes.filter(|n| !n.trim().is_empty());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ParcelStatus,
    pub to: ParcelStatus,
    pub event: ScanEventType,
}

impl Transition {
    fn edge(from: ParcelStatus, to: ParcelStatus, event: ScanEventType) -> Self {
        Self { from, to, event }
    }

    pub fn changes_status(&self) -> bool {
        self.from != self.to
    }
}

/// Resolves `action` against the parcel's status and the actor's location.
pub fn plan(
    parcel: &Parcel,
    action: ParcelAction,
    hub_id: Option<Uuid>,
) -> Result<Transition, AppError> {
    use ParcelStatus::*;

    let status = parcel.status;
    let refuse = || AppError::illegal(action, status);
    let require_hub = |expected: Uuid, which: &str| {
        if hub_id == Some(expected) {
            Ok(())
        } else {
            Err(AppError::illegal_because(
                action,
                status,
                format!("parcel must be handled at its {which} hub {expected}"),
            ))
        }
    };

    match (action, status) {
        (ParcelAction::ScanToHub, PickedUp) => {
            require_hub(parcel.origin_hub, "origin")?;
            Ok(Transition::edge(PickedUp, AtOriginHub, ScanEventType::ArrivedHub))
        }
        (ParcelAction::DepartHub, AtOriginHub) => {
            if parcel.is_same_hub() {
                return Err(AppError::illegal_because(
                    action,
                    status,
                    "origin and destination hub are the same",
                ));
            }
            require_hub(parcel.origin_hub, "origin")?;
            Ok(Transition::edge(AtOriginHub, InLinehaul, ScanEventType::DepartedHub))
        }
        (ParcelAction::PrepareForDelivery, AtOriginHub) => {
            if !parcel.is_same_hub() {
                return Err(AppError::illegal_because(
                    action,
                    status,
                    "parcel must travel by linehaul to its destination hub",
                ));
            }
            require_hub(parcel.origin_hub, "origin")?;
            Ok(Transition::edge(AtOriginHub, AtDestHub, ScanEventType::ArrivedHub))
        }
        (ParcelAction::ArriveAtDestHub, InLinehaul) => {
            require_hub(parcel.dest_hub, "destination")?;
            Ok(Transition::edge(InLinehaul, AtDestHub, ScanEventType::ArrivedHub))
        }
        (ParcelAction::PrepareForDelivery, AtDestHub) => {
            require_hub(parcel.dest_hub, "destination")?;
            Ok(Transition::edge(
                AtDestHub,
                OutForDelivery,
                ScanEventType::OutForDelivery,
            ))
        }
        (ParcelAction::Deliver, OutForDelivery) => Ok(Transition::edge(
            OutForDelivery,
            Delivered,
            ScanEventType::Delivered,
        )),
        (ParcelAction::FailedDelivery | ParcelAction::Reschedule, OutForDelivery) => Ok(
            Transition::edge(OutForDelivery, FailedDelivery, ScanEventType::FailedDelivery),
        ),
        (ParcelAction::RetryDelivery, FailedDelivery) => Ok(Transition::edge(
            FailedDelivery,
            OutForDelivery,
            ScanEventType::OutForDelivery,
        )),
        (ParcelAction::ReturnToSender, FailedDelivery) => Ok(Transition::edge(
            FailedDelivery,
            ReturnedToSender,
            ScanEventType::ReturnedToSender,
        )),
        (ParcelAction::Cancel, current) if !current.is_terminal() => {
            Ok(Transition::edge(current, Canceled, ScanEventType::Canceled))
        }
        (ParcelAction::MarkDamaged, current) if !current.is_terminal() => {
            Ok(Transition::edge(current, current, ScanEventType::Damaged))
        }
        _ => Err(refuse()),
    }
}

/// Runs one lifecycle action and reports it to metrics and logs.
pub fn apply(
    state: &AppState,
    parcel_id: Uuid,
    action: ParcelAction,
    ctx: &ActionContext,
) -> Result<Parcel, AppError> {
    let result = transition(state, parcel_id, action, ctx);
    state
        .metrics
        .record_transition(action.as_str(), result.is_ok());

    match &result {
        Ok(parcel) => info!(
            parcel_id = %parcel_id,
            action = %action,
            status = %parcel.status,
            "parcel action applied"
        ),
        Err(err) => warn!(parcel_id = %parcel_id, action = %action, error = %err, "parcel action rejected"),
    }

    result
}

fn transition(
    state: &AppState,
    parcel_id: Uuid,
    action: ParcelAction,
    ctx: &ActionContext,
) -> Result<Parcel, AppError> {
    let store = &state.store;
    let current = store.parcels.get(parcel_id)?;
    let step = plan(&current, action, ctx.hub_id)?;

    if action == ParcelAction::Deliver && store.proof_by_parcel.holder(&parcel_id).is_none() {
        return Err(AppError::illegal_because(
            action,
            current.status,
            "proof of delivery has not been recorded",
        ));
    }
    if step.to == ParcelStatus::OutForDelivery
        && step.from == ParcelStatus::AtDestHub
        && store.active_assignment(parcel_id).is_none()
    {
        return Err(AppError::illegal_because(
            action,
            current.status,
            "parcel is not assigned to a route",
        ));
    }

    let retrying =
        step.from == ParcelStatus::FailedDelivery && step.to == ParcelStatus::OutForDelivery;
    if retrying && !on_active_route(state, parcel_id) {
        return Err(AppError::illegal_because(
            action,
            current.status,
            "parcel is not on a route that is out for delivery",
        ));
    }

    let mut ctx = ctx.clone();
    if action == ParcelAction::Reschedule && ctx.notes.is_none() {
        ctx.notes = Some("rescheduled".to_string());
    }

    if !step.changes_status() {
        let now = Utc::now();
        record_scan(state, &current, step.event, &ctx, now)?;
        return Ok(current);
    }

    let now = Utc::now();
    let updated = match store.parcels.update_if(
        parcel_id,
        |parcel| parcel.status == step.from,
        |parcel| {
            parcel.status = step.to;
            parcel.updated_at = now;
            if step.to == ParcelStatus::Delivered {
                parcel.delivered_at = Some(now);
            }
        },
    )? {
        Cas::Applied(parcel) => parcel,
        Cas::Rejected(observed) => {
            return Err(AppError::illegal_because(
                action,
                observed.status,
                "status changed concurrently",
            ));
        }
    };

    // The route may have completed between the check above and the write.
    if retrying && !on_active_route(state, parcel_id) {
        revert(state, &current, step);
        return Err(AppError::illegal_because(
            action,
            current.status,
            "route completed concurrently",
        ));
    }

    if let Err(err) = record_scan(state, &updated, step.event, &ctx, now) {
        revert(state, &current, step);
        return Err(err);
    }

    if step.to.is_terminal() {
        close_assignment(state, parcel_id, now);
    }

    Ok(updated)
}

fn on_active_route(state: &AppState, parcel_id: Uuid) -> bool {
    state
        .store
        .active_assignment(parcel_id)
        .and_then(|a| state.store.routes.find(a.route_id))
        .is_some_and(|route| route.status == RouteStatus::OutForDelivery)
}

/// Undoes a status write that could not be completed.
fn revert(state: &AppState, previous: &Parcel, step: Transition) {
    let outcome = state.store.parcels.update_if(
        previous.id,
        |parcel| parcel.status == step.to,
        |parcel| {
            parcel.status = previous.status;
            parcel.updated_at = previous.updated_at;
            parcel.delivered_at = previous.delivered_at;
        },
    );

    match outcome {
        Ok(Cas::Applied(_)) => {
            warn!(parcel_id = %previous.id, status = %previous.status, "parcel transition compensated")
        }
        Ok(Cas::Rejected(observed)) => error!(
            parcel_id = %previous.id,
            status = %observed.status,
            "parcel moved on before compensation"
        ),
        Err(err) => error!(parcel_id = %previous.id, error = %err, "parcel compensation failed"),
    }
}

/// Deactivates the parcel's route assignment once it can no longer be delivered.
pub(crate) fn close_assignment(state: &AppState, parcel_id: Uuid, now: DateTime<Utc>) {
    let store = &state.store;
    let Some(assignment) = store.active_assignment(parcel_id) else {
        return;
    };

    match store.route_assignments.update_if(
        assignment.id,
        |a| a.active,
        |a| {
            a.active = false;
            a.released_at = Some(now);
        },
    ) {
        Ok(Cas::Applied(_)) => {
            store
                .active_assignment_by_parcel
                .release(&parcel_id, assignment.id);
            info!(parcel_id = %parcel_id, route_id = %assignment.route_id, "route assignment closed");
        }
        Ok(Cas::Rejected(_)) => {}
        Err(err) => {
            error!(parcel_id = %parcel_id, error = %err, "failed to close route assignment")
        }
    }
}

pub(crate) fn record_scan(
    state: &AppState,
    parcel: &Parcel,
    event_type: ScanEventType,
    ctx: &ActionContext,
    event_time: DateTime<Utc>,
) -> Result<ScanEvent, AppError> {
    let event = ScanEvent {
        id: Uuid::new_v4(),
        sequence: state.store.next_scan_sequence(),
        parcel_id: parcel.id,
        hub_id: ctx.hub_id,
        courier_id: ctx.courier_id,
        staff_id: ctx.staff_id,
        event_type,
        event_time,
        notes: ctx.notes.clone(),
    };

    let event = state.store.scan_events.insert(event.id, event)?;
    let _ = state.scan_events_tx.send(event.clone());
    Ok(event)
}

#[derive(Debug, Clone)]
pub struct NewParcel {
    pub sender: SenderSnapshot,
    pub recipient: Recipient,
    pub pickup_location: PickupLocation,
    pub origin_hub: Uuid,
    pub dest_hub: Uuid,
    pub weight_grams: u32,
    pub declared_value: f64,
    pub size: Size,
    pub pickup_item_id: Option<Uuid>,
    pub courier_id: Uuid,
}

/// Creates a parcel at `picked_up` under a freshly claimed tracking code.
pub fn create_parcel(state: &AppState, new: NewParcel) -> Result<Parcel, AppError> {
    let store = &state.store;
    let id = Uuid::new_v4();
    let tracking_code = claim_tracking_code(state, id)?;
    let now = Utc::now();

    let parcel = Parcel {
        id,
        tracking_code: tracking_code.clone(),
        sender: new.sender,
        recipient: new.recipient,
        pickup_location: new.pickup_location,
        origin_hub: new.origin_hub,
        dest_hub: new.dest_hub,
        weight_grams: new.weight_grams,
        declared_value: new.declared_value,
        size: new.size,
        status: ParcelStatus::PickedUp,
        pickup_item_id: new.pickup_item_id,
        created_at: now,
        updated_at: now,
        delivered_at: None,
        sla_due_at: Some(now + state.sla),
    };

    if let Err(err) = store.parcels.insert(id, parcel.clone()) {
        store.parcel_by_tracking_code.release(&tracking_code, id);
        return Err(err);
    }

    let ctx = ActionContext::courier(new.courier_id);
    if let Err(err) = record_scan(state, &parcel, ScanEventType::PickedUp, &ctx, now) {
        let _ = store.parcels.remove_if(id, |_| true);
        store.parcel_by_tracking_code.release(&tracking_code, id);
        error!(parcel_id = %id, error = %err, "parcel creation rolled back");
        return Err(err);
    }

    state.metrics.parcels_created_total.inc();
    info!(parcel_id = %id, tracking_code = %tracking_code, "parcel created");
    Ok(parcel)
}

fn claim_tracking_code(state: &AppState, parcel_id: Uuid) -> Result<String, AppError> {
    for _ in 0..TRACKING_CODE_ATTEMPTS {
        let candidate = tracking_code(&state.tracking_prefix);
        if state
            .store
            .parcel_by_tracking_code
            .claim(candidate.clone(), parcel_id)?
            .is_ok()
        {
            return Ok(candidate);
        }
    }

    Err(AppError::Conflict(
        "could not allocate a unique tracking code".to_string(),
    ))
}

fn tracking_code(prefix: &str) -> String {
    let random = Uuid::new_v4().simple().to_string().to_ascii_uppercase();
    format!("{prefix}{}", &random[..TRACKING_CODE_LEN])
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{plan, tracking_code, Transition};
    use crate::error::AppError;
    use crate::models::parcel::{Parcel, ParcelAction, ParcelStatus, SenderSnapshot};
    use crate::models::pickup::{PickupLocation, Recipient, Size};
    use crate::models::scan::ScanEventType;

    const ORIGIN: Uuid = Uuid::from_u128(1);
    const DEST: Uuid = Uuid::from_u128(2);

    fn parcel(status: ParcelStatus, dest: Uuid) -> Parcel {
        Parcel {
            id: Uuid::new_v4(),
            tracking_code: "PF000000000001".to_string(),
            sender: SenderSnapshot {
                id: Uuid::new_v4(),
                name: "sender".to_string(),
                phone: "0800000000".to_string(),
            },
            recipient: Recipient::default(),
            pickup_location: PickupLocation::default(),
            origin_hub: ORIGIN,
            dest_hub: dest,
            weight_grams: 1000,
            declared_value: 0.0,
            size: Size::Medium,
            status,
            pickup_item_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            delivered_at: None,
            sla_due_at: None,
        }
    }

    #[test]
    fn linehaul_path_follows_hub_locations() {
        use ParcelStatus::*;

        let steps = [
            (PickedUp, ParcelAction::ScanToHub, ORIGIN, AtOriginHub),
            (AtOriginHub, ParcelAction::DepartHub, ORIGIN, InLinehaul),
            (InLinehaul, ParcelAction::ArriveAtDestHub, DEST, AtDestHub),
            (AtDestHub, ParcelAction::PrepareForDelivery, DEST, OutForDelivery),
        ];

        for (from, action, hub, to) in steps {
            let step = plan(&parcel(from, DEST), action, Some(hub)).unwrap();
            assert_eq!((step.from, step.to), (from, to), "{action}");
        }
    }

    #[test]
    fn wrong_hub_is_rejected() {
        let err = plan(
            &parcel(ParcelStatus::InLinehaul, DEST),
            ParcelAction::ArriveAtDestHub,
            Some(ORIGIN),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::IllegalTransition { .. }));

        assert!(
            plan(
                &parcel(ParcelStatus::PickedUp, DEST),
                ParcelAction::ScanToHub,
                None
            )
            .is_err()
        );
    }

    #[test]
    fn same_hub_parcels_skip_linehaul() {
        let same_hub = parcel(ParcelStatus::AtOriginHub, ORIGIN);

        assert!(plan(&same_hub, ParcelAction::DepartHub, Some(ORIGIN)).is_err());
        let step = plan(&same_hub, ParcelAction::PrepareForDelivery, Some(ORIGIN)).unwrap();
        assert_eq!(
            step,
            Transition {
                from: ParcelStatus::AtOriginHub,
                to: ParcelStatus::AtDestHub,
                event: ScanEventType::ArrivedHub,
            }
        );

        let cross_hub = parcel(ParcelStatus::AtOriginHub, DEST);
        assert!(plan(&cross_hub, ParcelAction::PrepareForDelivery, Some(ORIGIN)).is_err());
    }

    #[test]
    fn failed_delivery_branches_to_retry_or_return() {
        let failed = parcel(ParcelStatus::FailedDelivery, DEST);
        assert_eq!(
            plan(&failed, ParcelAction::RetryDelivery, None).unwrap().to,
            ParcelStatus::OutForDelivery
        );
        assert_eq!(
            plan(&failed, ParcelAction::ReturnToSender, None).unwrap().to,
            ParcelStatus::ReturnedToSender
        );
        assert!(plan(&failed, ParcelAction::Deliver, None).is_err());
    }

    #[test]
    fn reschedule_is_a_failed_attempt() {
        let out = parcel(ParcelStatus::OutForDelivery, DEST);
        let step = plan(&out, ParcelAction::Reschedule, None).unwrap();
        assert_eq!(step.to, ParcelStatus::FailedDelivery);
        assert_eq!(step.event, ScanEventType::FailedDelivery);
    }

    #[test]
    fn terminal_parcels_accept_nothing() {
        for status in [
            ParcelStatus::Delivered,
            ParcelStatus::ReturnedToSender,
            ParcelStatus::Canceled,
        ] {
            let done = parcel(status, DEST);
            for action in [
                ParcelAction::Cancel,
                ParcelAction::MarkDamaged,
                ParcelAction::Deliver,
                ParcelAction::RetryDelivery,
            ] {
                assert!(plan(&done, action, Some(DEST)).is_err(), "{status} {action}");
            }
        }
    }

    #[test]
    fn mark_damaged_keeps_status() {
        let step = plan(
            &parcel(ParcelStatus::InLinehaul, DEST),
            ParcelAction::MarkDamaged,
            None,
        )
        .unwrap();
        assert!(!step.changes_status());
        assert_eq!(step.event, ScanEventType::Damaged);
    }

    #[test]
    fn every_hinted_action_is_plannable() {
        use ParcelStatus::*;

        for status in [
            PickedUp,
            AtOriginHub,
            InLinehaul,
            AtDestHub,
            OutForDelivery,
            FailedDelivery,
        ] {
            let candidate = parcel(status, DEST);
            for action in status.next_actions() {
                let hub = match (status, action) {
                    (InLinehaul | AtDestHub, ParcelAction::ArriveAtDestHub)
                    | (InLinehaul | AtDestHub, ParcelAction::PrepareForDelivery) => Some(DEST),
                    _ => Some(ORIGIN),
                };
                assert!(
                    plan(&candidate, *action, hub).is_ok(),
                    "{status} should allow {action}"
                );
            }
        }
    }

    #[test]
    fn tracking_codes_carry_prefix_and_fixed_length() {
        let code = tracking_code("PF");
        assert!(code.starts_with("PF"));
        assert_eq!(code.len(), 14);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
