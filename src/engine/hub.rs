use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::engine::lifecycle::{self, ActionContext};
use crate::error::AppError;
use crate::models::parcel::{Parcel, ParcelAction};
use crate::state::AppState;

/// Actions accepted at the hub boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HubAction {
    ScanToHub,
    SendToLinehaul,
    ConfirmArrival,
    PrepareForDelivery,
}

impl HubAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HubAction::ScanToHub => "scan_to_hub",
            HubAction::SendToLinehaul => "send_to_linehaul",
            HubAction::ConfirmArrival => "confirm_arrival",
            HubAction::PrepareForDelivery => "prepare_for_delivery",
        }
    }

    pub fn parcel_action(&self) -> ParcelAction {
        match self {
            HubAction::ScanToHub => ParcelAction::ScanToHub,
            HubAction::SendToLinehaul => ParcelAction::DepartHub,
            HubAction::ConfirmArrival => ParcelAction::ArriveAtDestHub,
            HubAction::PrepareForDelivery => ParcelAction::PrepareForDelivery,
        }
    }
}

impl fmt::Display for HubAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HubAction {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "scan_to_hub" => Ok(HubAction::ScanToHub),
            "send_to_linehaul" => Ok(HubAction::SendToLinehaul),
            "confirm_arrival" => Ok(HubAction::ConfirmArrival),
            "prepare_for_delivery" => Ok(HubAction::PrepareForDelivery),
            other => Err(AppError::Validation(format!(
                "unknown hub action: {other}, expected send_to_linehaul/confirm_arrival/prepare_for_delivery"
            ))),
        }
    }
}

/// Runs a hub action on behalf of a staff member bound to `hub_id`.
pub fn process(
    state: &AppState,
    staff_id: Uuid,
    hub_id: Uuid,
    parcel_id: Uuid,
    action: HubAction,
    notes: Option<String>,
) -> Result<Parcel, AppError> {
    let store = &state.store;
    let staff = store.staff.get(staff_id)?;
    if staff.hub_id != Some(hub_id) {
        warn!(staff_id = %staff_id, hub_id = %hub_id, "staff not bound to hub");
        return Err(AppError::AccessDenied(format!(
            "staff {staff_id} is not bound to hub {hub_id}"
        )));
    }

    let parcel = store.parcels.get(parcel_id)?;
    if parcel.origin_hub != hub_id && parcel.dest_hub != hub_id {
        warn!(parcel_id = %parcel_id, hub_id = %hub_id, "parcel does not pass through hub");
        return Err(AppError::AccessDenied(format!(
            "parcel {parcel_id} does not pass through hub {hub_id}"
        )));
    }

    let ctx = ActionContext {
        hub_id: Some(hub_id),
        staff_id: Some(staff_id),
        ..ActionContext::default()
    }
    .with_notes(notes);

    lifecycle::apply(state, parcel_id, action.parcel_action(), &ctx)
}

#[cfg(test)]
mod tests {
    use super::HubAction;
    use crate::models::parcel::ParcelAction;

    #[test]
    fn boundary_names_map_onto_lifecycle_actions() {
        let pairs = [
            ("send_to_linehaul", ParcelAction::DepartHub),
            ("confirm_arrival", ParcelAction::ArriveAtDestHub),
            ("prepare_for_delivery", ParcelAction::PrepareForDelivery),
        ];
        for (name, expected) in pairs {
            let action: HubAction = name.parse().unwrap();
            assert_eq!(action.parcel_action(), expected);
            assert_eq!(action.as_str(), name);
        }
        assert!("deliver".parse::<HubAction>().is_err());
    }
}
