use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::pickup::{PickupLocation, Recipient, Size};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ParcelStatus {
    PickedUp,
    AtOriginHub,
    InLinehaul,
    AtDestHub,
    OutForDelivery,
    Delivered,
    FailedDelivery,
    ReturnedToSender,
    Canceled,
}

impl ParcelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParcelStatus::PickedUp => "picked_up",
            ParcelStatus::AtOriginHub => "at_origin_hub",
            ParcelStatus::InLinehaul => "in_linehaul",
            ParcelStatus::AtDestHub => "at_dest_hub",
            ParcelStatus::OutForDelivery => "out_for_delivery",
            ParcelStatus::Delivered => "delivered",
            ParcelStatus::FailedDelivery => "failed_delivery",
            ParcelStatus::ReturnedToSender => "returned_to_sender",
            ParcelStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ParcelStatus::Delivered | ParcelStatus::ReturnedToSender | ParcelStatus::Canceled
        )
    }

    /// Actions a courier is offered for a parcel in this status.
    pub fn next_actions(&self) -> &'static [ParcelAction] {
        use ParcelAction::*;

        match self {
            ParcelStatus::PickedUp => &[ScanToHub, MarkDamaged],
            ParcelStatus::AtOriginHub => &[DepartHub, MarkDamaged],
            ParcelStatus::InLinehaul => &[ArriveAtDestHub, MarkDamaged],
            ParcelStatus::AtDestHub => &[PrepareForDelivery, MarkDamaged],
            ParcelStatus::OutForDelivery => &[Deliver, FailedDelivery, Reschedule, MarkDamaged],
            ParcelStatus::FailedDelivery => &[RetryDelivery, ReturnToSender],
            ParcelStatus::Delivered | ParcelStatus::ReturnedToSender | ParcelStatus::Canceled => {
                &[]
            }
        }
    }
}

impl fmt::Display for ParcelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ParcelAction {
    ScanToHub,
    DepartHub,
    ArriveAtDestHub,
    PrepareForDelivery,
    Deliver,
    FailedDelivery,
    Reschedule,
    RetryDelivery,
    ReturnToSender,
    Cancel,
    MarkDamaged,
}

impl ParcelAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParcelAction::ScanToHub => "scan_to_hub",
            ParcelAction::DepartHub => "depart_hub",
            ParcelAction::ArriveAtDestHub => "arrive_at_dest_hub",
            ParcelAction::PrepareForDelivery => "prepare_for_delivery",
            ParcelAction::Deliver => "deliver",
            ParcelAction::FailedDelivery => "failed_delivery",
            ParcelAction::Reschedule => "reschedule",
            ParcelAction::RetryDelivery => "retry_delivery",
            ParcelAction::ReturnToSender => "return_to_sender",
            ParcelAction::Cancel => "cancel",
            ParcelAction::MarkDamaged => "mark_damaged",
        }
    }
}

impl fmt::Display for ParcelAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParcelAction {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let action = match raw {
            "scan_to_hub" => ParcelAction::ScanToHub,
            "depart_hub" | "send_to_linehaul" => ParcelAction::DepartHub,
            "arrive_at_dest_hub" | "confirm_arrival" => ParcelAction::ArriveAtDestHub,
            "prepare_for_delivery" => ParcelAction::PrepareForDelivery,
            "deliver" => ParcelAction::Deliver,
            "failed_delivery" => ParcelAction::FailedDelivery,
            "reschedule" => ParcelAction::Reschedule,
            "retry_delivery" => ParcelAction::RetryDelivery,
            "return_to_sender" => ParcelAction::ReturnToSender,
            "cancel" => ParcelAction::Cancel,
            "mark_damaged" => ParcelAction::MarkDamaged,
            other => return Err(format!("unknown parcel action: {other}")),
        };
        Ok(action)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderSnapshot {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parcel {
    pub id: Uuid,
    pub tracking_code: String,
    pub sender: SenderSnapshot,
    pub recipient: Recipient,
    pub pickup_location: PickupLocation,
    pub origin_hub: Uuid,
    pub dest_hub: Uuid,
    pub weight_grams: u32,
    pub declared_value: f64,
    pub size: Size,
    pub status: ParcelStatus,
    pub pickup_item_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub sla_due_at: Option<DateTime<Utc>>,
}

impl Parcel {
    pub fn is_same_hub(&self) -> bool {
        self.origin_hub == self.dest_hub
    }
}
