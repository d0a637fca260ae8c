use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanEventType {
    PickedUp,
    ArrivedHub,
    DepartedHub,
    OutForDelivery,
    Delivered,
    FailedDelivery,
    ReturnedToSender,
    Canceled,
    Damaged,
}

/// Append-only audit fact; never updated once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanEvent {
    pub id: Uuid,
    /// Store-wide insertion order; breaks ties between equal timestamps.
    pub sequence: u64,
    pub parcel_id: Uuid,
    pub hub_id: Option<Uuid>,
    pub courier_id: Option<Uuid>,
    pub staff_id: Option<Uuid>,
    pub event_type: ScanEventType,
    pub event_time: DateTime<Utc>,
    pub notes: Option<String>,
}
