use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    Planned,
    OutForDelivery,
    Completed,
    Canceled,
}

impl RouteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteStatus::Planned => "planned",
            RouteStatus::OutForDelivery => "out_for_delivery",
            RouteStatus::Completed => "completed",
            RouteStatus::Canceled => "canceled",
        }
    }

    pub fn accepts_parcels(&self) -> bool {
        matches!(self, RouteStatus::Planned | RouteStatus::OutForDelivery)
    }
}

impl fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: Uuid,
    pub courier_id: Option<Uuid>,
    pub hub_id: Uuid,
    pub route_date: NaiveDate,
    pub status: RouteStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteAssignment {
    pub id: Uuid,
    pub route_id: Uuid,
    pub parcel_id: Uuid,
    pub active: bool,
    pub assigned_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}
