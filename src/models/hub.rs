use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hub {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    /// Sub-areas whose pickups and deliveries are handled by this hub.
    pub sub_areas: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Hub {
    pub fn serves(&self, sub_area: &str) -> bool {
        let wanted = sub_area.trim();
        self.sub_areas
            .iter()
            .any(|area| area.trim().eq_ignore_ascii_case(wanted))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Operator,
    Supervisor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubStaff {
    pub id: Uuid,
    pub name: String,
    pub role: StaffRole,
    pub hub_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
