use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PickupStatus {
    Draft,
    Pending,
    Assigned,
    InProgress,
    Completed,
    Canceled,
}

impl PickupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PickupStatus::Draft => "draft",
            PickupStatus::Pending => "pending",
            PickupStatus::Assigned => "assigned",
            PickupStatus::InProgress => "in_progress",
            PickupStatus::Completed => "completed",
            PickupStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for PickupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Draft,
    Confirmed,
    ParcelCreated,
    Canceled,
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ItemStatus::Draft => "draft",
            ItemStatus::Confirmed => "confirmed",
            ItemStatus::ParcelCreated => "parcel_created",
            ItemStatus::Canceled => "canceled",
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Size {
    Small,
    Medium,
    Large,
}

impl Size {
    pub fn as_str(&self) -> &'static str {
        match self {
            Size::Small => "small",
            Size::Medium => "medium",
            Size::Large => "large",
        }
    }
}

impl FromStr for Size {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "small" => Ok(Size::Small),
            "medium" => Ok(Size::Medium),
            "large" => Ok(Size::Large),
            other => Err(format!(
                "unknown size: {other}, expected small/medium/large"
            )),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PickupLocation {
    pub address: String,
    pub sub_area: String,
    #[serde(default)]
    pub contact_name: String,
    #[serde(default)]
    pub contact_phone: String,
}

impl PickupLocation {
    pub fn is_complete(&self) -> bool {
        !self.address.trim().is_empty() && !self.sub_area.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Recipient {
    pub name: String,
    pub phone: String,
    pub address: String,
    pub sub_area: String,
}

impl Recipient {
    /// Names the first blank field, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("name", &self.name),
            ("phone", &self.phone),
            ("address", &self.address),
            ("sub_area", &self.sub_area),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickupRequest {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub pickup_location: Option<PickupLocation>,
    pub status: PickupStatus,
    pub assigned_courier: Option<Uuid>,
    pub assigned_vehicle: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PickupRequest {
    pub fn is_open_for(&self, courier_id: Uuid) -> bool {
        matches!(
            self.status,
            PickupStatus::Assigned | PickupStatus::InProgress
        ) && self.assigned_courier == Some(courier_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickupRequestItem {
    pub id: Uuid,
    pub request_id: Uuid,
    pub recipient: Recipient,
    /// Sender's estimate in grams.
    pub estimated_weight: f64,
    pub quantity: u32,
    pub size: Size,
    pub status: ItemStatus,
    pub parcel_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::{PickupLocation, Recipient, Size};

    #[test]
    fn size_parsing_ignores_case_and_whitespace() {
        assert_eq!(" Medium ".parse::<Size>(), Ok(Size::Medium));
        assert_eq!("LARGE".parse::<Size>(), Ok(Size::Large));
        assert!("huge".parse::<Size>().is_err());
    }

    #[test]
    fn recipient_reports_first_blank_field() {
        let recipient = Recipient {
            name: "Somchai".to_string(),
            phone: "  ".to_string(),
            address: String::new(),
            sub_area: "Chom Phon".to_string(),
        };
        assert_eq!(recipient.missing_field(), Some("phone"));
    }

    #[test]
    fn location_needs_address_and_sub_area() {
        let mut location = PickupLocation {
            address: "12 Phahonyothin Rd".to_string(),
            sub_area: String::new(),
            ..PickupLocation::default()
        };
        assert!(!location.is_complete());
        location.sub_area = "Chom Phon".to_string();
        assert!(location.is_complete());
    }
}
