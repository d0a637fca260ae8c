use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VehicleOwner {
    Company,
    Courier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: Uuid,
    /// Stored normalized, see [`normalize_plate`].
    pub plate: String,
    pub province: String,
    pub vehicle_type: String,
    pub capacity: u32,
    pub owner: VehicleOwner,
    pub assigned_courier: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Vehicle {
    pub fn is_free_for(&self, courier_id: Uuid) -> bool {
        self.assigned_courier.is_none_or(|holder| holder == courier_id)
    }
}

/// Uppercases a plate and drops separators so that `1กข-234`, `1กข 234` and `1กข234`
/// compare equal.
pub fn normalize_plate(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '.' | '_' | '/'))
        .flat_map(char::to_uppercase)
        .collect()
}

pub fn normalize_province(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::{normalize_plate, normalize_province};

    #[test]
    fn plate_separators_and_case_are_ignored() {
        assert_eq!(normalize_plate("ab-12 34"), "AB1234");
        assert_eq!(normalize_plate(" 1กข.234 "), "1กข234");
        assert_eq!(normalize_plate("AB1234"), normalize_plate("a b-1.2_3/4"));
    }

    #[test]
    fn province_whitespace_is_collapsed() {
        assert_eq!(normalize_province("  Bangkok   Metro "), "Bangkok Metro");
    }
}
