//! Registration of the collaborators the workflow refers to: hubs, couriers, hub staff
//! and vehicles.

use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::courier::Courier;
use crate::models::hub::{Hub, HubStaff, StaffRole};
use crate::models::vehicle::{normalize_plate, normalize_province, Vehicle, VehicleOwner};
use crate::state::AppState;

fn required(value: &str, field: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{field} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewHub {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub sub_areas: Vec<String>,
}

pub fn register_hub(state: &AppState, new: NewHub) -> Result<Hub, AppError> {
    let hub = Hub {
        id: Uuid::new_v4(),
        name: required(&new.name, "name")?,
        address: required(&new.address, "address")?,
        sub_areas: new
            .sub_areas
            .iter()
            .map(|area| area.trim().to_string())
            .filter(|area| !area.is_empty())
            .collect(),
        created_at: Utc::now(),
    };

    let hub = state.store.hubs.insert(hub.id, hub)?;
    info!(hub_id = %hub.id, name = %hub.name, "hub registered");
    Ok(hub)
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCourier {
    pub name: String,
    pub phone: String,
}

pub fn register_courier(state: &AppState, new: NewCourier) -> Result<Courier, AppError> {
    let courier = Courier {
        id: Uuid::new_v4(),
        name: required(&new.name, "name")?,
        phone: required(&new.phone, "phone")?,
        active: true,
        created_at: Utc::now(),
    };

    let courier = state.store.couriers.insert(courier.id, courier)?;
    info!(courier_id = %courier.id, "courier registered");
    Ok(courier)
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewStaff {
    pub name: String,
    pub role: StaffRole,
    pub hub_id: Option<Uuid>,
}

pub fn register_staff(state: &AppState, new: NewStaff) -> Result<HubStaff, AppError> {
    if let Some(hub_id) = new.hub_id {
        state.store.hubs.get(hub_id)?;
    }

    let staff = HubStaff {
        id: Uuid::new_v4(),
        name: required(&new.name, "name")?,
        role: new.role,
        hub_id: new.hub_id,
        created_at: Utc::now(),
    };

    let staff = state.store.staff.insert(staff.id, staff)?;
    info!(staff_id = %staff.id, hub_id = ?staff.hub_id, "hub staff registered");
    Ok(staff)
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewVehicle {
    pub plate: String,
    pub province: String,
    pub vehicle_type: String,
    pub capacity: u32,
    pub owner: VehicleOwner,
    /// Required for courier-owned vehicles, which start out bound to their owner.
    pub owner_courier_id: Option<Uuid>,
}

/// Registers a vehicle under its normalized (plate, province) identity.
pub fn register_vehicle(state: &AppState, new: NewVehicle) -> Result<Vehicle, AppError> {
    let store = &state.store;
    let plate = normalize_plate(&new.plate);
    if plate.is_empty() {
        return Err(AppError::Validation("plate cannot be empty".to_string()));
    }
    let province = normalize_province(&new.province);
    if province.is_empty() {
        return Err(AppError::Validation("province cannot be empty".to_string()));
    }
    if new.capacity == 0 {
        return Err(AppError::Validation("capacity must be > 0".to_string()));
    }

    let assigned_courier = match (new.owner, new.owner_courier_id) {
        (VehicleOwner::Courier, Some(courier_id)) => {
            store.couriers.get(courier_id)?;
            Some(courier_id)
        }
        (VehicleOwner::Courier, None) => {
            return Err(AppError::Validation(
                "courier-owned vehicles need owner_courier_id".to_string(),
            ));
        }
        (VehicleOwner::Company, _) => None,
    };

    let now = Utc::now();
    let vehicle = Vehicle {
        id: Uuid::new_v4(),
        plate: plate.clone(),
        province: province.clone(),
        vehicle_type: required(&new.vehicle_type, "vehicle_type")?,
        capacity: new.capacity,
        owner: new.owner,
        assigned_courier,
        created_at: now,
        updated_at: now,
    };

    let key = (plate, province);
    if let Err(existing) = store.vehicle_by_plate.claim(key.clone(), vehicle.id)? {
        return Err(AppError::Conflict(format!(
            "plate {} ({}) is already registered as vehicle {existing}",
            key.0, key.1
        )));
    }
    if let Err(err) = store.vehicles.insert(vehicle.id, vehicle.clone()) {
        store.vehicle_by_plate.release(&key, vehicle.id);
        return Err(err);
    }

    info!(vehicle_id = %vehicle.id, plate = %vehicle.plate, "vehicle registered");
    Ok(vehicle)
}
