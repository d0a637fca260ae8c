//! In-memory entity store.
//!
//! Tables offer conditional updates and unique indexes offer atomic key claims; together
//! they carry every "only one X" invariant of the workflow so that callers never need a
//! check-then-act pair.

pub mod index;
pub mod table;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashSet;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::courier::Courier;
use crate::models::hub::{Hub, HubStaff};
use crate::models::parcel::Parcel;
use crate::models::pickup::{PickupRequest, PickupRequestItem};
use crate::models::proof::ProofOfDelivery;
use crate::models::route::{Route, RouteAssignment};
use crate::models::scan::ScanEvent;
use crate::models::vehicle::Vehicle;

pub use index::UniqueIndex;
pub use table::{Cas, Table};

/// Simulated store outages, keyed by table or index name.
#[derive(Debug, Default)]
pub struct Faults {
    failing: DashSet<&'static str>,
}

impl Faults {
    pub fn inject(&self, name: &'static str) {
        self.failing.insert(name);
    }

    pub fn clear(&self) {
        self.failing.clear();
    }

    pub(crate) fn check(&self, name: &str) -> Result<(), AppError> {
        if self.failing.contains(name) {
            return Err(AppError::DependencyFailure(format!(
                "store unavailable for {name}"
            )));
        }
        Ok(())
    }
}

pub struct Store {
    pub pickup_requests: Table<PickupRequest>,
    pub pickup_items: Table<PickupRequestItem>,
    pub parcels: Table<Parcel>,
    pub routes: Table<Route>,
    pub route_assignments: Table<RouteAssignment>,
    pub scan_events: Table<ScanEvent>,
    pub proofs: Table<ProofOfDelivery>,
    pub vehicles: Table<Vehicle>,
    pub hubs: Table<Hub>,
    pub couriers: Table<Courier>,
    pub staff: Table<HubStaff>,

    /// requester -> draft pickup request
    pub draft_by_requester: UniqueIndex<Uuid>,
    /// parcel -> active route assignment
    pub active_assignment_by_parcel: UniqueIndex<Uuid>,
    /// (courier, date) -> route
    pub route_by_courier_day: UniqueIndex<(Uuid, NaiveDate)>,
    /// parcel -> proof of delivery
    pub proof_by_parcel: UniqueIndex<Uuid>,
    pub parcel_by_tracking_code: UniqueIndex<String>,
    /// (normalized plate, province) -> vehicle
    pub vehicle_by_plate: UniqueIndex<(String, String)>,

    scan_sequence: AtomicU64,
    faults: Arc<Faults>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        let faults = Arc::new(Faults::default());

        Self {
            pickup_requests: Table::new("pickup_requests", faults.clone()),
            pickup_items: Table::new("pickup_items", faults.clone()),
            parcels: Table::new("parcels", faults.clone()),
            routes: Table::new("routes", faults.clone()),
            route_assignments: Table::new("route_assignments", faults.clone()),
            scan_events: Table::new("scan_events", faults.clone()),
            proofs: Table::new("proofs", faults.clone()),
            vehicles: Table::new("vehicles", faults.clone()),
            hubs: Table::new("hubs", faults.clone()),
            couriers: Table::new("couriers", faults.clone()),
            staff: Table::new("staff", faults.clone()),
            draft_by_requester: UniqueIndex::new("draft_by_requester", faults.clone()),
            active_assignment_by_parcel: UniqueIndex::new(
                "active_assignment_by_parcel",
                faults.clone(),
            ),
            route_by_courier_day: UniqueIndex::new("route_by_courier_day", faults.clone()),
            proof_by_parcel: UniqueIndex::new("proof_by_parcel", faults.clone()),
            parcel_by_tracking_code: UniqueIndex::new("parcel_by_tracking_code", faults.clone()),
            vehicle_by_plate: UniqueIndex::new("vehicle_by_plate", faults.clone()),
            scan_sequence: AtomicU64::new(0),
            faults,
        }
    }

    pub fn faults(&self) -> &Faults {
        &self.faults
    }

    pub fn next_scan_sequence(&self) -> u64 {
        self.scan_sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Scan events of one parcel, oldest first.
    pub fn scan_history(&self, parcel_id: Uuid) -> Vec<ScanEvent> {
        let mut events = self
            .scan_events
            .filter(|event| event.parcel_id == parcel_id);
        events.sort_by_key(|event| (event.event_time, event.sequence));
        events
    }

    pub fn items_of(&self, request_id: Uuid) -> Vec<PickupRequestItem> {
        let mut items = self
            .pickup_items
            .filter(|item| item.request_id == request_id);
        items.sort_by_key(|item| item.created_at);
        items
    }

    pub fn active_assignment(&self, parcel_id: Uuid) -> Option<RouteAssignment> {
        self.active_assignment_by_parcel
            .holder(&parcel_id)
            .and_then(|assignment_id| self.route_assignments.find(assignment_id))
            .filter(|assignment| assignment.active)
    }

    pub fn active_assignments_of_route(&self, route_id: Uuid) -> Vec<RouteAssignment> {
        self.route_assignments
            .filter(|assignment| assignment.route_id == route_id && assignment.active)
    }
}
