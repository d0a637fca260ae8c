use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropoffLocation {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofOfDelivery {
    pub id: Uuid,
    pub parcel_id: Uuid,
    pub courier_id: Uuid,
    pub recipient_name: String,
    pub signed_at: DateTime<Utc>,
    pub signature_ref: Option<String>,
    pub photo_ref: Option<String>,
    pub dropoff_location: Option<DropoffLocation>,
    pub notes: Option<String>,
}
