use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::coordinate::Coordinate;
use crate::models::fare::VehicleClass;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DriverStatus {
    Available,
    Reserved,
    OnTrip,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub display_name: String,
    pub phone: String,
    pub vehicle_class: VehicleClass,
    pub location: Coordinate,
    pub status: DriverStatus,
    pub updated_at: DateTime<Utc>,
}
