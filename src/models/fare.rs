use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VehicleClass {
    Bike,
    Comfort,
    Car,
}

impl VehicleClass {
    pub const ALL: [VehicleClass; 3] = [VehicleClass::Bike, VehicleClass::Comfort, VehicleClass::Car];

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleClass::Bike => "Bike",
            VehicleClass::Comfort => "Comfort",
            VehicleClass::Car => "Car",
        }
    }
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleClass {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Bike" | "bike" => Ok(VehicleClass::Bike),
            "Comfort" | "comfort" => Ok(VehicleClass::Comfort),
            "Car" | "car" => Ok(VehicleClass::Car),
            other => Err(AppError::UnknownVehicleClass(other.to_string())),
        }
    }
}

/// Price of a routed trip. Always derived from a route, never stored on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fare {
    pub amount: BigDecimal,
    pub vehicle_class: VehicleClass,
    pub distance_km: f64,
}
