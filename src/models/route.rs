use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::coordinate::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteQuery {
    pub origin: Coordinate,
    pub destination: Coordinate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRoutePlan")]
pub struct RoutePlan {
    polyline: Vec<Coordinate>,
    distance_meters: f64,
}

#[derive(Deserialize)]
struct RawRoutePlan {
    polyline: Vec<Coordinate>,
    distance_meters: f64,
}

impl TryFrom<RawRoutePlan> for RoutePlan {
    type Error = AppError;

    fn try_from(raw: RawRoutePlan) -> Result<Self, Self::Error> {
        RoutePlan::new(raw.polyline, raw.distance_meters)
    }
}

impl RoutePlan {
    pub fn new(polyline: Vec<Coordinate>, distance_meters: f64) -> Result<Self, AppError> {
        if polyline.len() < 2 {
            return Err(AppError::InvalidInput(format!(
                "route polyline needs at least 2 points, got {}",
                polyline.len()
            )));
        }
        if !distance_meters.is_finite() || distance_meters < 0.0 {
            return Err(AppError::InvalidInput(format!(
                "route distance must be a non-negative number, got {distance_meters}"
            )));
        }

        Ok(Self {
            polyline,
            distance_meters,
        })
    }

    pub fn polyline(&self) -> &[Coordinate] {
        &self.polyline
    }

    pub fn distance_meters(&self) -> f64 {
        self.distance_meters
    }
}
