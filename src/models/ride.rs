use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::coordinate::Coordinate;
use crate::models::fare::{Fare, VehicleClass};
use crate::models::route::RoutePlan;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FailureReason {
    InvalidInput,
    NotFound,
    NoRoute,
    ProviderUnavailable,
    DuplicateActiveRide,
    UnknownVehicleClass,
    PermissionDenied,
    Other,
}

impl FailureReason {
    pub fn from_error(err: &AppError) -> Self {
        match err {
            AppError::InvalidInput(_) | AppError::EmptyContent => FailureReason::InvalidInput,
            AppError::NotFound(_) => FailureReason::NotFound,
            AppError::NoRoute => FailureReason::NoRoute,
            AppError::ProviderUnavailable(_) => FailureReason::ProviderUnavailable,
            AppError::DuplicateActiveRide(_) => FailureReason::DuplicateActiveRide,
            AppError::UnknownVehicleClass(_) => FailureReason::UnknownVehicleClass,
            AppError::PermissionDenied => FailureReason::PermissionDenied,
            AppError::AlreadyTaken(_)
            | AppError::InvalidTransition(_)
            | AppError::Forbidden(_)
            | AppError::Internal(_) => FailureReason::Other,
        }
    }

    /// Whether resubmitting the same input may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureReason::ProviderUnavailable)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", content = "reason")]
pub enum RideState {
    Idle,
    Geocoding,
    Routing,
    Quoted,
    Dispatching,
    WaitingForDriver,
    Accepted,
    EnRoute,
    Completed,
    Cancelled,
    Failed(FailureReason),
}

impl RideState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RideState::Completed | RideState::Cancelled)
    }

    /// States in which a driver is bound to the ride.
    pub fn has_driver(&self) -> bool {
        matches!(
            self,
            RideState::Accepted | RideState::EnRoute | RideState::Completed
        )
    }

    pub fn is_cancellable_by_dispatcher(&self) -> bool {
        matches!(
            self,
            RideState::Dispatching | RideState::WaitingForDriver | RideState::Accepted
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Actor {
    Rider,
    Driver,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub rider_id: String,
    pub state: RideState,
    pub pickup: Coordinate,
    pub destination_text: String,
    pub destination: Option<Coordinate>,
    pub route: Option<RoutePlan>,
    pub fare: Option<Fare>,
    pub vehicle_class: VehicleClass,
    pub assigned_driver_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A ride as submitted by a client, before the dispatcher assigns its id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideDraft {
    pub rider_id: String,
    pub pickup: Coordinate,
    pub destination_text: String,
    pub destination: Option<Coordinate>,
    pub route: Option<RoutePlan>,
    pub fare: Option<Fare>,
    pub vehicle_class: VehicleClass,
}

impl RideDraft {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.rider_id.trim().is_empty() {
            return Err(AppError::InvalidInput("rider_id cannot be empty".to_string()));
        }
        if self.route.is_some() != self.fare.is_some() {
            return Err(AppError::InvalidInput(
                "fare must be present exactly when route is present".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideEvent {
    pub ride_id: Uuid,
    pub rider_id: String,
    pub state: RideState,
    pub driver_id: Option<Uuid>,
    pub actor: Option<Actor>,
    pub at: DateTime<Utc>,
}

impl RideEvent {
    pub fn from_ride(ride: &Ride, actor: Option<Actor>) -> Self {
        Self {
            ride_id: ride.id,
            rider_id: ride.rider_id.clone(),
            state: ride.state,
            driver_id: ride.assigned_driver_id,
            actor,
            at: ride.updated_at,
        }
    }
}
