use async_trait::async_trait;

use crate::error::AppError;
use crate::models::coordinate::Coordinate;
use crate::models::route::RoutePlan;

/// Geocoding and routing as seen by the core: pure calls with latency and failure.
///
/// Implementations never retry. `geocode` fails with `InvalidInput` for blank
/// text, `NotFound` for zero matches and `ProviderUnavailable` for transport
/// errors; `route` fails with `NoRoute` or `ProviderUnavailable`.
#[async_trait]
pub trait GeoRouting: Send + Sync {
    async fn geocode(&self, text: &str) -> Result<Coordinate, AppError>;

    async fn route(&self, origin: Coordinate, destination: Coordinate)
    -> Result<RoutePlan, AppError>;
}

/// Device position source. May fail with `PermissionDenied`.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_position(&self) -> Result<Coordinate, AppError>;
}

/// A location provider that always reports the same fix, or a denial.
#[derive(Debug, Clone)]
pub struct FixedLocation(pub Option<Coordinate>);

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn current_position(&self) -> Result<Coordinate, AppError> {
        self.0.ok_or(AppError::PermissionDenied)
    }
}
