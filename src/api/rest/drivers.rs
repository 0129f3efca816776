use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::coordinate::Coordinate;
use crate::models::driver::Driver;
use crate::models::fare::VehicleClass;
use crate::models::ride::Ride;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(register_driver).get(list_drivers))
        .route("/drivers/nearby", get(nearby_drivers))
        .route("/drivers/:id/location", patch(update_driver_location))
        .route("/drivers/:id/availability", patch(update_driver_availability))
        .route("/drivers/:id/open-rides", get(open_rides))
}

#[derive(Deserialize)]
pub struct RegisterDriverRequest {
    pub display_name: String,
    pub phone: String,
    pub vehicle_class: VehicleClass,
    pub location: Coordinate,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: Coordinate,
}

#[derive(Deserialize)]
pub struct UpdateAvailabilityRequest {
    pub online: bool,
}

#[derive(Deserialize)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lng: f64,
    pub radius: Option<f64>,
    pub limit: Option<usize>,
    pub vehicle_class: Option<String>,
}

#[derive(Deserialize)]
pub struct OpenRidesQuery {
    pub radius: Option<f64>,
}

async fn register_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    let driver = state.pool.register(
        &payload.display_name,
        &payload.phone,
        payload.vehicle_class,
        payload.location,
    )?;
    state
        .metrics
        .drivers_available
        .set(state.pool.available_count() as i64);

    Ok(Json(driver))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<Driver>> {
    Json(state.pool.list())
}

async fn nearby_drivers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<Vec<Driver>>, AppError> {
    let point = Coordinate::new(query.lat, query.lng)?;
    let vehicle_class = query
        .vehicle_class
        .as_deref()
        .map(str::parse::<VehicleClass>)
        .transpose()?;

    let drivers = state.pool.nearby(
        &point,
        query
            .radius
            .unwrap_or(state.session_settings.search_radius_meters),
        query.limit.unwrap_or(state.session_settings.candidate_limit),
        vehicle_class,
    );

    Ok(Json(drivers))
}

async fn update_driver_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Driver>, AppError> {
    Ok(Json(state.pool.update_location(id, payload.location)?))
}

async fn update_driver_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAvailabilityRequest>,
) -> Result<Json<Driver>, AppError> {
    let driver = state.pool.set_online(id, payload.online)?;
    state
        .metrics
        .drivers_available
        .set(state.pool.available_count() as i64);

    Ok(Json(driver))
}

async fn open_rides(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<OpenRidesQuery>,
) -> Result<Json<Vec<Ride>>, AppError> {
    let driver = state
        .pool
        .get(id)
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

    let rides = state
        .dispatcher
        .open_rides_near(
            &driver.location,
            query
                .radius
                .unwrap_or(state.session_settings.search_radius_meters),
        )
        .into_iter()
        .filter(|ride| ride.vehicle_class == driver.vehicle_class)
        .collect();

    Ok(Json(rides))
}
