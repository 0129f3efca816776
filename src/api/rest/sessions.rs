use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::dispatcher::AcceptOutcome;
use crate::engine::session::SessionSnapshot;
use crate::error::AppError;
use crate::models::coordinate::Coordinate;
use crate::models::fare::VehicleClass;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sessions", post(open_session))
        .route("/sessions/:id", get(get_session))
        .route("/sessions/:id/destination", post(submit_destination))
        .route("/sessions/:id/vehicle-class", put(select_vehicle_class))
        .route("/sessions/:id/confirm", post(confirm_ride))
        .route("/sessions/:id/search", post(research_drivers))
        .route("/sessions/:id/accept", post(driver_accepts))
        .route("/sessions/:id/depart", post(driver_departs))
        .route("/sessions/:id/complete", post(driver_completes))
        .route("/sessions/:id/cancel", post(cancel_session))
}

#[derive(Deserialize)]
pub struct OpenSessionRequest {
    pub rider_id: String,
    pub pickup: Option<Coordinate>,
}

#[derive(Deserialize)]
pub struct DestinationRequest {
    pub text: String,
}

#[derive(Deserialize)]
pub struct VehicleClassRequest {
    pub vehicle_class: VehicleClass,
}

#[derive(Deserialize)]
pub struct AcceptRequest {
    pub driver_id: Uuid,
}

async fn open_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<OpenSessionRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state.open_session(&payload.rider_id)?;
    let snapshot = match payload.pickup {
        Some(pickup) => session.set_pickup(pickup)?,
        None => session.snapshot()?,
    };

    Ok(Json(snapshot))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let snapshot = state.session(id)?.sync()?;
    state.retire_if_finished(&snapshot);
    Ok(Json(snapshot))
}

async fn submit_destination(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DestinationRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state.session(id)?;
    Ok(Json(session.submit_destination(&payload.text).await?))
}

async fn select_vehicle_class(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<VehicleClassRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(state.session(id)?.select_vehicle_class(payload.vehicle_class)?))
}

async fn confirm_ride(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(state.session(id)?.confirm_ride()?))
}

async fn research_drivers(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(state.session(id)?.research_drivers()?))
}

async fn driver_accepts(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AcceptRequest>,
) -> Result<Json<AcceptOutcome>, AppError> {
    Ok(Json(state.session(id)?.driver_accepts(payload.driver_id)?))
}

async fn driver_departs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(state.session(id)?.driver_departs()?))
}

async fn driver_completes(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let snapshot = state.session(id)?.driver_completes()?;
    state.retire_if_finished(&snapshot);
    Ok(Json(snapshot))
}

async fn cancel_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let snapshot = state.session(id)?.cancel()?;
    state.retire_if_finished(&snapshot);
    Ok(Json(snapshot))
}
