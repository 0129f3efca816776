use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::dispatcher::AcceptOutcome;
use crate::error::AppError;
use crate::models::driver::Driver;
use crate::models::ride::{Actor, Ride, RideDraft};
use crate::models::route::RoutePlan;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rides", post(post_ride).get(list_rides))
        .route("/rides/:id", get(get_ride))
        .route("/rides/:id/status", put(update_ride_status))
        .route("/rides/:id/candidates", post(find_candidates))
        .route("/rides/:id/approach", get(approach_route))
}

#[derive(Serialize)]
pub struct PostRideResponse {
    pub id: Uuid,
}

#[derive(Deserialize)]
pub struct ListRidesQuery {
    pub rider_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub enum StatusChange {
    Accepted,
    EnRoute,
    Completed,
    Cancelled,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: StatusChange,
    pub driver_id: Option<Uuid>,
    pub actor: Option<Actor>,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum StatusResponse {
    Accept(AcceptOutcome),
    Ride(Ride),
}

#[derive(Deserialize, Default)]
pub struct CandidatesRequest {
    pub radius_meters: Option<f64>,
    pub limit: Option<usize>,
}

async fn post_ride(
    State(state): State<Arc<AppState>>,
    Json(draft): Json<RideDraft>,
) -> Result<Json<PostRideResponse>, AppError> {
    let id = state.dispatcher.post(draft)?;
    Ok(Json(PostRideResponse { id }))
}

async fn list_rides(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListRidesQuery>,
) -> Json<Vec<Ride>> {
    Json(state.dispatcher.list(query.rider_id.as_deref()))
}

async fn get_ride(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(state.dispatcher.get(id)?))
}

async fn update_ride_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<StatusResponse>, AppError> {
    let driver_id = || {
        payload
            .driver_id
            .ok_or_else(|| AppError::InvalidInput("driver_id is required".to_string()))
    };

    let response = match payload.status {
        StatusChange::Accepted => StatusResponse::Accept(state.dispatcher.accept(id, driver_id()?)?),
        StatusChange::EnRoute => StatusResponse::Ride(state.dispatcher.depart(id, driver_id()?)?),
        StatusChange::Completed => {
            StatusResponse::Ride(state.dispatcher.complete(id, driver_id()?)?)
        }
        StatusChange::Cancelled => StatusResponse::Ride(
            state
                .dispatcher
                .cancel(id, payload.actor.unwrap_or(Actor::Rider))?,
        ),
    };

    Ok(Json(response))
}

async fn find_candidates(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Option<Json<CandidatesRequest>>,
) -> Result<Json<Vec<Driver>>, AppError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let drivers = state.dispatcher.find_candidates(
        id,
        request
            .radius_meters
            .unwrap_or(state.session_settings.search_radius_meters),
        request
            .limit
            .unwrap_or(state.session_settings.candidate_limit),
    )?;

    Ok(Json(drivers))
}

/// Route from the assigned driver's last known position to the pickup.
async fn approach_route(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RoutePlan>, AppError> {
    let ride = state.dispatcher.get(id)?;
    let driver_id = ride.assigned_driver_id.ok_or_else(|| {
        AppError::InvalidTransition(format!("ride {id} has no assigned driver"))
    })?;
    let driver = state
        .pool
        .get(driver_id)
        .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

    let timeout = state.session_settings.provider_timeout;
    let plan = tokio::time::timeout(timeout, state.geo.route(driver.location, ride.pickup))
        .await
        .map_err(|_| AppError::ProviderUnavailable("route timed out".to_string()))??;

    Ok(Json(plan))
}
