//! Rider-side ride request state machine.
//!
//! A [`RideSession`] sequences geocode, route, price and dispatch for one rider.
//! Every provider call is tagged with the session's sequence number at the time
//! it was issued; a result is applied only if that number is still current, so
//! a newer search or a cancellation makes earlier in-flight calls inert.
//!
//! State lives behind a mutex that is only held for short synchronous
//! sections. It is never held across an `.await`.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::dispatcher::{AcceptOutcome, RideDispatcher};
use crate::engine::pricing::PricingEngine;
use crate::error::AppError;
use crate::geo::provider::{GeoRouting, LocationProvider};
use crate::models::coordinate::Coordinate;
use crate::models::driver::Driver;
use crate::models::fare::{Fare, VehicleClass};
use crate::models::ride::{Actor, FailureReason, Ride, RideDraft, RideState};
use crate::models::route::RoutePlan;
use crate::observability::metrics::Metrics;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub search_radius_meters: f64,
    pub candidate_limit: usize,
    pub provider_timeout: Duration,
    pub event_buffer_size: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            search_radius_meters: 5_000.0,
            candidate_limit: 10,
            provider_timeout: Duration::from_secs(5),
            event_buffer_size: 64,
        }
    }
}

/// The session as a value: everything the UI needs to render it.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub rider_id: String,
    pub seq: u64,
    pub state: RideState,
    pub pickup: Option<Coordinate>,
    pub destination_text: String,
    pub destination: Option<Coordinate>,
    pub route: Option<RoutePlan>,
    pub fare: Option<Fare>,
    pub vehicle_class: VehicleClass,
    pub ride_id: Option<Uuid>,
    pub candidates: Vec<Driver>,
    pub assigned_driver_id: Option<Uuid>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionPayload {
    StateChanged,
    Destination { destination: Coordinate },
    Quote { route: RoutePlan, fare: Fare },
    Candidates { drivers: Vec<Driver> },
    NoDriversFound,
    DriverUnavailable { driver_id: Uuid },
    DriverAssigned { driver_id: Uuid },
    Error { error: String, retryable: bool },
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionEvent {
    pub session_id: Uuid,
    pub seq: u64,
    pub state: RideState,
    pub payload: SessionPayload,
}

pub struct RideSession {
    id: Uuid,
    inner: Mutex<SessionSnapshot>,
    geo: Arc<dyn GeoRouting>,
    pricing: Arc<PricingEngine>,
    dispatcher: Arc<RideDispatcher>,
    settings: SessionSettings,
    metrics: Metrics,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl RideSession {
    pub fn new(
        rider_id: &str,
        geo: Arc<dyn GeoRouting>,
        pricing: Arc<PricingEngine>,
        dispatcher: Arc<RideDispatcher>,
        settings: SessionSettings,
        metrics: Metrics,
    ) -> Result<Self, AppError> {
        if rider_id.trim().is_empty() {
            return Err(AppError::InvalidInput("rider_id cannot be empty".to_string()));
        }

        let id = Uuid::new_v4();
        let (events_tx, _unused_rx) = broadcast::channel(settings.event_buffer_size.max(1));

        Ok(Self {
            id,
            inner: Mutex::new(SessionSnapshot {
                id,
                rider_id: rider_id.trim().to_string(),
                seq: 0,
                state: RideState::Idle,
                pickup: None,
                destination_text: String::new(),
                destination: None,
                route: None,
                fare: None,
                vehicle_class: VehicleClass::Bike,
                ride_id: None,
                candidates: Vec::new(),
                assigned_driver_id: None,
                last_error: None,
            }),
            geo,
            pricing,
            dispatcher,
            settings,
            metrics,
            events_tx,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    pub fn snapshot(&self) -> Result<SessionSnapshot, AppError> {
        Ok(self.lock()?.clone())
    }

    pub fn set_pickup(&self, pickup: Coordinate) -> Result<SessionSnapshot, AppError> {
        let mut s = self.lock()?;
        if s.state != RideState::Idle {
            return Err(invalid(&s, "set pickup"));
        }
        s.pickup = Some(pickup);
        self.emit(&s, SessionPayload::StateChanged);
        Ok(s.clone())
    }

    /// Reads the device position and uses it as pickup. A denial is surfaced
    /// and the session stays `Idle`.
    pub async fn locate(&self, provider: &dyn LocationProvider) -> Result<SessionSnapshot, AppError> {
        {
            let s = self.lock()?;
            if s.state != RideState::Idle {
                return Err(invalid(&s, "locate"));
            }
        }

        match provider.current_position().await {
            Ok(position) => self.set_pickup(position),
            Err(err) => {
                let mut s = self.lock()?;
                s.last_error = Some(err.to_string());
                self.emit(&s, error_payload(&err));
                warn!(session_id = %self.id, error = %err, "location unavailable");
                Err(err)
            }
        }
    }

    /// Geocodes `text`, routes from the pickup and prices the route.
    ///
    /// A newer submission or a cancellation supersedes this call: its results
    /// are then discarded and the current snapshot is returned unchanged.
    pub async fn submit_destination(&self, text: &str) -> Result<SessionSnapshot, AppError> {
        let (seq, pickup, query) = {
            let mut s = self.lock()?;
            let editable = matches!(
                s.state,
                RideState::Idle
                    | RideState::Geocoding
                    | RideState::Routing
                    | RideState::Quoted
                    | RideState::Failed(_)
            );
            if !editable || s.ride_id.is_some() {
                return Err(invalid(&s, "change destination"));
            }

            s.seq += 1;
            s.destination_text = text.to_string();
            s.destination = None;
            s.route = None;
            s.fare = None;
            s.last_error = None;

            let query = text.trim();
            if query.is_empty() {
                let err = AppError::InvalidInput("destination text is empty".to_string());
                return Err(self.fail_search(&mut s, err));
            }
            let Some(pickup) = s.pickup else {
                let err = AppError::InvalidInput("pickup location unknown".to_string());
                return Err(self.fail_search(&mut s, err));
            };

            s.state = RideState::Geocoding;
            self.emit(&s, SessionPayload::StateChanged);
            debug!(session_id = %self.id, seq = s.seq, "geocoding destination");
            (s.seq, pickup, query.to_string())
        };

        let geocoded = self.timed("geocode", self.geo.geocode(&query)).await;

        let destination = {
            let mut s = self.lock()?;
            if s.seq != seq {
                debug!(session_id = %self.id, seq, current = s.seq, "discarded stale geocode");
                return Ok(s.clone());
            }
            match geocoded {
                Ok(destination) => {
                    s.destination = Some(destination);
                    s.state = RideState::Routing;
                    self.emit(&s, SessionPayload::Destination { destination });
                    destination
                }
                Err(err) => return Err(self.fail_search(&mut s, err)),
            }
        };

        let routed = self.timed("route", self.geo.route(pickup, destination)).await;

        let mut s = self.lock()?;
        if s.seq != seq {
            debug!(session_id = %self.id, seq, current = s.seq, "discarded stale route");
            return Ok(s.clone());
        }
        let priced = routed.and_then(|route| {
            let fare = self.pricing.price(route.distance_meters(), s.vehicle_class)?;
            Ok((route, fare))
        });
        match priced {
            Ok((route, fare)) => {
                s.route = Some(route.clone());
                s.fare = Some(fare.clone());
                s.state = RideState::Quoted;
                self.emit(&s, SessionPayload::Quote { route, fare });
                info!(session_id = %self.id, seq, "ride quoted");
                Ok(s.clone())
            }
            Err(err) => Err(self.fail_search(&mut s, err)),
        }
    }

    /// Changes the vehicle class. In `Quoted` the fare is recomputed on the spot.
    pub fn select_vehicle_class(&self, vehicle_class: VehicleClass) -> Result<SessionSnapshot, AppError> {
        let mut s = self.lock()?;
        let selectable = matches!(
            s.state,
            RideState::Idle
                | RideState::Geocoding
                | RideState::Routing
                | RideState::Quoted
                | RideState::Failed(_)
        );
        if !selectable || s.ride_id.is_some() {
            return Err(invalid(&s, "change vehicle class"));
        }

        if s.state == RideState::Quoted {
            let route = s
                .route
                .clone()
                .ok_or_else(|| AppError::Internal("quoted session without route".to_string()))?;
            let fare = self.pricing.price(route.distance_meters(), vehicle_class)?;
            s.vehicle_class = vehicle_class;
            s.fare = Some(fare.clone());
            self.emit(&s, SessionPayload::Quote { route, fare });
        } else {
            s.vehicle_class = vehicle_class;
            self.emit(&s, SessionPayload::StateChanged);
        }

        Ok(s.clone())
    }

    /// Posts the quoted ride and searches for drivers around the pickup.
    pub fn confirm_ride(&self) -> Result<SessionSnapshot, AppError> {
        let mut s = self.lock()?;
        if s.state != RideState::Quoted || s.ride_id.is_some() {
            return Err(invalid(&s, "confirm ride"));
        }
        let (Some(pickup), Some(route), Some(fare)) = (s.pickup, s.route.clone(), s.fare.clone())
        else {
            return Err(AppError::Internal("quoted session is incomplete".to_string()));
        };

        s.state = RideState::Dispatching;
        self.emit(&s, SessionPayload::StateChanged);

        let draft = RideDraft {
            rider_id: s.rider_id.clone(),
            pickup,
            destination_text: s.destination_text.clone(),
            destination: s.destination,
            route: Some(route),
            fare: Some(fare),
            vehicle_class: s.vehicle_class,
        };
        match self.dispatcher.post(draft) {
            Ok(ride_id) => s.ride_id = Some(ride_id),
            Err(err) => return Err(self.fail_dispatch(&mut s, err)),
        }

        self.search(&mut s)
    }

    /// Re-runs the driver search for a ride that is waiting for a driver.
    pub fn research_drivers(&self) -> Result<SessionSnapshot, AppError> {
        let mut s = self.lock()?;
        if s.state != RideState::WaitingForDriver {
            return Err(invalid(&s, "search drivers"));
        }
        s.state = RideState::Dispatching;
        self.emit(&s, SessionPayload::StateChanged);
        self.search(&mut s)
    }

    /// A driver accepts. When the driver lost a race the session stays in
    /// `WaitingForDriver` and that driver is dropped from the candidates.
    pub fn driver_accepts(&self, driver_id: Uuid) -> Result<AcceptOutcome, AppError> {
        let mut s = self.lock()?;
        let ride_id = match (s.state, s.ride_id) {
            (RideState::WaitingForDriver, Some(ride_id)) => ride_id,
            _ => return Err(invalid(&s, "accept driver")),
        };

        let outcome = self.dispatcher.accept(ride_id, driver_id)?;
        match &outcome {
            AcceptOutcome::Accepted { ride } => {
                self.apply_ride(&mut s, ride);
            }
            AcceptOutcome::AlreadyTaken => {
                s.candidates.retain(|driver| driver.id != driver_id);
                self.emit(&s, SessionPayload::DriverUnavailable { driver_id });
                // Another driver may have claimed the ride itself.
                let ride = self.dispatcher.get(ride_id)?;
                self.apply_ride(&mut s, &ride);
            }
        }

        Ok(outcome)
    }

    pub fn driver_departs(&self) -> Result<SessionSnapshot, AppError> {
        let mut s = self.lock()?;
        let (ride_id, driver_id) = match (s.state, s.ride_id, s.assigned_driver_id) {
            (RideState::Accepted, Some(ride_id), Some(driver_id)) => (ride_id, driver_id),
            _ => return Err(invalid(&s, "depart")),
        };
        let ride = self.dispatcher.depart(ride_id, driver_id)?;
        self.apply_ride(&mut s, &ride);
        Ok(s.clone())
    }

    pub fn driver_completes(&self) -> Result<SessionSnapshot, AppError> {
        let mut s = self.lock()?;
        let (ride_id, driver_id) = match (s.state, s.ride_id, s.assigned_driver_id) {
            (RideState::EnRoute, Some(ride_id), Some(driver_id)) => (ride_id, driver_id),
            _ => return Err(invalid(&s, "complete")),
        };
        let ride = self.dispatcher.complete(ride_id, driver_id)?;
        self.apply_ride(&mut s, &ride);
        Ok(s.clone())
    }

    /// Cancels the session. Effective immediately: in-flight provider calls
    /// become stale and a reserved driver is released before this returns.
    ///
    /// Every non-terminal state is cancellable except `EnRoute`. Once the
    /// driver has departed, the ride only cancels through the dispatcher,
    /// which accepts cancellation in `Dispatching`, `WaitingForDriver` and
    /// `Accepted`; here it fails with `InvalidTransition` and the session
    /// keeps following the trip.
    pub fn cancel(&self) -> Result<SessionSnapshot, AppError> {
        let mut s = self.lock()?;
        if s.state.is_terminal() {
            return Err(invalid(&s, "cancel"));
        }

        if let Some(ride_id) = s.ride_id {
            let ride = self.dispatcher.get(ride_id)?;
            if ride.state != RideState::Cancelled {
                self.dispatcher.cancel(ride_id, Actor::Rider)?;
            }
        }

        s.seq += 1;
        s.state = RideState::Cancelled;
        s.candidates.clear();
        s.assigned_driver_id = None;
        self.emit(&s, SessionPayload::StateChanged);
        info!(session_id = %self.id, "session cancelled");

        Ok(s.clone())
    }

    /// Pulls changes made on the dispatcher side, e.g. a driver accepting from
    /// the driver app or the acceptance timeout cancelling the ride.
    pub fn sync(&self) -> Result<SessionSnapshot, AppError> {
        let mut s = self.lock()?;
        if let Some(ride_id) = s.ride_id {
            let ride = self.dispatcher.get(ride_id)?;
            self.apply_ride(&mut s, &ride);
        }
        Ok(s.clone())
    }

    fn search(&self, s: &mut SessionSnapshot) -> Result<SessionSnapshot, AppError> {
        let ride_id = s
            .ride_id
            .ok_or_else(|| AppError::Internal("search without a posted ride".to_string()))?;

        let drivers = match self.dispatcher.find_candidates(
            ride_id,
            self.settings.search_radius_meters,
            self.settings.candidate_limit,
        ) {
            Ok(drivers) => drivers,
            Err(err) => {
                // The dispatcher side may have moved on (accepted, cancelled).
                let ride = self.dispatcher.get(ride_id)?;
                self.apply_ride(s, &ride);
                return Err(err);
            }
        };

        s.state = RideState::WaitingForDriver;
        s.candidates = drivers.clone();
        if drivers.is_empty() {
            s.last_error = Some("no drivers nearby".to_string());
            self.emit(s, SessionPayload::NoDriversFound);
            info!(session_id = %self.id, ride_id = %ride_id, "no drivers found");
        } else {
            s.last_error = None;
            self.emit(s, SessionPayload::Candidates { drivers });
        }

        Ok(s.clone())
    }

    fn apply_ride(&self, s: &mut SessionSnapshot, ride: &Ride) {
        let adopt = matches!(
            ride.state,
            RideState::Accepted | RideState::EnRoute | RideState::Completed | RideState::Cancelled
        );
        if !adopt || s.state == ride.state {
            return;
        }

        s.state = ride.state;
        s.assigned_driver_id = ride.assigned_driver_id;
        if ride.state == RideState::Cancelled {
            s.seq += 1;
            s.candidates.clear();
        }

        match ride.assigned_driver_id {
            Some(driver_id) if ride.state == RideState::Accepted => {
                self.emit(s, SessionPayload::DriverAssigned { driver_id });
            }
            _ => self.emit(s, SessionPayload::StateChanged),
        }
        info!(session_id = %self.id, ride_id = %ride.id, state = ?ride.state, "session follows ride");
    }

    /// Surfaces a search failure as `Failed` and resets to `Idle`, leaving no
    /// destination, route or fare behind.
    fn fail_search(&self, s: &mut SessionSnapshot, err: AppError) -> AppError {
        s.destination = None;
        s.route = None;
        s.fare = None;
        s.last_error = Some(err.to_string());
        s.state = RideState::Failed(FailureReason::from_error(&err));
        self.emit(s, error_payload(&err));
        warn!(session_id = %self.id, seq = s.seq, error = %err, "destination search failed");

        s.state = RideState::Idle;
        self.emit(s, SessionPayload::StateChanged);
        err
    }

    /// Surfaces a dispatch failure and returns to `Quoted` with the fare intact.
    fn fail_dispatch(&self, s: &mut SessionSnapshot, err: AppError) -> AppError {
        s.last_error = Some(err.to_string());
        s.state = RideState::Failed(FailureReason::from_error(&err));
        self.emit(s, error_payload(&err));
        warn!(session_id = %self.id, error = %err, "dispatch failed");

        s.state = RideState::Quoted;
        self.emit(s, SessionPayload::StateChanged);
        err
    }

    async fn timed<T>(
        &self,
        call: &'static str,
        fut: impl Future<Output = Result<T, AppError>>,
    ) -> Result<T, AppError> {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.settings.provider_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AppError::ProviderUnavailable(format!(
                "{call} timed out after {:?}",
                self.settings.provider_timeout
            ))),
        };

        let outcome = if result.is_ok() { "success" } else { "error" };
        self.metrics
            .provider_latency_seconds
            .with_label_values(&[call, outcome])
            .observe(start.elapsed().as_secs_f64());

        result
    }

    fn lock(&self) -> Result<MutexGuard<'_, SessionSnapshot>, AppError> {
        self.inner
            .lock()
            .map_err(|_| AppError::Internal(format!("session {} state poisoned", self.id)))
    }

    fn emit(&self, s: &SessionSnapshot, payload: SessionPayload) {
        let _ = self.events_tx.send(SessionEvent {
            session_id: self.id,
            seq: s.seq,
            state: s.state,
            payload,
        });
    }
}

fn invalid(s: &SessionSnapshot, action: &str) -> AppError {
    AppError::InvalidTransition(format!("cannot {action} while {:?}", s.state))
}

fn error_payload(err: &AppError) -> SessionPayload {
    SessionPayload::Error {
        error: err.to_string(),
        retryable: err.is_retryable(),
    }
}
