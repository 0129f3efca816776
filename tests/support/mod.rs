#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ride_orchestrator::engine::conversation::ConversationLog;
use ride_orchestrator::engine::dispatcher::RideDispatcher;
use ride_orchestrator::engine::driver_pool::DriverPool;
use ride_orchestrator::engine::pricing::PricingEngine;
use ride_orchestrator::engine::session::{RideSession, SessionSettings};
use ride_orchestrator::error::AppError;
use ride_orchestrator::geo::provider::GeoRouting;
use ride_orchestrator::models::coordinate::Coordinate;
use ride_orchestrator::models::route::RoutePlan;
use ride_orchestrator::observability::metrics::Metrics;
use tokio::sync::Notify;

pub fn coord(lat: f64, lng: f64) -> Coordinate {
    Coordinate::new(lat, lng).unwrap()
}

pub fn kathmandu() -> Coordinate {
    coord(27.7172, 85.3240)
}

pub fn patan() -> Coordinate {
    coord(27.7000, 85.3000)
}

/// Scripted geocoder/router. Calls for a gated query block until the gate is
/// notified, which lets tests decide the order in which responses resolve.
pub struct FakeGeo {
    places: Mutex<HashMap<String, Result<Coordinate, AppError>>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    started: Mutex<Vec<String>>,
    route: Mutex<Result<f64, AppError>>,
    route_gate: Mutex<Option<Arc<Notify>>>,
    routes_started: Mutex<usize>,
}

impl FakeGeo {
    pub fn new() -> Self {
        Self {
            places: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            started: Mutex::new(Vec::new()),
            route: Mutex::new(Ok(2000.0)),
            route_gate: Mutex::new(None),
            routes_started: Mutex::new(0),
        }
    }

    pub fn with_place(self, text: &str, at: Coordinate) -> Self {
        self.places.lock().unwrap().insert(text.to_string(), Ok(at));
        self
    }

    pub fn with_failing_place(self, text: &str, err: AppError) -> Self {
        self.places.lock().unwrap().insert(text.to_string(), Err(err));
        self
    }

    pub fn gate(&self, text: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(text.to_string(), gate.clone());
        gate
    }

    pub fn gate_route(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.route_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn set_route(&self, result: Result<f64, AppError>) {
        *self.route.lock().unwrap() = result;
    }

    pub fn geocode_started(&self, text: &str) -> bool {
        self.started.lock().unwrap().iter().any(|q| q == text)
    }

    pub fn routes_started(&self) -> usize {
        *self.routes_started.lock().unwrap()
    }
}

#[async_trait]
impl GeoRouting for FakeGeo {
    async fn geocode(&self, text: &str) -> Result<Coordinate, AppError> {
        let query = text.trim().to_string();
        self.started.lock().unwrap().push(query.clone());

        let gate = self.gates.lock().unwrap().get(&query).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        self.places
            .lock()
            .unwrap()
            .get(&query)
            .cloned()
            .unwrap_or_else(|| Err(AppError::NotFound(format!("no match for {query}"))))
    }

    async fn route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<RoutePlan, AppError> {
        *self.routes_started.lock().unwrap() += 1;

        let gate = self.route_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let distance = self.route.lock().unwrap().clone()?;
        RoutePlan::new(vec![origin, destination], distance)
    }
}

pub fn dispatcher() -> Arc<RideDispatcher> {
    Arc::new(RideDispatcher::new(
        Arc::new(DriverPool::new()),
        Arc::new(ConversationLog::new(64)),
        Metrics::new(),
        64,
    ))
}

pub fn settings() -> SessionSettings {
    SessionSettings {
        search_radius_meters: 5_000.0,
        candidate_limit: 10,
        provider_timeout: Duration::from_secs(2),
        event_buffer_size: 64,
    }
}

pub fn session_with(
    rider: &str,
    geo: Arc<FakeGeo>,
    dispatcher: Arc<RideDispatcher>,
    settings: SessionSettings,
) -> Arc<RideSession> {
    Arc::new(
        RideSession::new(
            rider,
            geo,
            Arc::new(PricingEngine::default()),
            dispatcher,
            settings,
            Metrics::new(),
        )
        .unwrap(),
    )
}

/// Yields to the runtime until `condition` holds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
