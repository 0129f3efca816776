use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::conversation::ConversationLog;
use crate::engine::driver_pool::DriverPool;
use crate::error::AppError;
use crate::geo::haversine_m;
use crate::models::coordinate::Coordinate;
use crate::models::driver::Driver;
use crate::models::ride::{Actor, Ride, RideDraft, RideEvent, RideState};
use crate::observability::metrics::Metrics;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AcceptOutcome {
    Accepted { ride: Ride },
    AlreadyTaken,
}

/// Matches posted rides to drivers.
///
/// Lock order is always ride entry, then driver entry. No lock is held across
/// an await point; every method here is synchronous.
pub struct RideDispatcher {
    rides: DashMap<Uuid, Ride>,
    active_by_rider: DashMap<String, Uuid>,
    pool: Arc<DriverPool>,
    conversations: Arc<ConversationLog>,
    events_tx: broadcast::Sender<RideEvent>,
    metrics: Metrics,
}

impl RideDispatcher {
    pub fn new(
        pool: Arc<DriverPool>,
        conversations: Arc<ConversationLog>,
        metrics: Metrics,
        event_buffer_size: usize,
    ) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size.max(1));

        Self {
            rides: DashMap::new(),
            active_by_rider: DashMap::new(),
            pool,
            conversations,
            events_tx,
            metrics,
        }
    }

    pub fn pool(&self) -> &Arc<DriverPool> {
        &self.pool
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RideEvent> {
        self.events_tx.subscribe()
    }

    /// Stores a ride as `Dispatching` under a freshly assigned id. A rider may
    /// hold only one non-terminal ride.
    pub fn post(&self, draft: RideDraft) -> Result<Uuid, AppError> {
        draft.validate()?;

        let ride_id = match self.active_by_rider.entry(draft.rider_id.clone()) {
            Entry::Occupied(existing) => {
                warn!(
                    rider_id = %draft.rider_id,
                    active_ride = %existing.get(),
                    "rejected duplicate active ride"
                );
                return Err(AppError::DuplicateActiveRide(draft.rider_id));
            }
            Entry::Vacant(slot) => {
                let ride_id = Uuid::new_v4();
                let now = Utc::now();
                let ride = Ride {
                    id: ride_id,
                    rider_id: draft.rider_id.clone(),
                    state: RideState::Dispatching,
                    pickup: draft.pickup,
                    destination_text: draft.destination_text,
                    destination: draft.destination,
                    route: draft.route,
                    fare: draft.fare,
                    vehicle_class: draft.vehicle_class,
                    assigned_driver_id: None,
                    created_at: now,
                    updated_at: now,
                };
                // The ride is stored before the rider slot points at it.
                self.rides.insert(ride_id, ride.clone());
                slot.insert(ride_id);
                self.publish(&ride, Some(Actor::Rider));
                ride_id
            }
        };

        self.metrics.rides_posted_total.inc();
        self.metrics.active_rides.set(self.active_by_rider.len() as i64);
        info!(ride_id = %ride_id, rider_id = %draft.rider_id, "ride posted");

        Ok(ride_id)
    }

    pub fn get(&self, ride_id: Uuid) -> Result<Ride, AppError> {
        self.rides
            .get(&ride_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ride_not_found(ride_id))
    }

    pub fn list(&self, rider_id: Option<&str>) -> Vec<Ride> {
        let mut rides: Vec<Ride> = self
            .rides
            .iter()
            .filter(|entry| rider_id.is_none_or(|rider| entry.rider_id == rider))
            .map(|entry| entry.value().clone())
            .collect();
        rides.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        rides
    }

    /// Rides assigned to a driver with the given display name.
    pub fn rides_for_driver_name(&self, display_name: &str) -> Vec<Ride> {
        let driver_ids: Vec<Uuid> = self
            .pool
            .list()
            .into_iter()
            .filter(|driver| driver.display_name == display_name)
            .map(|driver| driver.id)
            .collect();

        self.list(None)
            .into_iter()
            .filter(|ride| {
                ride.assigned_driver_id
                    .is_some_and(|driver_id| driver_ids.contains(&driver_id))
            })
            .collect()
    }

    /// Searches available drivers around the ride's pickup, matching its
    /// vehicle class, and opens the ride for offers. Calling it again from
    /// `WaitingForDriver` is a manual re-search.
    pub fn find_candidates(
        &self,
        ride_id: Uuid,
        radius_meters: f64,
        limit: usize,
    ) -> Result<Vec<Driver>, AppError> {
        let (pickup, vehicle_class) = {
            let mut ride = self
                .rides
                .get_mut(&ride_id)
                .ok_or_else(|| ride_not_found(ride_id))?;
            let state = ride.state;
            match state {
                RideState::Dispatching => {}
                RideState::WaitingForDriver => {
                    ride.state = RideState::Dispatching;
                    ride.updated_at = Utc::now();
                }
                other => {
                    return Err(AppError::InvalidTransition(format!(
                        "ride {ride_id} cannot search drivers while {other:?}"
                    )));
                }
            }
            (ride.pickup, ride.vehicle_class)
        };

        let candidates = self
            .pool
            .nearby(&pickup, radius_meters, limit, Some(vehicle_class));

        if let Some(mut ride) = self.rides.get_mut(&ride_id) {
            if ride.state == RideState::Dispatching {
                ride.state = RideState::WaitingForDriver;
                ride.updated_at = Utc::now();
                self.publish(&ride, Some(Actor::System));
            }
        }

        self.metrics.drivers_available.set(self.pool.available_count() as i64);
        info!(ride_id = %ride_id, candidates = candidates.len(), "driver search finished");

        Ok(candidates)
    }

    /// Rides still waiting for a driver within `radius_meters` of `point`,
    /// nearest pickup first.
    pub fn open_rides_near(&self, point: &Coordinate, radius_meters: f64) -> Vec<Ride> {
        let mut open: Vec<(f64, Ride)> = self
            .rides
            .iter()
            .filter(|entry| entry.state == RideState::WaitingForDriver)
            .filter_map(|entry| {
                let distance = haversine_m(point, &entry.pickup);
                (distance <= radius_meters).then(|| (distance, entry.value().clone()))
            })
            .collect();

        open.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
        open.into_iter().map(|(_, ride)| ride).collect()
    }

    /// A driver claims a ride. Exactly one concurrent caller wins; the others
    /// get `AlreadyTaken` and stay available for other rides.
    pub fn accept(&self, ride_id: Uuid, driver_id: Uuid) -> Result<AcceptOutcome, AppError> {
        let mut ride = self
            .rides
            .get_mut(&ride_id)
            .ok_or_else(|| ride_not_found(ride_id))?;

        let state = ride.state;
        match state {
            RideState::Dispatching | RideState::WaitingForDriver => {}
            RideState::Accepted | RideState::EnRoute | RideState::Completed => {
                drop(ride);
                return Ok(self.lost_race(ride_id, driver_id, "ride already assigned"));
            }
            other => {
                return Err(AppError::InvalidTransition(format!(
                    "ride {ride_id} cannot be accepted while {other:?}"
                )));
            }
        }

        if self.pool.get(driver_id).is_none() {
            return Err(AppError::NotFound(format!("driver {driver_id} not found")));
        }

        if !self.pool.reserve(driver_id) {
            drop(ride);
            return Ok(self.lost_race(ride_id, driver_id, "driver no longer available"));
        }

        ride.state = RideState::Accepted;
        ride.assigned_driver_id = Some(driver_id);
        ride.updated_at = Utc::now();
        let accepted = ride.clone();
        drop(ride);

        self.conversations.open(ride_id);
        self.publish(&accepted, Some(Actor::Driver));
        self.metrics
            .accept_outcomes_total
            .with_label_values(&["accepted"])
            .inc();
        self.metrics.drivers_available.set(self.pool.available_count() as i64);
        info!(ride_id = %ride_id, driver_id = %driver_id, "ride accepted");

        Ok(AcceptOutcome::Accepted { ride: accepted })
    }

    /// `Accepted -> EnRoute`; the assigned driver goes on trip.
    pub fn depart(&self, ride_id: Uuid, driver_id: Uuid) -> Result<Ride, AppError> {
        self.driver_step(ride_id, driver_id, RideState::Accepted, RideState::EnRoute, |pool, id| {
            pool.start_trip(id)
        })
    }

    /// `EnRoute -> Completed`; the driver becomes available again.
    pub fn complete(&self, ride_id: Uuid, driver_id: Uuid) -> Result<Ride, AppError> {
        let ride = self.driver_step(
            ride_id,
            driver_id,
            RideState::EnRoute,
            RideState::Completed,
            |pool, id| pool.finish_trip(id),
        )?;
        self.free_rider_slot(&ride);
        self.metrics.drivers_available.set(self.pool.available_count() as i64);
        Ok(ride)
    }

    /// Cancels a ride in `Dispatching`, `WaitingForDriver` or `Accepted`,
    /// releasing a reserved driver before returning.
    pub fn cancel(&self, ride_id: Uuid, actor: Actor) -> Result<Ride, AppError> {
        let mut ride = self
            .rides
            .get_mut(&ride_id)
            .ok_or_else(|| ride_not_found(ride_id))?;

        if !ride.state.is_cancellable_by_dispatcher() {
            return Err(AppError::InvalidTransition(format!(
                "ride {ride_id} cannot be cancelled while {:?}",
                ride.state
            )));
        }

        if let Some(driver_id) = ride.assigned_driver_id.take() {
            if !self.pool.release(driver_id) {
                warn!(ride_id = %ride_id, driver_id = %driver_id, "assigned driver was not reserved");
            }
        }
        ride.state = RideState::Cancelled;
        ride.updated_at = Utc::now();
        let cancelled = ride.clone();
        drop(ride);

        self.free_rider_slot(&cancelled);
        self.publish(&cancelled, Some(actor));
        self.metrics.drivers_available.set(self.pool.available_count() as i64);
        info!(ride_id = %ride_id, actor = ?actor, "ride cancelled");

        Ok(cancelled)
    }

    /// Cancels rides accepted more than `ttl` ago whose driver never departed.
    pub fn expire_stale_acceptances(&self, ttl: ChronoDuration) -> Vec<Uuid> {
        let cutoff = Utc::now() - ttl;
        let stale: Vec<Uuid> = self
            .rides
            .iter()
            .filter(|entry| entry.state == RideState::Accepted && entry.updated_at <= cutoff)
            .map(|entry| entry.id)
            .collect();

        stale
            .into_iter()
            .filter(|ride_id| match self.cancel(*ride_id, Actor::System) {
                Ok(_) => true,
                // The driver departed or the rider cancelled in the meantime.
                Err(err) => {
                    warn!(ride_id = %ride_id, error = %err, "skipped expiring ride");
                    false
                }
            })
            .collect()
    }

    fn driver_step(
        &self,
        ride_id: Uuid,
        driver_id: Uuid,
        from: RideState,
        to: RideState,
        driver_transition: impl FnOnce(&DriverPool, Uuid) -> bool,
    ) -> Result<Ride, AppError> {
        let mut ride = self
            .rides
            .get_mut(&ride_id)
            .ok_or_else(|| ride_not_found(ride_id))?;

        if ride.assigned_driver_id.is_some_and(|assigned| assigned != driver_id) {
            return Err(AppError::AlreadyTaken(format!(
                "ride {ride_id} is assigned to another driver"
            )));
        }
        if ride.state != from {
            return Err(AppError::InvalidTransition(format!(
                "ride {ride_id} is {:?}, expected {from:?}",
                ride.state
            )));
        }
        if !driver_transition(&self.pool, driver_id) {
            return Err(AppError::Internal(format!(
                "driver {driver_id} status out of sync with ride {ride_id}"
            )));
        }

        ride.state = to;
        ride.updated_at = Utc::now();
        let updated = ride.clone();
        drop(ride);

        self.publish(&updated, Some(Actor::Driver));
        info!(ride_id = %ride_id, driver_id = %driver_id, state = ?to, "ride advanced");

        Ok(updated)
    }

    fn lost_race(&self, ride_id: Uuid, driver_id: Uuid, why: &str) -> AcceptOutcome {
        self.metrics
            .accept_outcomes_total
            .with_label_values(&["already_taken"])
            .inc();
        info!(ride_id = %ride_id, driver_id = %driver_id, why, "accept lost race");
        AcceptOutcome::AlreadyTaken
    }

    fn free_rider_slot(&self, ride: &Ride) {
        self.active_by_rider
            .remove_if(&ride.rider_id, |_, active| *active == ride.id);
        self.metrics.active_rides.set(self.active_by_rider.len() as i64);
    }

    fn publish(&self, ride: &Ride, actor: Option<Actor>) {
        let _ = self.events_tx.send(RideEvent::from_ride(ride, actor));
    }
}

fn ride_not_found(ride_id: Uuid) -> AppError {
    AppError::NotFound(format!("ride {ride_id} not found"))
}
