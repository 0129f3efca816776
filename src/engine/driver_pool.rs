use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::haversine_m;
use crate::models::coordinate::Coordinate;
use crate::models::driver::{Driver, DriverStatus};
use crate::models::fare::VehicleClass;

/// Known drivers and their availability.
///
/// Every status change is a compare-and-swap on a single map entry: the entry
/// is write-locked, the current status is checked, and the new one written
/// before the lock is released. Concurrent reservations of the same driver
/// therefore resolve to exactly one winner.
#[derive(Default)]
pub struct DriverPool {
    drivers: DashMap<Uuid, Driver>,
}

impl DriverPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        display_name: &str,
        phone: &str,
        vehicle_class: VehicleClass,
        location: Coordinate,
    ) -> Result<Driver, AppError> {
        if display_name.trim().is_empty() {
            return Err(AppError::InvalidInput("display_name cannot be empty".to_string()));
        }

        let driver = Driver {
            id: Uuid::new_v4(),
            display_name: display_name.trim().to_string(),
            phone: phone.trim().to_string(),
            vehicle_class,
            location,
            status: DriverStatus::Available,
            updated_at: Utc::now(),
        };

        self.drivers.insert(driver.id, driver.clone());
        info!(driver_id = %driver.id, vehicle_class = %vehicle_class, "driver registered");
        Ok(driver)
    }

    pub fn get(&self, driver_id: Uuid) -> Option<Driver> {
        self.drivers.get(&driver_id).map(|entry| entry.value().clone())
    }

    pub fn list(&self) -> Vec<Driver> {
        let mut drivers: Vec<Driver> = self
            .drivers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        drivers.sort_by_key(|driver| driver.id);
        drivers
    }

    pub fn available_count(&self) -> usize {
        self.drivers
            .iter()
            .filter(|entry| entry.status == DriverStatus::Available)
            .count()
    }

    /// Available drivers within `radius_meters` of `point`, nearest first,
    /// ties broken by id. Read-only.
    pub fn nearby(
        &self,
        point: &Coordinate,
        radius_meters: f64,
        limit: usize,
        vehicle_class: Option<VehicleClass>,
    ) -> Vec<Driver> {
        let mut candidates: Vec<(f64, Driver)> = self
            .drivers
            .iter()
            .filter_map(|entry| {
                let driver = entry.value();
                if driver.status != DriverStatus::Available {
                    return None;
                }
                if vehicle_class.is_some_and(|class| class != driver.vehicle_class) {
                    return None;
                }

                let distance = haversine_m(point, &driver.location);
                (distance <= radius_meters).then(|| (distance, driver.clone()))
            })
            .collect();

        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
        candidates
            .into_iter()
            .take(limit)
            .map(|(_, driver)| driver)
            .collect()
    }

    /// `Available -> Reserved`. Returns false when the driver lost the race or
    /// does not exist.
    pub fn reserve(&self, driver_id: Uuid) -> bool {
        let reserved = self.transition(driver_id, DriverStatus::Available, DriverStatus::Reserved);
        debug!(driver_id = %driver_id, reserved, "reserve attempt");
        reserved
    }

    /// `Reserved -> Available`. Returns false when the driver was not reserved.
    pub fn release(&self, driver_id: Uuid) -> bool {
        self.transition(driver_id, DriverStatus::Reserved, DriverStatus::Available)
    }

    /// `Reserved -> OnTrip`.
    pub fn start_trip(&self, driver_id: Uuid) -> bool {
        self.transition(driver_id, DriverStatus::Reserved, DriverStatus::OnTrip)
    }

    /// `OnTrip -> Available`.
    pub fn finish_trip(&self, driver_id: Uuid) -> bool {
        self.transition(driver_id, DriverStatus::OnTrip, DriverStatus::Available)
    }

    pub fn set_online(&self, driver_id: Uuid, online: bool) -> Result<Driver, AppError> {
        let mut driver = self
            .drivers
            .get_mut(&driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

        driver.status = match (driver.status, online) {
            (DriverStatus::Offline | DriverStatus::Available, true) => DriverStatus::Available,
            (DriverStatus::Offline | DriverStatus::Available, false) => DriverStatus::Offline,
            (busy, _) => {
                return Err(AppError::InvalidTransition(format!(
                    "driver {driver_id} is {busy:?}"
                )));
            }
        };
        driver.updated_at = Utc::now();

        Ok(driver.clone())
    }

    pub fn update_location(&self, driver_id: Uuid, location: Coordinate) -> Result<Driver, AppError> {
        let mut driver = self
            .drivers
            .get_mut(&driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

        driver.location = location;
        driver.updated_at = Utc::now();

        Ok(driver.clone())
    }

    fn transition(&self, driver_id: Uuid, from: DriverStatus, to: DriverStatus) -> bool {
        match self.drivers.get_mut(&driver_id) {
            Some(mut driver) if driver.status == from => {
                driver.status = to;
                driver.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }
}
