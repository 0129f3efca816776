use std::collections::HashMap;

use bigdecimal::BigDecimal;
use num_traits::FromPrimitive;

use crate::config::Config;
use crate::error::AppError;
use crate::models::fare::{Fare, VehicleClass};

/// Maps a distance and vehicle class to a fare using fixed per-kilometer rates.
#[derive(Debug, Clone)]
pub struct PricingEngine {
    rates: HashMap<VehicleClass, BigDecimal>,
}

impl PricingEngine {
    pub fn new(rates: HashMap<VehicleClass, u32>) -> Result<Self, AppError> {
        if let Some((class, _)) = rates.iter().find(|(_, rate)| **rate == 0) {
            return Err(AppError::InvalidInput(format!(
                "rate for {class} must be greater than zero"
            )));
        }

        Ok(Self {
            rates: rates
                .into_iter()
                .map(|(class, rate)| (class, BigDecimal::from(rate)))
                .collect(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::new(HashMap::from([
            (VehicleClass::Bike, config.rate_bike),
            (VehicleClass::Comfort, config.rate_comfort),
            (VehicleClass::Car, config.rate_car),
        ]))
    }

    pub fn rate(&self, vehicle_class: VehicleClass) -> Result<&BigDecimal, AppError> {
        self.rates
            .get(&vehicle_class)
            .ok_or_else(|| AppError::UnknownVehicleClass(vehicle_class.to_string()))
    }

    /// `amount = round2(distance_meters / 1000 * rate)`.
    pub fn price(&self, distance_meters: f64, vehicle_class: VehicleClass) -> Result<Fare, AppError> {
        if !distance_meters.is_finite() || distance_meters < 0.0 {
            return Err(AppError::InvalidInput(format!(
                "distance must be a non-negative number, got {distance_meters}"
            )));
        }

        let rate = self.rate(vehicle_class)?;
        let meters = BigDecimal::from_f64(distance_meters).ok_or_else(|| {
            AppError::InvalidInput(format!("distance {distance_meters} is not representable"))
        })?;

        let amount = (meters * rate / BigDecimal::from(1000)).round(2).with_scale(2);

        Ok(Fare {
            amount,
            vehicle_class,
            distance_km: distance_meters / 1000.0,
        })
    }

    /// Like [`price`](Self::price) for a class given by name.
    pub fn price_named(&self, distance_meters: f64, vehicle_class: &str) -> Result<Fare, AppError> {
        self.price(distance_meters, vehicle_class.parse()?)
    }
}

impl Default for PricingEngine {
    fn default() -> Self {
        Self {
            rates: HashMap::from([
                (VehicleClass::Bike, BigDecimal::from(30)),
                (VehicleClass::Comfort, BigDecimal::from(80)),
                (VehicleClass::Car, BigDecimal::from(60)),
            ]),
        }
    }
}
