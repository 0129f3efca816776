use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub nominatim_url: String,
    pub osrm_url: String,
    pub geo_user_agent: String,
    pub provider_timeout_ms: u64,
    pub search_radius_meters: f64,
    pub candidate_limit: usize,
    pub accept_timeout_secs: u64,
    pub expiry_sweep_secs: u64,
    pub rate_bike: u32,
    pub rate_comfort: u32,
    pub rate_car: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            nominatim_url: env::var("NOMINATIM_URL")
                .unwrap_or_else(|_| "https://nominatim.openstreetmap.org".to_string()),
            osrm_url: env::var("OSRM_URL")
                .unwrap_or_else(|_| "https://router.project-osrm.org".to_string()),
            geo_user_agent: env::var("GEO_USER_AGENT")
                .unwrap_or_else(|_| concat!("ride-orchestrator/", env!("CARGO_PKG_VERSION")).to_string()),
            provider_timeout_ms: parse_or_default("PROVIDER_TIMEOUT_MS", 5000)?,
            search_radius_meters: parse_or_default("SEARCH_RADIUS_METERS", 5000.0)?,
            candidate_limit: parse_or_default("CANDIDATE_LIMIT", 10)?,
            accept_timeout_secs: parse_or_default("ACCEPT_TIMEOUT_SECS", 300)?,
            expiry_sweep_secs: parse_or_default("EXPIRY_SWEEP_SECS", 15)?,
            rate_bike: parse_or_default("RATE_BIKE", 30)?,
            rate_comfort: parse_or_default("RATE_COMFORT", 80)?,
            rate_car: parse_or_default("RATE_CAR", 60)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            event_buffer_size: 1024,
            nominatim_url: "https://nominatim.openstreetmap.org".to_string(),
            osrm_url: "https://router.project-osrm.org".to_string(),
            geo_user_agent: concat!("ride-orchestrator/", env!("CARGO_PKG_VERSION")).to_string(),
            provider_timeout_ms: 5000,
            search_radius_meters: 5000.0,
            candidate_limit: 10,
            accept_timeout_secs: 300,
            expiry_sweep_secs: 15,
            rate_bike: 30,
            rate_comfort: 80,
            rate_car: 60,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
