use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::geo::provider::GeoRouting;
use crate::models::coordinate::Coordinate;
use crate::models::route::RoutePlan;

/// Nominatim geocoding plus OSRM routing over HTTP.
pub struct HttpGeoRouting {
    client: Client,
    nominatim_url: String,
    osrm_url: String,
}

impl HttpGeoRouting {
    pub fn new(
        nominatim_url: &str,
        osrm_url: &str,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|err| AppError::Internal(format!("failed to build http client: {err}")))?;

        Ok(Self {
            client,
            nominatim_url: nominatim_url.trim_end_matches('/').to_string(),
            osrm_url: osrm_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch(&self, request: reqwest::RequestBuilder) -> Result<(u16, Vec<u8>), AppError> {
        let response = request.send().await.map_err(unavailable)?;
        let status = response.status();
        let body = response.bytes().await.map_err(unavailable)?;

        if status.is_server_error() {
            return Err(AppError::ProviderUnavailable(format!(
                "provider returned {status}"
            )));
        }

        Ok((status.as_u16(), body.to_vec()))
    }
}

fn unavailable(err: reqwest::Error) -> AppError {
    warn!(error = %err, "geo provider request failed");
    AppError::ProviderUnavailable(err.to_string())
}

#[async_trait]
impl GeoRouting for HttpGeoRouting {
    async fn geocode(&self, text: &str) -> Result<Coordinate, AppError> {
        let query = text.trim();
        if query.is_empty() {
            return Err(AppError::InvalidInput("destination text is empty".to_string()));
        }

        let request = self
            .client
            .get(format!("{}/search", self.nominatim_url))
            .query(&[("format", "json"), ("q", query)]);
        let (status, body) = self.fetch(request).await?;
        debug!(status, bytes = body.len(), "nominatim response");

        if status >= 400 {
            return Err(AppError::ProviderUnavailable(format!(
                "geocoder returned {status}"
            )));
        }

        parse_search_response(&body, query)
    }

    async fn route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<RoutePlan, AppError> {
        let url = format!(
            "{}/route/v1/driving/{},{};{},{}",
            self.osrm_url, origin.lng, origin.lat, destination.lng, destination.lat,
        );
        let request = self
            .client
            .get(url)
            .query(&[("overview", "full"), ("geometries", "geojson")]);
        let (status, body) = self.fetch(request).await?;
        debug!(status, bytes = body.len(), "osrm response");

        // OSRM reports NoRoute and InvalidQuery with a 400 and a JSON body.
        parse_route_response(&body, destination)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Number {
    Float(f64),
    Text(String),
}

impl Number {
    fn value(&self) -> Option<f64> {
        match self {
            Number::Float(v) => Some(*v),
            Number::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Deserialize)]
struct NominatimPlace {
    lat: Number,
    lon: Number,
}

#[derive(Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Deserialize)]
struct OsrmRoute {
    distance: f64,
    geometry: OsrmGeometry,
}

#[derive(Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}

pub fn parse_search_response(body: &[u8], query: &str) -> Result<Coordinate, AppError> {
    let places: Vec<NominatimPlace> = serde_json::from_slice(body)
        .map_err(|err| AppError::ProviderUnavailable(format!("malformed geocoder body: {err}")))?;

    let first = places
        .first()
        .ok_or_else(|| AppError::NotFound(format!("no match for \"{query}\"")))?;

    match (first.lat.value(), first.lon.value()) {
        (Some(lat), Some(lng)) => Coordinate::new(lat, lng).map_err(|err| {
            AppError::ProviderUnavailable(format!("geocoder returned bad coordinate: {err}"))
        }),
        _ => Err(AppError::ProviderUnavailable(
            "geocoder returned non-numeric coordinate".to_string(),
        )),
    }
}

pub fn parse_route_response(body: &[u8], destination: Coordinate) -> Result<RoutePlan, AppError> {
    let response: OsrmResponse = serde_json::from_slice(body)
        .map_err(|err| AppError::ProviderUnavailable(format!("malformed router body: {err}")))?;

    match response.code.as_str() {
        "Ok" => {}
        "NoRoute" => return Err(AppError::NoRoute),
        other => {
            return Err(AppError::ProviderUnavailable(format!(
                "router returned code {other}"
            )));
        }
    }

    let route = response.routes.into_iter().next().ok_or(AppError::NoRoute)?;

    // GeoJSON pairs are [lon, lat].
    let mut polyline = route
        .geometry
        .coordinates
        .iter()
        .map(|pair| Coordinate::new(pair[1], pair[0]))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| AppError::ProviderUnavailable(format!("router geometry: {err}")))?;

    if polyline.is_empty() {
        return Err(AppError::ProviderUnavailable(
            "router returned empty geometry".to_string(),
        ));
    }
    if polyline.len() == 1 {
        polyline.push(destination);
    }

    RoutePlan::new(polyline, route.distance)
        .map_err(|err| AppError::ProviderUnavailable(format!("router result: {err}")))
}
