//! Address geocoding over the Google Geocoding JSON API.
//!
//! One request per call: no retry, no caching, transport-default timeouts.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::constants::GEOCODE_STATUS_OK;
use crate::pipeline::Coordinates;

pub const DEFAULT_GEOCODE_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/geocode/json";

#[derive(Debug, Error, Clone)]
pub enum GeocodeError {
    #[error("invalid geocoding endpoint `{0}`")]
    InvalidEndpoint(String),
    #[error("geocoding request failed: {0}")]
    Request(#[source] Arc<reqwest::Error>),
    #[error("geocoding service answered HTTP {0}")]
    HttpStatus(u16),
    #[error("geocoding provider rejected the request with status `{0}`")]
    ProviderRejected(String),
    #[error("malformed geocoding response: {0}")]
    MalformedResponse(String),
}

impl GeocodeError {
    fn request(error: reqwest::Error) -> Self {
        Self::Request(Arc::new(error))
    }

    fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }
}

/// Resolves a free-text address to a coordinate pair.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<Coordinates, GeocodeError>;
}

#[derive(Deserialize)]
struct GeocodeResponse {
    status: Option<String>,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Deserialize)]
struct GeocodeResult {
    geometry: Option<Geometry>,
}

#[derive(Deserialize)]
struct Geometry {
    location: Option<LatLng>,
}

#[derive(Deserialize)]
struct LatLng {
    lat: Option<f64>,
    lng: Option<f64>,
}

/// HTTP client for the Google Geocoding API (or a compatible endpoint).
#[derive(Debug, Clone)]
pub struct GoogleGeocoder {
    http: Client,
    endpoint: Url,
    api_key: String,
}

impl GoogleGeocoder {
    pub fn new(api_key: impl Into<String>) -> Result<Self, GeocodeError> {
        Self::with_endpoint(DEFAULT_GEOCODE_ENDPOINT, api_key)
    }

    pub fn with_endpoint(endpoint: &str, api_key: impl Into<String>) -> Result<Self, GeocodeError> {
        let endpoint =
            Url::parse(endpoint).map_err(|_| GeocodeError::InvalidEndpoint(endpoint.to_string()))?;
        let http = Client::builder()
            .user_agent(concat!("havenmap/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(GeocodeError::request)?;

        Ok(Self {
            http,
            endpoint,
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn geocode(&self, address: &str) -> Result<Coordinates, GeocodeError> {
        debug_assert!(!address.trim().is_empty());

        // `query` percent-encodes both values.
        let response = self
            .http
            .get(self.endpoint.clone())
            .query(&[("address", address), ("key", self.api_key.as_str())])
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(GeocodeError::request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::HttpStatus(status.as_u16()));
        }

        let payload = response.bytes().await.map_err(GeocodeError::request)?;
        let coordinates = parse_response(&payload)?;
        debug!(
            address,
            latitude = coordinates.latitude(),
            longitude = coordinates.longitude(),
            "geocoded address"
        );
        Ok(coordinates)
    }
}

/// Extract the first result's location from a geocoding payload.
pub fn parse_response(payload: &[u8]) -> Result<Coordinates, GeocodeError> {
    let response: GeocodeResponse = serde_json::from_slice(payload)
        .map_err(|err| GeocodeError::malformed(format!("invalid JSON: {err}")))?;

    let status = response
        .status
        .ok_or_else(|| GeocodeError::malformed("missing `status`"))?;
    if status != GEOCODE_STATUS_OK {
        return Err(GeocodeError::ProviderRejected(status));
    }

    let location = response
        .results
        .into_iter()
        .next()
        .and_then(|result| result.geometry)
        .and_then(|geometry| geometry.location)
        .ok_or_else(|| GeocodeError::malformed("missing results[0].geometry.location"))?;

    match (location.lat, location.lng) {
        (Some(lat), Some(lng)) => Coordinates::new(lat, lng)
            .map_err(|err| GeocodeError::malformed(err.to_string())),
        _ => Err(GeocodeError::malformed("location lacks numeric lat/lng")),
    }
}
