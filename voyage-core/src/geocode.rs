//! Geocoding for itinerary enrichment.
//!
//! `GeocodingProvider` turns a free-text place query into the first-best
//! match. `GoogleMapsGeocoder` implements it against the Google Maps
//! Geocoding API with retry and backoff.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::config::MapsConfig;
use crate::error::{Result, VoyageError};
use crate::models::GeoPoint;

// ============================================================================
// GeocodingProvider trait
// ============================================================================

#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    /// `Ok(None)` when the provider has no match for the query.
    async fn geocode(&self, query: &str) -> Result<Option<GeoPoint>>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Maps API structs (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
    #[serde(default)]
    formatted_address: String,
    #[serde(default)]
    place_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

// ============================================================================
// GoogleMapsGeocoder
// ============================================================================

#[derive(Debug, Clone)]
pub struct GoogleMapsGeocoder {
    client: Client,
    api_key: String,
    base_url: String,
    max_retries: usize,
    retry_delay_ms: u64,
}

impl GoogleMapsGeocoder {
    /// Build from config. An empty `maps.api_key` falls back to `GOOGLE_MAPS_API_KEY`.
    pub fn new(config: &MapsConfig) -> Result<Self> {
        Self::with_base_url(config, config.base_url.clone())
    }

    /// Create a geocoder against a custom base URL (for testing / proxies)
    pub fn with_base_url(config: &MapsConfig, base_url: String) -> Result<Self> {
        let api_key = Some(config.api_key.clone())
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("GOOGLE_MAPS_API_KEY").ok())
            .filter(|k| !k.is_empty())
            .ok_or(VoyageError::MissingConfig("maps.api_key"))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VoyageError::Geocoding(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            retry_delay_ms: config.retry_delay_ms,
        })
    }

    async fn geocode_once(&self, query: &str) -> std::result::Result<Option<GeoPoint>, Attempt> {
        let url = format!("{}/maps/api/geocode/json", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("address", query), ("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| Attempt::Retry(format!("request failed: {e}")))?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(Attempt::Retry(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(Attempt::Fatal(format!("HTTP {status}")));
        }

        let body: GeocodeResponse = response
            .json()
            .await
            .map_err(|e| Attempt::Fatal(format!("invalid response body: {e}")))?;

        match body.status.as_str() {
            "OK" => Ok(body.results.into_iter().next().map(|r| GeoPoint {
                lat: r.geometry.location.lat,
                lng: r.geometry.location.lng,
                formatted_address: r.formatted_address,
                place_id: r.place_id,
            })),
            "ZERO_RESULTS" => Ok(None),
            "OVER_QUERY_LIMIT" | "UNKNOWN_ERROR" => Err(Attempt::Retry(body.status)),
            other => Err(Attempt::Fatal(match body.error_message {
                Some(message) => format!("{other}: {message}"),
                None => other.to_string(),
            })),
        }
    }
}

/// Outcome of a single failed request: transient faults are retried.
#[derive(Debug)]
enum Attempt {
    Retry(String),
    Fatal(String),
}

#[async_trait]
impl GeocodingProvider for GoogleMapsGeocoder {
    async fn geocode(&self, query: &str) -> Result<Option<GeoPoint>> {
        let retry_strategy = ExponentialBackoff::from_millis(self.retry_delay_ms)
            .max_delay(Duration::from_secs(5))
            .map(jitter)
            .take(self.max_retries);

        let result = RetryIf::spawn(
            retry_strategy,
            || self.geocode_once(query),
            |e: &Attempt| matches!(e, Attempt::Retry(_)),
        )
        .await;

        result.map_err(|e| {
            let message = match e {
                Attempt::Retry(m) | Attempt::Fatal(m) => m,
            };
            tracing::error!(query = %query, error = %message, "Geocoding failed");
            VoyageError::Geocoding(message)
        })
    }

    fn name(&self) -> &str {
        "google-maps"
    }
}

// ============================================================================
// TESTS
// ============================================================================
