use crate::error::{AppError, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    #[serde(default)]
    formatted_address: String,
    geometry: Geometry,
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

/// Address to coordinates via a Google-style geocoding endpoint.
pub struct Geocoder {
    client: Client,
    base_url: String,
    api_key: String,
}

impl Geocoder {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Best latitude/longitude for `address`.
    ///
    /// No result is an error; several results log a warning and the first one
    /// is used.
    pub async fn lat_long(&self, address: &str) -> Result<(f64, f64)> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("address", address), ("key", self.api_key.as_str())])
            .send()
            .await?
            .error_for_status()?;

        let body: GeocodeResponse = response.json().await?;
        debug!(
            "Geocoder returned status '{}' with {} results",
            body.status,
            body.results.len()
        );

        let mut results = body.results.into_iter();
        let Some(first) = results.next() else {
            warn!("No geocode results returned for '{}'", address);
            return Err(AppError::NoGeocodeResult(address.to_string()));
        };

        let others = results.count();
        if others > 0 {
            warn!(
                "Multiple geocode results returned for '{}' ({}), picking first",
                address,
                others + 1
            );
        }

        debug!("Geocoded: {}", first.formatted_address);
        Ok((first.geometry.location.lat, first.geometry.location.lng))
    }
}
