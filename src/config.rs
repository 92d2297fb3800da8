use crate::error::{AppError, Result};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub inventory: InventoryConfig,
    #[serde(default)]
    pub source: SourceConfig,
    pub query: QueryConfig,
    #[serde(default)]
    pub geocoding: Option<GeocodingConfig>,
    #[serde(default)]
    pub appliance: Option<ApplianceConfig>,
    #[serde(default)]
    pub output: Option<OutputConfig>,
}

/// Where the station inventory comes from. Exactly one of `path` or `url`.
#[derive(Debug, Deserialize, Clone)]
pub struct InventoryConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout_seconds(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_base_url() -> String {
    "https://climate.weather.gc.ca/climate_data/bulk_data_e.html".to_string()
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_max_concurrent_fetches() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_coordinate")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_coordinate")]
    pub longitude: Option<f64>,
    #[serde(default = "default_radius_km")]
    pub radius_km: f64,
}

fn default_radius_km() -> f64 {
    25.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeocodingConfig {
    #[serde(default = "default_geocoding_url")]
    pub base_url: String,
    pub api_key: String,
}

fn default_geocoding_url() -> String {
    "https://maps.googleapis.com/maps/api/geocode/json".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApplianceConfig {
    pub ratings_path: PathBuf,
    pub model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub path: PathBuf,
}

/// Custom deserializer that handles coordinates as both number and string
///
/// Accepts:
/// - `latitude: 43.65` (number)
/// - `latitude: "43.65"` (string that parses to number)
/// - `latitude: ${QUERY_LAT}` (env var substituted to either)
fn deserialize_optional_coordinate<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum CoordinateValue {
        Number(f64),
        String(String),
    }

    match Option::<CoordinateValue>::deserialize(deserializer)? {
        None => Ok(None),
        Some(CoordinateValue::Number(n)) => Ok(Some(n)),
        Some(CoordinateValue::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("Invalid coordinate: '{}'", s))),
    }
}

/// What the run is centred on.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryTarget {
    Address(String),
    Point { latitude: f64, longitude: f64 },
}

impl QueryConfig {
    pub fn target(&self) -> Result<QueryTarget> {
        match (&self.address, self.latitude, self.longitude) {
            (Some(address), None, None) => Ok(QueryTarget::Address(address.clone())),
            (None, Some(latitude), Some(longitude)) => Ok(QueryTarget::Point {
                latitude,
                longitude,
            }),
            _ => Err(AppError::Config(
                "Query needs either an address or both latitude and longitude".to_string(),
            )),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // Substitute environment variables
        let expanded = expand_env_vars(content)?;

        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    ///
    /// Checks for:
    /// - A single inventory source
    /// - Valid URL formats
    /// - Coordinate ranges and a positive radius
    /// - Sane fetch concurrency
    fn validate(&self) -> Result<()> {
        match (&self.inventory.path, &self.inventory.url) {
            (Some(_), None) => {}
            (None, Some(url)) => validate_url("inventory url", url)?,
            _ => {
                return Err(AppError::Config(
                    "Inventory needs exactly one of 'path' or 'url'".to_string(),
                ))
            }
        }

        validate_url("source base_url", &self.source.base_url)?;

        if self.source.timeout_seconds == 0 {
            return Err(AppError::Config(
                "Source timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if !(1..=32).contains(&self.source.max_concurrent_fetches) {
            return Err(AppError::Config(format!(
                "Source max_concurrent_fetches {} must be between 1 and 32",
                self.source.max_concurrent_fetches
            )));
        }

        match self.query.target()? {
            QueryTarget::Address(address) => {
                if address.trim().is_empty() {
                    return Err(AppError::Config("Query address cannot be empty".to_string()));
                }
                let Some(geocoding) = &self.geocoding else {
                    return Err(AppError::Config(
                        "Query by address requires a 'geocoding' section".to_string(),
                    ));
                };
                validate_url("geocoding base_url", &geocoding.base_url)?;
                if geocoding.api_key.trim().is_empty() {
                    return Err(AppError::Config(
                        "GMAPS_API environment variable is not set. \
                         Please set it or create a .env file."
                            .to_string(),
                    ));
                }
            }
            QueryTarget::Point {
                latitude,
                longitude,
            } => {
                if !(-90.0..=90.0).contains(&latitude) {
                    return Err(AppError::Config(format!(
                        "Latitude {} out of range (-90 to 90)",
                        latitude
                    )));
                }
                if !(-180.0..=180.0).contains(&longitude) {
                    return Err(AppError::Config(format!(
                        "Longitude {} out of range (-180 to 180)",
                        longitude
                    )));
                }
            }
        }

        if !(self.query.radius_km > 0.0) {
            return Err(AppError::Config(format!(
                "Query radius_km must be greater than 0, got {}",
                self.query.radius_km
            )));
        }

        if self.query.radius_km > 500.0 {
            tracing::warn!(
                "Query radius of {} km is very large, expect many stations and requests",
                self.query.radius_km
            );
        }

        Ok(())
    }
}

fn validate_url(field: &str, value: &str) -> Result<()> {
    let parsed = url::Url::parse(value)
        .map_err(|e| AppError::Config(format!("Invalid {} '{}': {}", field, value, e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(AppError::Config(format!(
            "{} must use http or https, got: {}",
            field, scheme
        ))),
    }
}

fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = content.to_string();
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| AppError::Config(format!("Invalid substitution pattern: {}", e)))?;

    let mut missing_vars = Vec::new();

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(value) => {
                result = result.replace(&cap[0], &value);
            }
            Err(_) => {
                missing_vars.push(var_name.to_string());
            }
        }
    }

    if !missing_vars.is_empty() {
        return Err(AppError::Config(format!(
            "Missing required environment variable{}: {}\n\n\
             To fix this:\n\
             1. Create a .env file in the project root (copy .env.example)\n\
             2. Set the missing variable{}: export {}=<value>\n\
             3. Or set {} in your environment before running",
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars.join(", "),
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars[0],
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}
