use crate::coverage::Granularity;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed station inventory: {0}")]
    MalformedInventory(String),

    #[error("Unknown station: '{0}'")]
    UnknownStation(String),

    #[error("Fetch failed for station {station_id} ({granularity} {year}-{month:02}): {reason}")]
    FetchFailed {
        station_id: String,
        year: i32,
        month: u32,
        granularity: Granularity,
        reason: String,
    },

    #[error("No geocode result for address '{0}'")]
    NoGeocodeResult(String),

    #[error("Unknown AC model: '{0}'")]
    UnknownModel(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
