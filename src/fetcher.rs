use crate::coverage::Granularity;
use crate::error::{AppError, Result};
use crate::parser::Parser;
use crate::series::ClimateSeries;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Monthly requests return the whole history; the endpoint still wants a date.
pub const MONTHLY_SENTINEL_YEAR: i32 = 1970;
pub const MONTHLY_SENTINEL_MONTH: u32 = 1;

pub struct Fetcher {
    client: Client,
    base_url: String,
}

/// Parameters for one call to the bulk data endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkDataRequest {
    pub station_id: String,
    pub year: i32,
    pub month: u32,
    pub granularity: Granularity,
}

impl BulkDataRequest {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("format", "csv".to_string()),
            ("stationID", self.station_id.clone()),
            ("Year", self.year.to_string()),
            ("Month", self.month.to_string()),
            ("Day", "1".to_string()),
            ("timeframe", self.granularity.timeframe().to_string()),
            ("submit", "Download Data".to_string()),
        ]
    }

    pub fn url(&self, base_url: &str) -> Result<Url> {
        Url::parse_with_params(base_url, self.query_pairs()).map_err(|e| {
            AppError::Config(format!("Invalid bulk data URL '{}': {}", base_url, e))
        })
    }

    fn failed(&self, reason: impl Into<String>) -> AppError {
        AppError::FetchFailed {
            station_id: self.station_id.clone(),
            year: self.year,
            month: self.month,
            granularity: self.granularity,
            reason: reason.into(),
        }
    }
}

impl Fetcher {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("climate-stations/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    /// Request for one fetch unit.
    ///
    /// Hourly requests cover one month, daily requests one year and monthly
    /// requests the station's full history, so the unused date parts are
    /// pinned to fixed values.
    pub fn build_request(
        station_id: &str,
        year: i32,
        month: u32,
        granularity: Granularity,
    ) -> BulkDataRequest {
        let (year, month) = match granularity {
            Granularity::Hourly => (year, month),
            Granularity::Daily => (year, 1),
            Granularity::Monthly => (MONTHLY_SENTINEL_YEAR, MONTHLY_SENTINEL_MONTH),
        };

        BulkDataRequest {
            station_id: station_id.to_string(),
            year,
            month,
            granularity,
        }
    }

    /// Fetch and parse one unit.
    ///
    /// Every failure, including timeouts and unparsable bodies, comes back as
    /// [`AppError::FetchFailed`]. Callers treat it as an empty contribution.
    pub async fn fetch(
        &self,
        station_id: &str,
        year: i32,
        month: u32,
        granularity: Granularity,
    ) -> Result<ClimateSeries> {
        let request = Self::build_request(station_id, year, month, granularity);
        self.fetch_request(&request).await
    }

    pub async fn fetch_request(&self, request: &BulkDataRequest) -> Result<ClimateSeries> {
        let url = request.url(&self.base_url)?;
        debug!("Fetching {} data from {}", request.granularity, url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request.failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                "Climate data request for station {} ({} {}-{:02}) returned {}",
                request.station_id, request.granularity, request.year, request.month, status
            );
            return Err(request.failed(format!("HTTP status {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| request.failed(e.to_string()))?;

        let (series, stats) = Parser::parse_response(&body, request.granularity)
            .map_err(|e| request.failed(e.to_string()))?;

        debug!(
            "Parsed {} rows for station {} ({} {}-{:02}), {} failures, {} preamble lines",
            stats.parsed_successfully,
            request.station_id,
            request.granularity,
            request.year,
            request.month,
            stats.parse_failures,
            stats.preamble_lines
        );

        Ok(series)
    }

    /// Plain text download, used for the station inventory.
    pub async fn download_text(&self, url: &str) -> Result<String> {
        debug!("Downloading {}", url);

        let response = self.client.get(url).send().await?;
        let response = response.error_for_status()?;
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_hourly_keeps_month() {
        let request = Fetcher::build_request("31688", 2018, 7, Granularity::Hourly);
        assert_eq!(request.year, 2018);
        assert_eq!(request.month, 7);
    }

    #[test]
    fn test_build_request_daily_ignores_month() {
        let request = Fetcher::build_request("31688", 2018, 7, Granularity::Daily);
        assert_eq!((request.year, request.month), (2018, 1));
    }

    #[test]
    fn test_build_request_monthly_uses_sentinel() {
        let request = Fetcher::build_request("31688", 2018, 7, Granularity::Monthly);
        assert_eq!(request.year, MONTHLY_SENTINEL_YEAR);
        assert_eq!(request.month, MONTHLY_SENTINEL_MONTH);
    }

    #[test]
    fn test_request_url_parameters() {
        let request = Fetcher::build_request("31688", 2018, 3, Granularity::Hourly);
        let url = request
            .url("https://climate.weather.gc.ca/climate_data/bulk_data_e.html")
            .unwrap();

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert!(pairs.contains(&("stationID".to_string(), "31688".to_string())));
        assert!(pairs.contains(&("Year".to_string(), "2018".to_string())));
        assert!(pairs.contains(&("Month".to_string(), "3".to_string())));
        assert!(pairs.contains(&("Day".to_string(), "1".to_string())));
        assert!(pairs.contains(&("timeframe".to_string(), "1".to_string())));
    }
}
