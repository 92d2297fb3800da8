use crate::coverage::Granularity;
use crate::error::{AppError, Result};
use crate::series::ClimateSeries;
use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use tracing::warn;

/// Marker identifying the real header row after the metadata preamble.
pub const DATE_TIME_TITLE: &str = "Date/Time";
pub const TEMP_TITLE: &str = "Temp (°C)";
pub const MEAN_TEMP_TITLE: &str = "Mean Temp (°C)";
pub const TOTAL_PRECIP_TITLE: &str = "Total Precip (mm)";

/// Default failure threshold - fail if more than 10% of rows fail to parse
const DEFAULT_FAILURE_THRESHOLD: f64 = 0.10;

#[derive(Debug, Clone)]
pub struct ParseStats {
    pub preamble_lines: usize,
    pub total_rows: usize,
    pub parsed_successfully: usize,
    pub parse_failures: usize,
    pub empty_rows: usize,
    pub failure_rate: f64,
}

impl ParseStats {
    pub fn new() -> Self {
        Self {
            preamble_lines: 0,
            total_rows: 0,
            parsed_successfully: 0,
            parse_failures: 0,
            empty_rows: 0,
            failure_rate: 0.0,
        }
    }

    pub fn finalize(&mut self) {
        let non_empty = self.total_rows - self.empty_rows;
        self.failure_rate = if non_empty > 0 {
            self.parse_failures as f64 / non_empty as f64
        } else {
            0.0
        };
    }

    pub fn exceeds_threshold(&self, threshold: f64) -> bool {
        self.failure_rate > threshold
    }
}

impl Default for ParseStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Where temperature comes from in a given response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureSource {
    /// Hourly rows report an instantaneous reading.
    Instantaneous(usize),
    /// Daily and monthly rows only report a mean.
    Mean(usize),
    Unavailable,
}

/// Column positions resolved once from the header row.
#[derive(Debug, Clone)]
pub struct ClimateColumns {
    pub timestamp: usize,
    pub temperature: TemperatureSource,
    pub precipitation: Option<usize>,
}

impl ClimateColumns {
    pub fn from_headers(headers: &StringRecord) -> Result<Self> {
        let find = |title: &str| headers.iter().position(|h| h.trim() == title);

        let timestamp = headers
            .iter()
            .position(|h| h.trim().starts_with(DATE_TIME_TITLE))
            .ok_or_else(|| {
                AppError::Parse(format!("Header row has no '{}' column", DATE_TIME_TITLE))
            })?;

        let temperature = match (find(TEMP_TITLE), find(MEAN_TEMP_TITLE)) {
            (Some(idx), _) => TemperatureSource::Instantaneous(idx),
            (None, Some(idx)) => TemperatureSource::Mean(idx),
            (None, None) => TemperatureSource::Unavailable,
        };

        Ok(Self {
            timestamp,
            temperature,
            precipitation: find(TOTAL_PRECIP_TITLE),
        })
    }

    /// Instantaneous temperature when the response has that column, the mean otherwise.
    pub fn extract_temperature(&self, record: &StringRecord) -> Option<f64> {
        match self.temperature {
            TemperatureSource::Instantaneous(idx) | TemperatureSource::Mean(idx) => {
                parse_optional_float(record.get(idx))
            }
            TemperatureSource::Unavailable => None,
        }
    }

    pub fn extract_precipitation(&self, record: &StringRecord) -> Option<f64> {
        self.precipitation
            .and_then(|idx| parse_optional_float(record.get(idx)))
    }
}

/// One normalized data row.
#[derive(Debug, Clone, PartialEq)]
pub struct ClimateRow {
    pub timestamp: String,
    pub temperature: Option<f64>,
    pub precipitation: Option<f64>,
}

pub struct Parser;

impl Parser {
    /// Parse a bulk data response and return the series with parse statistics
    ///
    /// If more than 10% of the non-empty rows fail to parse, the whole response
    /// is rejected and none of its rows are kept. A body in that state is more
    /// likely a changed or broken format than a few bad rows.
    pub fn parse_response(
        content: &str,
        granularity: Granularity,
    ) -> Result<(ClimateSeries, ParseStats)> {
        Self::parse_response_with_threshold(content, granularity, DEFAULT_FAILURE_THRESHOLD)
    }

    /// Parse a bulk data response with a custom failure threshold
    pub fn parse_response_with_threshold(
        content: &str,
        granularity: Granularity,
        failure_threshold: f64,
    ) -> Result<(ClimateSeries, ParseStats)> {
        let (rows, stats) = Self::parse_rows(content, granularity)?;

        if stats.exceeds_threshold(failure_threshold) {
            return Err(AppError::Parse(format!(
                "Parse failure rate {:.1}% exceeds threshold {:.1}%: {} failures out of {} non-empty rows",
                stats.failure_rate * 100.0,
                failure_threshold * 100.0,
                stats.parse_failures,
                stats.total_rows - stats.empty_rows
            )));
        }

        let mut series = ClimateSeries::new();
        for row in rows {
            series.insert(row.timestamp, row.temperature, row.precipitation);
        }

        Ok((series, stats))
    }

    /// Rows in response order, without applying the failure threshold.
    pub fn parse_rows(
        content: &str,
        granularity: Granularity,
    ) -> Result<(Vec<ClimateRow>, ParseStats)> {
        let mut stats = ParseStats::new();
        let (preamble_lines, table) = skip_preamble(content)?;
        stats.preamble_lines = preamble_lines;

        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(table.as_bytes());

        let headers = rdr.headers()?.clone();
        let columns = ClimateColumns::from_headers(&headers)?;

        let mut rows = Vec::new();
        for (row_num, result) in rdr.records().enumerate() {
            stats.total_rows += 1;

            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    stats.parse_failures += 1;
                    warn!("Failed to read row {}: {}", row_num + 1, e);
                    continue;
                }
            };

            if record.iter().all(|field| field.trim().is_empty()) {
                stats.empty_rows += 1;
                continue;
            }

            match Self::parse_record(&record, &columns, granularity) {
                Ok(row) => {
                    rows.push(row);
                    stats.parsed_successfully += 1;
                }
                Err(e) => {
                    stats.parse_failures += 1;
                    warn!(
                        "Failed to parse row {} (failure {}/{}): {}",
                        row_num + 1,
                        stats.parse_failures,
                        stats.total_rows - stats.empty_rows,
                        e
                    );
                }
            }
        }

        stats.finalize();
        Ok((rows, stats))
    }

    fn parse_record(
        record: &StringRecord,
        columns: &ClimateColumns,
        granularity: Granularity,
    ) -> Result<ClimateRow> {
        let timestamp = record
            .get(columns.timestamp)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AppError::Parse("Row has no timestamp".to_string()))?;

        validate_timestamp(timestamp, granularity)?;

        Ok(ClimateRow {
            timestamp: timestamp.to_string(),
            temperature: columns.extract_temperature(record),
            precipitation: columns.extract_precipitation(record),
        })
    }
}

/// Split off the metadata preamble in a single forward scan.
///
/// Returns the number of discarded lines and the remainder starting at the
/// header row.
fn skip_preamble(content: &str) -> Result<(usize, &str)> {
    let mut offset = 0;
    for (line_num, line) in content.split_inclusive('\n').enumerate() {
        if line.contains(DATE_TIME_TITLE) {
            return Ok((line_num, &content[offset..]));
        }
        offset += line.len();
    }

    Err(AppError::Parse(format!(
        "No header row containing '{}' found",
        DATE_TIME_TITLE
    )))
}

fn validate_timestamp(label: &str, granularity: Granularity) -> Result<()> {
    let format = granularity.timestamp_format();
    let valid = match granularity {
        // chrono needs a day to build a date
        Granularity::Monthly => NaiveDate::parse_from_str(&format!("{}-01", label), "%Y-%m-%d").is_ok(),
        Granularity::Daily => NaiveDate::parse_from_str(label, format).is_ok(),
        Granularity::Hourly => NaiveDateTime::parse_from_str(label, format).is_ok(),
    };

    if valid {
        Ok(())
    } else {
        Err(AppError::Parse(format!(
            "Timestamp '{}' does not match {} format {}",
            label, granularity, format
        )))
    }
}

/// Empty or non-numeric cells are absent, never zero.
fn parse_optional_float(s: Option<&str>) -> Option<f64> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok())
}
