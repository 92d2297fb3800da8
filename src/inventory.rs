use crate::coverage::CoverageResolver;
use crate::error::{AppError, Result};
use csv::StringRecord;
use haversine::{distance, Location, Units};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::{debug, info, warn};

/// Disclaimer lines between the banner and the header row.
const DISCLAIMER_LINES: usize = 2;

const NAME: &str = "Name";
const PROVINCE: &str = "Province";
const CLIMATE_ID: &str = "Climate ID";
const STATION_ID: &str = "Station ID";
const LATITUDE: &str = "Latitude (Decimal Degrees)";
const LONGITUDE: &str = "Longitude (Decimal Degrees)";
const FIRST_YEAR: &str = "First Year";
const LAST_YEAR: &str = "Last Year";
const MLY_FIRST_YEAR: &str = "MLY First Year";
const MLY_LAST_YEAR: &str = "MLY Last Year";
const DLY_FIRST_YEAR: &str = "DLY First Year";
const DLY_LAST_YEAR: &str = "DLY Last Year";
const HLY_FIRST_YEAR: &str = "HLY First Year";
const HLY_LAST_YEAR: &str = "HLY Last Year";

/// Inclusive range of years, `first <= last`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct YearRange {
    pub first: i32,
    pub last: i32,
}

impl YearRange {
    pub fn new(first: i32, last: i32) -> Option<Self> {
        (first <= last).then_some(Self { first, last })
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.first..=self.last).contains(&year)
    }

    pub fn covers(&self, other: &YearRange) -> bool {
        self.first <= other.first && other.last <= self.last
    }

    pub fn years(&self) -> std::ops::RangeInclusive<i32> {
        self.first..=self.last
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StationRecord {
    pub name: String,
    pub station_id: String,
    pub province: Option<String>,
    pub climate_id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub overall: Option<YearRange>,
    pub monthly: Option<YearRange>,
    pub daily: Option<YearRange>,
    pub hourly: Option<YearRange>,
}

#[derive(Debug, Clone, Copy)]
pub struct ProximityResult<'a> {
    pub station: &'a StationRecord,
    pub distance_km: f64,
}

/// Great-circle distance in kilometres (mean earth radius 6371 km).
pub fn haversine_km(lat1: f64, long1: f64, lat2: f64, long2: f64) -> f64 {
    distance(
        Location {
            latitude: lat1,
            longitude: long1,
        },
        Location {
            latitude: lat2,
            longitude: long2,
        },
        Units::Kilometers,
    )
}

/// In-memory station reference table. Built once, immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct StationInventory {
    modified: String,
    stations: Vec<StationRecord>,
    index: HashMap<String, usize>,
}

impl StationInventory {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            AppError::MalformedInventory(format!(
                "Failed to open {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Self::from_reader(content.as_bytes())
    }

    pub fn from_reader<R: BufRead>(mut reader: R) -> Result<Self> {
        let mut banner = String::new();
        if reader.read_line(&mut banner)? == 0 {
            return Err(AppError::MalformedInventory(
                "Inventory is empty".to_string(),
            ));
        }
        let modified = banner.trim_start_matches('\u{feff}').trim().to_string();
        info!("Station inventory {}", modified);

        for n in 0..DISCLAIMER_LINES {
            let mut disclaimer = String::new();
            if reader.read_line(&mut disclaimer)? == 0 {
                return Err(AppError::MalformedInventory(format!(
                    "Inventory ended before disclaimer line {}",
                    n + 1
                )));
            }
        }

        let mut inventory = Self::from_table(reader)?;
        inventory.modified = modified;
        Ok(inventory)
    }

    fn from_table<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = rdr
            .headers()
            .map_err(|e| AppError::MalformedInventory(format!("Unreadable header row: {}", e)))?
            .clone();
        let columns = InventoryColumns::from_headers(&headers)?;

        let mut inventory = Self::default();
        for (row, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| {
                AppError::MalformedInventory(format!("Unreadable row {}: {}", row + 1, e))
            })?;
            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }

            let station = columns.parse_record(&record)?;
            for anomaly in CoverageResolver::range_anomalies(&station) {
                warn!(
                    "Station '{}': {} range {}-{} extends outside overall range {:?}",
                    station.name,
                    anomaly.granularity,
                    anomaly.range.first,
                    anomaly.range.last,
                    anomaly.overall.map(|r| (r.first, r.last))
                );
            }
            inventory.insert(station);
        }

        debug!("Loaded {} stations", inventory.len());
        Ok(inventory)
    }

    fn insert(&mut self, station: StationRecord) {
        match self.index.get(&station.name) {
            Some(&position) => {
                warn!(
                    "Duplicate station name '{}', replacing earlier row",
                    station.name
                );
                self.stations[position] = station;
            }
            None => {
                self.index.insert(station.name.clone(), self.stations.len());
                self.stations.push(station);
            }
        }
    }

    /// Free-text modification banner from the first line of the source.
    pub fn modified(&self) -> &str {
        &self.modified
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn stations(&self) -> &[StationRecord] {
        &self.stations
    }

    pub fn by_name(&self, name: &str) -> Result<&StationRecord> {
        self.index
            .get(name)
            .map(|&position| &self.stations[position])
            .ok_or_else(|| AppError::UnknownStation(name.to_string()))
    }

    /// Stations within `radius_km` of the point, nearest first.
    ///
    /// Ties keep inventory order.
    pub fn within_radius(&self, lat: f64, long: f64, radius_km: f64) -> Vec<ProximityResult<'_>> {
        let mut results: Vec<ProximityResult<'_>> = self
            .stations
            .iter()
            .map(|station| ProximityResult {
                station,
                distance_km: haversine_km(lat, long, station.latitude, station.longitude),
            })
            .filter(|result| result.distance_km <= radius_km)
            .collect();

        results.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        results
    }
}

struct InventoryColumns {
    name: usize,
    station_id: usize,
    province: Option<usize>,
    climate_id: Option<usize>,
    latitude: usize,
    longitude: usize,
    overall: (usize, usize),
    monthly: (usize, usize),
    daily: (usize, usize),
    hourly: (usize, usize),
}

impl InventoryColumns {
    fn from_headers(headers: &StringRecord) -> Result<Self> {
        let find = |column: &str| headers.iter().position(|h| h.trim() == column);
        let require = |column: &str| {
            find(column).ok_or_else(|| {
                AppError::MalformedInventory(format!("Missing column '{}'", column))
            })
        };

        Ok(Self {
            name: require(NAME)?,
            station_id: require(STATION_ID)?,
            province: find(PROVINCE),
            climate_id: find(CLIMATE_ID),
            latitude: require(LATITUDE)?,
            longitude: require(LONGITUDE)?,
            overall: (require(FIRST_YEAR)?, require(LAST_YEAR)?),
            monthly: (require(MLY_FIRST_YEAR)?, require(MLY_LAST_YEAR)?),
            daily: (require(DLY_FIRST_YEAR)?, require(DLY_LAST_YEAR)?),
            hourly: (require(HLY_FIRST_YEAR)?, require(HLY_LAST_YEAR)?),
        })
    }

    fn parse_record(&self, record: &StringRecord) -> Result<StationRecord> {
        let field = |idx: usize| record.get(idx).unwrap_or("").trim();
        let optional = |idx: Option<usize>| {
            idx.map(field)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let name = field(self.name).to_string();
        if name.is_empty() {
            return Err(AppError::MalformedInventory(
                "Station row without a name".to_string(),
            ));
        }

        let range = |(first, last): (usize, usize), label: &str| {
            parse_range(&name, label, field(first), field(last))
        };

        Ok(StationRecord {
            station_id: field(self.station_id).to_string(),
            province: optional(self.province),
            climate_id: optional(self.climate_id),
            latitude: parse_coordinate(&name, LATITUDE, field(self.latitude))?,
            longitude: parse_coordinate(&name, LONGITUDE, field(self.longitude))?,
            overall: range(self.overall, "overall")?,
            monthly: range(self.monthly, "monthly")?,
            daily: range(self.daily, "daily")?,
            hourly: range(self.hourly, "hourly")?,
            name,
        })
    }
}

fn parse_coordinate(station: &str, column: &str, value: &str) -> Result<f64> {
    value.parse::<f64>().map_err(|_| {
        AppError::MalformedInventory(format!(
            "Station '{}': invalid {} '{}'",
            station, column, value
        ))
    })
}

fn parse_year(station: &str, label: &str, value: &str) -> Result<Option<i32>> {
    if value.is_empty() {
        return Ok(None);
    }
    value.parse::<i32>().map(Some).map_err(|_| {
        AppError::MalformedInventory(format!(
            "Station '{}': invalid {} year '{}'",
            station, label, value
        ))
    })
}

fn parse_range(station: &str, label: &str, first: &str, last: &str) -> Result<Option<YearRange>> {
    match (parse_year(station, label, first)?, parse_year(station, label, last)?) {
        (None, None) => Ok(None),
        (Some(first), Some(last)) => YearRange::new(first, last).map(Some).ok_or_else(|| {
            AppError::MalformedInventory(format!(
                "Station '{}': {} range {}-{} ends before it starts",
                station, label, first, last
            ))
        }),
        _ => Err(AppError::MalformedInventory(format!(
            "Station '{}': {} range has only one bound",
            station, label
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "\"Name\",\"Province\",\"Climate ID\",\"Station ID\",\"WMO ID\",\"TC ID\",\"Latitude (Decimal Degrees)\",\"Longitude (Decimal Degrees)\",\"Latitude\",\"Longitude\",\"Elevation (m)\",\"First Year\",\"Last Year\",\"HLY First Year\",\"HLY Last Year\",\"DLY First Year\",\"DLY Last Year\",\"MLY First Year\",\"MLY Last Year\"";

    fn inventory_text(rows: &[&str]) -> String {
        let mut text = String::from(
            "Modified Date: 2019-01-08 23:30 UTC\n\
             \"Disclaimer: The station list is updated daily.\"\n\
             \"Some stations may not report every element.\"\n",
        );
        text.push_str(HEADER);
        text.push('\n');
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        text
    }

    #[test]
    fn test_parse_inventory() {
        let text = inventory_text(&[
            "\"TORONTO CITY\",\"ONTARIO\",\"6158355\",\"31688\",\"71508\",\"XTO\",43.67,-79.4,434000000,-792400000,112.5,\"2002\",\"2019\",\"2002\",\"2019\",\"2002\",\"2019\",\"2003\",\"2006\"",
            "\"BLACKSTOCK\",\"ONTARIO\",\"6110800\",\"4186\",\"\",\"\",44.12,-78.82,440700000,-784900000,274.3,\"1958\",\"1980\",\"\",\"\",\"1958\",\"1980\",\"1958\",\"1980\"",
        ]);

        let inventory = StationInventory::parse(&text).unwrap();
        assert_eq!(inventory.len(), 2);
        assert_eq!(inventory.modified(), "Modified Date: 2019-01-08 23:30 UTC");

        let toronto = inventory.by_name("TORONTO CITY").unwrap();
        assert_eq!(toronto.station_id, "31688");
        assert_eq!(toronto.province.as_deref(), Some("ONTARIO"));
        assert_eq!(toronto.overall, YearRange::new(2002, 2019));
        assert_eq!(toronto.monthly, YearRange::new(2003, 2006));

        let blackstock = inventory.by_name("BLACKSTOCK").unwrap();
        assert_eq!(blackstock.hourly, None);
        assert_eq!(blackstock.daily, YearRange::new(1958, 1980));
    }

    #[test]
    fn test_unknown_station() {
        let inventory = StationInventory::parse(&inventory_text(&[])).unwrap();
        match inventory.by_name("NOWHERE") {
            Err(AppError::UnknownStation(name)) => assert_eq!(name, "NOWHERE"),
            other => panic!("Expected UnknownStation, got: {:?}", other),
        }
    }

    #[test]
    fn test_missing_column_is_malformed() {
        let text = "banner\nd1\nd2\n\"Name\",\"Station ID\"\n\"A\",\"1\"\n";
        let result = StationInventory::parse(text);
        assert!(matches!(result, Err(AppError::MalformedInventory(_))));
    }

    #[test]
    fn test_non_integer_year_is_malformed() {
        let text = inventory_text(&[
            "\"A\",\"ON\",\"1\",\"1\",\"\",\"\",44.0,-79.0,0,0,0,\"19x8\",\"1980\",\"\",\"\",\"\",\"\",\"\",\"\"",
        ]);
        let err = StationInventory::parse(&text).unwrap_err();
        assert!(err.to_string().contains("invalid overall year"));
    }

    #[test]
    fn test_reversed_range_is_malformed() {
        let text = inventory_text(&[
            "\"A\",\"ON\",\"1\",\"1\",\"\",\"\",44.0,-79.0,0,0,0,\"1990\",\"1980\",\"\",\"\",\"\",\"\",\"\",\"\"",
        ]);
        assert!(matches!(
            StationInventory::parse(&text),
            Err(AppError::MalformedInventory(_))
        ));
    }

    #[test]
    fn test_truncated_preamble_is_malformed() {
        assert!(matches!(
            StationInventory::parse("Modified Date: today\n"),
            Err(AppError::MalformedInventory(_))
        ));
    }

    #[test]
    fn test_haversine_identity_and_symmetry() {
        assert_eq!(haversine_km(43.65, -79.38, 43.65, -79.38), 0.0);

        let ab = haversine_km(43.65, -79.38, 45.42, -75.69);
        let ba = haversine_km(45.42, -75.69, 43.65, -79.38);
        assert!((ab - ba).abs() < 1e-9);
        // Toronto to Ottawa
        assert!((ab - 351.0).abs() < 5.0);
    }

    #[test]
    fn test_within_radius_sorted_and_filtered() {
        // Longitude offsets at latitude 44 put these roughly 8, 16 and 80 km away.
        let text = inventory_text(&[
            "\"MID\",\"ON\",\"1\",\"1\",\"\",\"\",44.0,-78.8,0,0,0,\"\",\"\",\"\",\"\",\"\",\"\",\"\",\"\"",
            "\"FAR\",\"ON\",\"2\",\"2\",\"\",\"\",44.0,-78.0,0,0,0,\"\",\"\",\"\",\"\",\"\",\"\",\"\",\"\"",
            "\"NEAR\",\"ON\",\"3\",\"3\",\"\",\"\",44.0,-78.9,0,0,0,\"\",\"\",\"\",\"\",\"\",\"\",\"\",\"\"",
        ]);
        let inventory = StationInventory::parse(&text).unwrap();

        let results = inventory.within_radius(44.0, -79.0, 25.0);
        let names: Vec<&str> = results.iter().map(|r| r.station.name.as_str()).collect();
        assert_eq!(names, vec!["NEAR", "MID"]);
        assert!(results.windows(2).all(|w| w[0].distance_km <= w[1].distance_km));
        assert!(results.iter().all(|r| r.distance_km <= 25.0));
    }

    #[test]
    fn test_within_radius_ties_keep_inventory_order() {
        // Mirror images across the query longitude are equidistant.
        let text = inventory_text(&[
            "\"EAST\",\"ON\",\"1\",\"1\",\"\",\"\",44.0,-78.5,0,0,0,\"\",\"\",\"\",\"\",\"\",\"\",\"\",\"\"",
            "\"WEST\",\"ON\",\"2\",\"2\",\"\",\"\",44.0,-79.5,0,0,0,\"\",\"\",\"\",\"\",\"\",\"\",\"\",\"\"",
        ]);
        let inventory = StationInventory::parse(&text).unwrap();
        let results = inventory.within_radius(44.0, -79.0, 50.0);
        let names: Vec<&str> = results.iter().map(|r| r.station.name.as_str()).collect();
        assert_eq!(names, vec!["EAST", "WEST"]);
        assert_eq!(results[0].distance_km, results[1].distance_km);
    }

    #[test]
    fn test_duplicate_name_replaces_in_place() {
        let text = inventory_text(&[
            "\"A\",\"ON\",\"1\",\"1\",\"\",\"\",44.0,-79.0,0,0,0,\"\",\"\",\"\",\"\",\"\",\"\",\"\",\"\"",
            "\"B\",\"ON\",\"2\",\"2\",\"\",\"\",44.0,-79.0,0,0,0,\"\",\"\",\"\",\"\",\"\",\"\",\"\",\"\"",
            "\"A\",\"ON\",\"3\",\"3\",\"\",\"\",44.0,-79.0,0,0,0,\"\",\"\",\"\",\"\",\"\",\"\",\"\",\"\"",
        ]);
        let inventory = StationInventory::parse(&text).unwrap();
        assert_eq!(inventory.len(), 2);
        assert_eq!(inventory.stations()[0].station_id, "3");
        assert_eq!(inventory.by_name("A").unwrap().station_id, "3");
    }
}
