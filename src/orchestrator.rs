use crate::coverage::{CoverageMap, CoverageResolver, Granularity};
use crate::error::{AppError, Result};
use crate::fetcher::{Fetcher, MONTHLY_SENTINEL_MONTH, MONTHLY_SENTINEL_YEAR};
use crate::geocode::Geocoder;
use crate::inventory::{ProximityResult, StationInventory, StationRecord};
use crate::series::{label_year, ClimateSeries};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One remote retrieval: a station plus the year/month/granularity to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchUnit {
    pub station_id: String,
    pub year: i32,
    pub month: u32,
    pub granularity: Granularity,
}

#[derive(Debug, Clone, Serialize)]
pub struct StationSeries {
    pub name: String,
    pub station_id: String,
    pub distance_km: f64,
    pub coverage: CoverageMap,
    pub series: ClimateSeries,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedUnit {
    pub station: String,
    pub year: i32,
    pub month: u32,
    pub granularity: Granularity,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub stations: usize,
    pub units_planned: usize,
    pub units_succeeded: usize,
    pub failures: Vec<FailedUnit>,
    /// Timestamps delivered by more than one unit of the same station.
    pub boundary_anomalies: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunOutcome {
    pub stations: Vec<StationSeries>,
    pub report: RunReport,
}

pub struct Orchestrator {
    inventory: Arc<StationInventory>,
    fetcher: Fetcher,
    geocoder: Option<Geocoder>,
    max_concurrent_fetches: usize,
}

impl Orchestrator {
    pub fn new(
        inventory: Arc<StationInventory>,
        fetcher: Fetcher,
        max_concurrent_fetches: usize,
    ) -> Self {
        Self {
            inventory,
            fetcher,
            geocoder: None,
            max_concurrent_fetches: max_concurrent_fetches.max(1),
        }
    }

    pub fn with_geocoder(mut self, geocoder: Geocoder) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn inventory(&self) -> &StationInventory {
        &self.inventory
    }

    /// Geocode `address`, then [`run`](Self::run) around the result.
    pub async fn run_for_address(&self, address: &str, radius_km: f64) -> Result<RunOutcome> {
        let geocoder = self.geocoder.as_ref().ok_or_else(|| {
            AppError::Config("No geocoder configured for address queries".to_string())
        })?;
        let (lat, long) = geocoder.lat_long(address).await?;
        info!("Geocoded '{}' to ({:.4}, {:.4})", address, lat, long);
        self.run(lat, long, radius_km).await
    }

    /// Series for every station within `radius_km`, nearest first.
    ///
    /// Failed fetch units are logged and recorded in the report; they never
    /// abort the run.
    pub async fn run(&self, lat: f64, long: f64, radius_km: f64) -> Result<RunOutcome> {
        let nearby = self.inventory.within_radius(lat, long, radius_km);
        info!(
            "Found {} stations within {} km of ({:.4}, {:.4})",
            nearby.len(),
            radius_km,
            lat,
            long
        );

        let mut outcome = RunOutcome::default();
        for proximity in nearby {
            let station_series = self.collect_station(proximity, &mut outcome.report).await;
            outcome.stations.push(station_series);
        }
        outcome.report.stations = outcome.stations.len();

        info!(
            "Run complete: {} stations, {}/{} units succeeded, {} failed, {} boundary anomalies",
            outcome.report.stations,
            outcome.report.units_succeeded,
            outcome.report.units_planned,
            outcome.report.failures.len(),
            outcome.report.boundary_anomalies
        );
        Ok(outcome)
    }

    async fn collect_station(
        &self,
        proximity: ProximityResult<'_>,
        report: &mut RunReport,
    ) -> StationSeries {
        let station = proximity.station;
        let coverage = CoverageResolver::resolve(station);

        for anomaly in CoverageResolver::range_anomalies(station) {
            warn!(
                "Station '{}': {} range {}-{} is outside its overall range",
                station.name, anomaly.granularity, anomaly.range.first, anomaly.range.last
            );
        }

        let missing = coverage.missing_years();
        if !missing.is_empty() {
            info!(
                "Station '{}' has no data at any granularity for {} years: {:?}",
                station.name,
                missing.len(),
                missing
            );
        }

        let units = plan_units(station, &coverage);
        info!(
            "Station '{}' ({:.1} km): {} years, {} fetch units",
            station.name,
            proximity.distance_km,
            coverage.len(),
            units.len()
        );
        report.units_planned += units.len();

        let fetcher = &self.fetcher;
        let results: Vec<(FetchUnit, Result<ClimateSeries>)> = stream::iter(units)
            .map(|unit| async move {
                let result = fetcher
                    .fetch(&unit.station_id, unit.year, unit.month, unit.granularity)
                    .await;
                (unit, result)
            })
            .buffered(self.max_concurrent_fetches)
            .collect()
            .await;

        // Merge in plan order so any overwrite is deterministic.
        let mut series = ClimateSeries::new();
        for (unit, result) in results {
            match result {
                Ok(mut contribution) => {
                    report.units_succeeded += 1;
                    // Rows for years resolved to another granularity belong to that granularity.
                    let dropped = contribution.retain(|timestamp| {
                        label_year(timestamp)
                            .is_some_and(|year| coverage.get(year) == Some(Some(unit.granularity)))
                    });
                    if !dropped.is_empty() {
                        debug!(
                            "Station '{}': dropped {} {} rows outside its {} years (first: {})",
                            station.name,
                            dropped.len(),
                            unit.granularity,
                            unit.granularity,
                            dropped[0]
                        );
                    }
                    let overwritten = series.merge(contribution);
                    if !overwritten.is_empty() {
                        warn!(
                            "Station '{}': {} {}-{:02} overwrote {} existing timestamps (first: {})",
                            station.name,
                            unit.granularity,
                            unit.year,
                            unit.month,
                            overwritten.len(),
                            overwritten[0]
                        );
                        report.boundary_anomalies += overwritten.len();
                    }
                }
                Err(e) => {
                    warn!(
                        "Station '{}': no data for {} {}-{:02}: {}",
                        station.name, unit.granularity, unit.year, unit.month, e
                    );
                    report.failures.push(FailedUnit {
                        station: station.name.clone(),
                        year: unit.year,
                        month: unit.month,
                        granularity: unit.granularity,
                        reason: e.to_string(),
                    });
                }
            }
        }

        debug!("Station '{}': {} timestamps", station.name, series.len());

        StationSeries {
            name: station.name.clone(),
            station_id: station.station_id.clone(),
            distance_km: proximity.distance_km,
            coverage,
            series,
        }
    }
}

/// Fetch units for a station, in the order they are merged.
///
/// A single monthly unit covers every monthly year, daily years get one unit
/// each and hourly years one unit per calendar month.
pub fn plan_units(station: &StationRecord, coverage: &CoverageMap) -> Vec<FetchUnit> {
    let unit = |year: i32, month: u32, granularity: Granularity| FetchUnit {
        station_id: station.station_id.clone(),
        year,
        month,
        granularity,
    };

    let mut units = Vec::new();
    if coverage.uses(Granularity::Monthly) {
        units.push(unit(
            MONTHLY_SENTINEL_YEAR,
            MONTHLY_SENTINEL_MONTH,
            Granularity::Monthly,
        ));
    }

    for (year, granularity) in coverage.iter() {
        match granularity {
            Some(Granularity::Daily) => units.push(unit(year, 1, Granularity::Daily)),
            Some(Granularity::Hourly) => {
                units.extend((1..=12).map(|month| unit(year, month, Granularity::Hourly)))
            }
            Some(Granularity::Monthly) | None => {}
        }
    }

    units
}
