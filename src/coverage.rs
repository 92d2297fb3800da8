//! Per-year granularity classification for a station.
//!
//! Every year of a station's overall operating range is assigned the single
//! granularity used to retrieve it, following a fixed priority order:
//! monthly, then daily, then hourly. Coarser data is cheaper to fetch and is
//! enough for most uses; finer granularities only fill the years it misses.

use crate::inventory::{StationRecord, YearRange};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Monthly,
    Daily,
    Hourly,
}

/// Lookup order used by [`CoverageResolver::resolve`]. First match wins.
pub const PRIORITY: [Granularity; 3] = [
    Granularity::Monthly,
    Granularity::Daily,
    Granularity::Hourly,
];

impl Granularity {
    /// `timeframe` query parameter understood by the bulk data endpoint.
    pub fn timeframe(&self) -> u8 {
        match self {
            Granularity::Hourly => 1,
            Granularity::Daily => 2,
            Granularity::Monthly => 3,
        }
    }

    /// `chrono` format of the timestamp labels the endpoint emits.
    pub fn timestamp_format(&self) -> &'static str {
        match self {
            Granularity::Monthly => "%Y-%m",
            Granularity::Daily => "%Y-%m-%d",
            Granularity::Hourly => "%Y-%m-%d %H:%M",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Monthly => "monthly",
            Granularity::Daily => "daily",
            Granularity::Hourly => "hourly",
        }
    }

    /// The station's recorded range for this granularity.
    pub fn range_of(&self, station: &StationRecord) -> Option<YearRange> {
        match self {
            Granularity::Monthly => station.monthly,
            Granularity::Daily => station.daily,
            Granularity::Hourly => station.hourly,
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Year to granularity mapping. `None` means no data at any granularity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CoverageMap {
    years: BTreeMap<i32, Option<Granularity>>,
}

impl CoverageMap {
    pub fn get(&self, year: i32) -> Option<Option<Granularity>> {
        self.years.get(&year).copied()
    }

    pub fn len(&self) -> usize {
        self.years.len()
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, Option<Granularity>)> + '_ {
        self.years.iter().map(|(year, g)| (*year, *g))
    }

    pub fn years_for(&self, granularity: Granularity) -> Vec<i32> {
        self.iter()
            .filter(|(_, g)| *g == Some(granularity))
            .map(|(year, _)| year)
            .collect()
    }

    pub fn missing_years(&self) -> Vec<i32> {
        self.iter()
            .filter(|(_, g)| g.is_none())
            .map(|(year, _)| year)
            .collect()
    }

    pub fn uses(&self, granularity: Granularity) -> bool {
        self.years.values().any(|g| *g == Some(granularity))
    }
}

/// A finer range that reaches outside the station's overall lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeAnomaly {
    pub granularity: Granularity,
    pub range: YearRange,
    pub overall: Option<YearRange>,
}

pub struct CoverageResolver;

impl CoverageResolver {
    pub fn resolve(station: &StationRecord) -> CoverageMap {
        let Some(overall) = station.overall else {
            return CoverageMap::default();
        };

        let years = overall
            .years()
            .map(|year| (year, Self::classify(station, year)))
            .collect();

        CoverageMap { years }
    }

    /// Granularity for a single year, or `None` when nothing covers it.
    pub fn classify(station: &StationRecord, year: i32) -> Option<Granularity> {
        PRIORITY.into_iter().find(|granularity| {
            granularity
                .range_of(station)
                .is_some_and(|range| range.contains(year))
        })
    }

    /// True when monthly data spans the whole lifetime, so no gap filling is needed.
    pub fn fully_monthly(station: &StationRecord) -> bool {
        Self::fully(station, Granularity::Monthly)
    }

    pub fn fully_daily(station: &StationRecord) -> bool {
        Self::fully(station, Granularity::Daily)
    }

    /// Both ranges absent counts as full: there are no years to cover.
    fn fully(station: &StationRecord, granularity: Granularity) -> bool {
        station.overall == granularity.range_of(station)
    }

    pub fn range_anomalies(station: &StationRecord) -> Vec<RangeAnomaly> {
        PRIORITY
            .into_iter()
            .filter_map(|granularity| {
                let range = granularity.range_of(station)?;
                let inside = station
                    .overall
                    .is_some_and(|overall| overall.covers(&range));
                (!inside).then_some(RangeAnomaly {
                    granularity,
                    range,
                    overall: station.overall,
                })
            })
            .collect()
    }
}
