//! Static air-conditioner tables: efficiency ratings by model number and the
//! share of households with stand-alone units by region.

use crate::error::{AppError, Result};
use encoding_rs::WINDOWS_1252;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

const MODEL_COLUMN: &str = "MODEL_NUM_1";
const CAPACITY_COLUMN: &str = "COOL_CAP_BTU";
const EER_COLUMN: &str = "EE_RATIO";

const AC_TYPE_COLUMN: &str = "Air conditioners";
const STANDALONE_AC: &str = "Stand-alone air conditioner, as a percentage of all households";
const REF_DATE_COLUMN: &str = "REF_DATE";
const GEO_COLUMN: &str = "GEO";
const VALUE_COLUMN: &str = "VALUE";

#[derive(Debug, Clone, PartialEq)]
pub struct AcRating {
    pub model: String,
    pub cooling_capacity_btu: f64,
    pub energy_efficiency_ratio: f64,
}

/// Ratings table, decoded from Windows-1252.
#[derive(Debug, Clone, Default)]
pub struct AcRatingTable {
    ratings: Vec<AcRating>,
}

impl AcRatingTable {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let (text, _, had_errors) = WINDOWS_1252.decode(&bytes);
        if had_errors {
            warn!(
                "Replacement characters while decoding {}",
                path.as_ref().display()
            );
        }
        Self::parse(&text)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(content.as_bytes());
        let headers = rdr.headers()?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| AppError::InvalidData(format!("Missing column '{}'", name)))
        };
        let (model_idx, capacity_idx, eer_idx) =
            (column(MODEL_COLUMN)?, column(CAPACITY_COLUMN)?, column(EER_COLUMN)?);

        let mut ratings = Vec::new();
        for result in rdr.records() {
            let record = result?;
            let model = record.get(model_idx).unwrap_or("").trim();
            let capacity = record.get(capacity_idx).unwrap_or("").trim().parse::<f64>();
            let eer = record.get(eer_idx).unwrap_or("").trim().parse::<f64>();

            match (capacity, eer) {
                (Ok(cooling_capacity_btu), Ok(energy_efficiency_ratio)) if !model.is_empty() => {
                    ratings.push(AcRating {
                        model: model.to_string(),
                        cooling_capacity_btu,
                        energy_efficiency_ratio,
                    });
                }
                _ => warn!("Skipping AC rating row without usable values: {:?}", record),
            }
        }

        Ok(Self { ratings })
    }

    pub fn len(&self) -> usize {
        self.ratings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty()
    }

    /// First row for `model`; several matches are logged as ambiguous.
    pub fn lookup(&self, model: &str) -> Result<&AcRating> {
        let mut matches = self.ratings.iter().filter(|r| r.model == model);
        let first = matches.next().ok_or_else(|| {
            warn!("AC {} not found", model);
            AppError::UnknownModel(model.to_string())
        })?;

        if matches.next().is_some() {
            warn!("Multiple AC {} found, selecting first", model);
        }
        Ok(first)
    }
}

/// Stand-alone AC household share, `(reference date, percent)` per region.
#[derive(Debug, Clone, Default)]
pub struct AcUsageTable {
    by_region: BTreeMap<String, Vec<(String, Option<f64>)>>,
}

impl AcUsageTable {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(content.as_bytes());
        let headers = rdr.headers()?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().trim_start_matches('\u{feff}') == name)
                .ok_or_else(|| AppError::InvalidData(format!("Missing column '{}'", name)))
        };
        let ac_type = column(AC_TYPE_COLUMN)?;
        let ref_date = column(REF_DATE_COLUMN)?;
        let geo = column(GEO_COLUMN)?;
        let value = column(VALUE_COLUMN)?;

        let mut by_region: BTreeMap<String, Vec<(String, Option<f64>)>> = BTreeMap::new();
        for result in rdr.records() {
            let record = result?;
            if record.get(ac_type).map(str::trim) != Some(STANDALONE_AC) {
                continue;
            }
            let field = |idx: usize| record.get(idx).unwrap_or("").trim();
            by_region
                .entry(field(geo).to_string())
                .or_default()
                .push((field(ref_date).to_string(), field(value).parse::<f64>().ok()));
        }

        Ok(Self { by_region })
    }

    pub fn region(&self, geo: &str) -> Option<&[(String, Option<f64>)]> {
        self.by_region.get(geo).map(Vec::as_slice)
    }

    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.by_region.keys().map(String::as_str)
    }
}
