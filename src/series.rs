use serde::Serialize;
use std::collections::BTreeMap;

/// Temperature (°C) and precipitation (mm) keyed by timestamp label.
///
/// Labels are `YYYY-MM`, `YYYY-MM-DD` or `YYYY-MM-DD HH:00` depending on the
/// granularity they were fetched at. A `None` value means the source row had
/// no numeric value for that field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClimateSeries {
    pub temperature: BTreeMap<String, Option<f64>>,
    pub precipitation: BTreeMap<String, Option<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MonthlySummary {
    pub mean_temperature: Option<f64>,
    pub total_precipitation: Option<f64>,
}

/// Calendar year of a timestamp label.
pub fn label_year(timestamp: &str) -> Option<i32> {
    timestamp.get(..4).and_then(|year| year.parse().ok())
}

impl ClimateSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the timestamp was already present.
    pub fn insert(
        &mut self,
        timestamp: String,
        temperature: Option<f64>,
        precipitation: Option<f64>,
    ) -> bool {
        let existed = self
            .temperature
            .insert(timestamp.clone(), temperature)
            .is_some();
        self.precipitation.insert(timestamp, precipitation);
        existed
    }

    /// Union with `other`; on a shared timestamp the incoming value wins.
    ///
    /// Returns the overwritten timestamps.
    pub fn merge(&mut self, other: ClimateSeries) -> Vec<String> {
        let ClimateSeries {
            temperature,
            mut precipitation,
        } = other;

        let mut overwritten = Vec::new();
        for (timestamp, temp) in temperature {
            let precip = precipitation.remove(&timestamp).flatten();
            if self.insert(timestamp.clone(), temp, precip) {
                overwritten.push(timestamp);
            }
        }
        overwritten
    }

    /// Keep only the timestamps accepted by `keep`; returns the dropped ones.
    pub fn retain<F>(&mut self, mut keep: F) -> Vec<String>
    where
        F: FnMut(&str) -> bool,
    {
        let mut dropped = Vec::new();
        self.temperature.retain(|timestamp, _| {
            let kept = keep(timestamp);
            if !kept {
                dropped.push(timestamp.clone());
            }
            kept
        });
        for timestamp in &dropped {
            self.precipitation.remove(timestamp);
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.temperature.len()
    }

    pub fn is_empty(&self) -> bool {
        self.temperature.is_empty()
    }

    pub fn temperature(&self, timestamp: &str) -> Option<Option<f64>> {
        self.temperature.get(timestamp).copied()
    }

    pub fn precipitation(&self, timestamp: &str) -> Option<Option<f64>> {
        self.precipitation.get(timestamp).copied()
    }

    pub fn timestamps(&self) -> impl Iterator<Item = &str> {
        self.temperature.keys().map(String::as_str)
    }

    /// Roll entries up into `YYYY-MM` buckets.
    ///
    /// Temperature is the mean of the present values, precipitation their sum.
    /// A month without any present value stays `None` for that field.
    pub fn monthly_summary(&self) -> BTreeMap<String, MonthlySummary> {
        let mut temps: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        let mut precip: BTreeMap<String, Option<f64>> = BTreeMap::new();

        for (timestamp, temp) in &self.temperature {
            let Some(month) = timestamp.get(..7) else {
                continue;
            };
            let bucket = temps.entry(month.to_string()).or_insert((0.0, 0));
            if let Some(value) = temp {
                bucket.0 += value;
                bucket.1 += 1;
            }

            let total = precip.entry(month.to_string()).or_insert(None);
            if let Some(Some(value)) = self.precipitation.get(timestamp) {
                *total = Some(total.unwrap_or(0.0) + value);
            }
        }

        temps
            .into_iter()
            .map(|(month, (sum, count))| {
                let summary = MonthlySummary {
                    mean_temperature: (count > 0).then(|| sum / count as f64),
                    total_precipitation: precip.get(&month).copied().flatten(),
                };
                (month, summary)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_reports_overwrites() {
        let mut a = ClimateSeries::new();
        a.insert("2018-01".to_string(), Some(1.0), None);

        let mut b = ClimateSeries::new();
        b.insert("2018-01".to_string(), Some(2.0), Some(3.0));
        b.insert("2018-02".to_string(), None, Some(4.0));

        let overwritten = a.merge(b);
        assert_eq!(overwritten, vec!["2018-01".to_string()]);
        assert_eq!(a.len(), 2);
        assert_eq!(a.temperature("2018-01"), Some(Some(2.0)));
        assert_eq!(a.precipitation("2018-02"), Some(Some(4.0)));
    }

    #[test]
    fn test_retain_drops_both_fields() {
        let mut series = ClimateSeries::new();
        series.insert("2000-01".to_string(), Some(1.0), Some(10.0));
        series.insert("2001-01".to_string(), Some(2.0), Some(20.0));

        let dropped = series.retain(|ts| label_year(ts) == Some(2000));
        assert_eq!(dropped, vec!["2001-01".to_string()]);
        assert_eq!(series.len(), 1);
        assert_eq!(series.precipitation("2001-01"), None);
        assert_eq!(series.precipitation("2000-01"), Some(Some(10.0)));
    }

    #[test]
    fn test_label_year() {
        assert_eq!(label_year("2018-07-01 13:00"), Some(2018));
        assert_eq!(label_year("2018-07"), Some(2018));
        assert_eq!(label_year("garbage"), None);
    }

    #[test]
    fn test_monthly_summary() {
        let mut series = ClimateSeries::new();
        series.insert("2018-01-01".to_string(), Some(-4.0), Some(1.5));
        series.insert("2018-01-02".to_string(), Some(-2.0), None);
        series.insert("2018-01-03".to_string(), None, Some(2.5));
        series.insert("2018-02-01".to_string(), None, None);

        let summary = series.monthly_summary();
        assert_eq!(summary.len(), 2);

        let january = summary["2018-01"];
        assert_eq!(january.mean_temperature, Some(-3.0));
        assert_eq!(january.total_precipitation, Some(4.0));

        let february = summary["2018-02"];
        assert_eq!(february, MonthlySummary::default());
    }
}
