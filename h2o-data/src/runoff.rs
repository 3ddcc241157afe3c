//! Discharge to basin runoff depth.
//!
//! Discharge is a rate in m³/s. Each day's mean rate is turned into a daily
//! volume, volumes are summed per calendar year and the annual volume is
//! spread over the basin area to give a depth in mm per year.

use crate::aggregate::{nan_mean, nan_sum};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use h2o_core::date_range::{AnalysisWindow, DateRange};
use h2o_core::error::{CoreError, Result};
use h2o_core::year_series::YearSeries;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SECONDS_PER_DAY: f64 = 86_400.0;
pub const MM_PER_M: f64 = 1_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DischargeSample {
    pub time: NaiveDateTime,
    /// m³/s, NaN when missing
    pub rate: f64,
}

/// Time-ordered discharge samples at one gauge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DischargeSeries {
    samples: Vec<DischargeSample>,
}

/// A calendar year with fewer valid days than the window covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncompleteYear {
    pub year: i32,
    pub valid_days: usize,
    pub expected_days: usize,
}

impl DischargeSeries {
    pub fn new(mut samples: Vec<DischargeSample>) -> Self {
        samples.sort_by(|a, b| a.time.cmp(&b.time));
        Self { samples }
    }

    pub fn from_parts(times: &[NaiveDateTime], rates: &[f64]) -> Result<Self> {
        if times.len() != rates.len() {
            return Err(CoreError::InvalidValue(format!(
                "{} time stamps for {} discharge values",
                times.len(),
                rates.len()
            )));
        }
        Ok(Self::new(
            times
                .iter()
                .zip(rates)
                .map(|(time, rate)| DischargeSample {
                    time: *time,
                    rate: *rate,
                })
                .collect(),
        ))
    }

    pub fn samples(&self) -> &[DischargeSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples between the first and the last instant of the window.
    pub fn slice(&self, window: &AnalysisWindow) -> Self {
        let start = window.start_datetime();
        let end = window.end_datetime();
        Self {
            samples: self
                .samples
                .iter()
                .filter(|s| start <= s.time && s.time <= end)
                .copied()
                .collect(),
        }
    }

    /// Mean rate per day. Days with only NaN samples map to NaN.
    pub fn daily_mean_rates(&self) -> BTreeMap<NaiveDate, f64> {
        let mut by_day: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
        for sample in &self.samples {
            by_day.entry(sample.time.date()).or_default().push(sample.rate);
        }
        by_day
            .into_iter()
            .map(|(day, rates)| (day, nan_mean(rates)))
            .collect()
    }

    /// Daily volumes in m³.
    pub fn daily_volumes(&self) -> BTreeMap<NaiveDate, f64> {
        self.daily_mean_rates()
            .into_iter()
            .map(|(day, rate)| (day, rate * SECONDS_PER_DAY))
            .collect()
    }

    /// Annual volume in m³ for each year holding at least one valid day.
    /// Missing days inside such a year are skipped; a year with no valid
    /// day is left out, so alignment reports it as missing.
    pub fn annual_volume(&self) -> YearSeries {
        let mut by_year: BTreeMap<i32, Vec<f64>> = BTreeMap::new();
        for (day, volume) in self.daily_volumes() {
            if volume.is_finite() {
                by_year.entry(day.year()).or_default().push(volume);
            }
        }
        by_year
            .into_iter()
            .map(|(year, volumes)| (year, nan_sum(volumes)))
            .collect()
    }

    /// Years of the window whose valid daily values do not cover every day.
    pub fn incomplete_years(&self, window: &AnalysisWindow) -> Vec<IncompleteYear> {
        let valid: BTreeMap<NaiveDate, f64> = self
            .daily_mean_rates()
            .into_iter()
            .filter(|(_, rate)| rate.is_finite())
            .collect();
        window
            .years()
            .into_iter()
            .filter_map(|year| {
                let expected_days = window.days_in_year(year);
                let valid_days = DateRange(window.start, window.end)
                    .filter(|d| d.year() == year && valid.contains_key(d))
                    .count();
                (valid_days < expected_days).then_some(IncompleteYear {
                    year,
                    valid_days,
                    expected_days,
                })
            })
            .collect()
    }
}

/// Annual runoff depth (mm/yr) over a basin of `area_m2`, restricted to the
/// analysis window.
pub fn annual_runoff_mm(
    series: &DischargeSeries,
    window: &AnalysisWindow,
    area_m2: f64,
) -> Result<YearSeries> {
    if !(area_m2.is_finite() && area_m2 > 0.0) {
        return Err(CoreError::InvalidValue(format!(
            "basin area must be positive, got {}",
            area_m2
        )));
    }
    let sliced = series.slice(window);
    info!(
        "Discharge: {} of {} samples inside {}..{}",
        sliced.len(),
        series.len(),
        window.start,
        window.end
    );
    for gap in sliced.incomplete_years(window) {
        warn!(
            "Discharge for {} covers {} of {} days",
            gap.year, gap.valid_days, gap.expected_days
        );
    }

    let runoff: YearSeries = sliced
        .annual_volume()
        .iter()
        .map(|(year, volume)| (year, volume / area_m2 * MM_PER_M))
        .collect();
    for (year, mm) in runoff.iter() {
        debug!("Runoff {}: {:.1} mm", year, mm);
    }
    Ok(runoff)
}
