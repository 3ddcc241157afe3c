//! NaN-aware reductions used for the spatial and temporal aggregation steps.

use chrono::{Datelike, NaiveDateTime};
use h2o_core::year_series::YearSeries;
use std::collections::BTreeMap;

/// Mean of the finite values, or NaN when there are none.
pub fn nan_mean<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Sum of the finite values. An all-NaN input sums to zero.
pub fn nan_sum<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(0.0, |sum, v| sum + v)
}

/// Sum time-stamped values by calendar year, skipping NaN.
pub fn annual_sum(samples: &[(NaiveDateTime, f64)]) -> YearSeries {
    let mut by_year: BTreeMap<i32, Vec<f64>> = BTreeMap::new();
    for (time, value) in samples {
        by_year.entry(time.year()).or_default().push(*value);
    }
    by_year
        .into_iter()
        .map(|(year, values)| (year, nan_sum(values)))
        .collect()
}
