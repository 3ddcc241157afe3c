use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Annual values keyed by calendar year, always iterated in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct YearSeries(pub BTreeMap<i32, f64>);

impl YearSeries {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, year: i32, value: f64) -> Option<f64> {
        self.0.insert(year, value)
    }

    pub fn get(&self, year: i32) -> Option<f64> {
        self.0.get(&year).copied()
    }

    pub fn years(&self) -> Vec<i32> {
        self.0.keys().copied().collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.0.values().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, f64)> + '_ {
        self.0.iter().map(|(y, v)| (*y, *v))
    }

    /// Fails unless the series holds exactly `years`.
    pub fn check_years(&self, series: &str, years: &[i32]) -> Result<()> {
        let missing: Vec<i32> = years
            .iter()
            .copied()
            .filter(|y| !self.0.contains_key(y))
            .collect();
        let extra: Vec<i32> = self
            .0
            .keys()
            .copied()
            .filter(|y| !years.contains(y))
            .collect();
        if missing.is_empty() && extra.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Alignment {
                series: series.to_string(),
                missing,
                extra,
            })
        }
    }

    /// Values in the order of `years`. Call [`Self::check_years`] first.
    pub fn values_for(&self, series: &str, years: &[i32]) -> Result<Vec<f64>> {
        self.check_years(series, years)?;
        Ok(years.iter().filter_map(|y| self.get(*y)).collect())
    }
}

impl FromIterator<(i32, f64)> for YearSeries {
    fn from_iter<T: IntoIterator<Item = (i32, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
