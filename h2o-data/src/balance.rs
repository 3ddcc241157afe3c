//! Annual water balance: `storage = precipitation - (ET + runoff)`.

use h2o_core::error::{CoreError, Result};
use h2o_core::year_series::YearSeries;
use log::info;
use serde::{Deserialize, Serialize};

pub const PRECIPITATION: &str = "precipitation";
pub const EVAPOTRANSPIRATION: &str = "ET";
pub const RUNOFF: &str = "runoff";

/// Precipitation, ET and runoff on one shared ascending year index (mm/yr).
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedFluxes {
    years: Vec<i32>,
    precipitation: Vec<f64>,
    et: Vec<f64>,
    runoff: Vec<f64>,
}

/// One row of the balance table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceRow {
    pub year: i32,
    pub precipitation_mm: f64,
    pub et_mm: f64,
    pub runoff_mm: f64,
    pub storage_mm: f64,
}

impl AlignedFluxes {
    /// Align the three series on `years`. Any series with a missing or an
    /// extra year is rejected.
    pub fn align(
        years: &[i32],
        precipitation: &YearSeries,
        et: &YearSeries,
        runoff: &YearSeries,
    ) -> Result<Self> {
        let mut years = years.to_vec();
        years.sort_unstable();
        years.dedup();
        if years.is_empty() {
            return Err(CoreError::Config("no analysis years to align on".to_string()));
        }
        let aligned = Self {
            precipitation: precipitation.values_for(PRECIPITATION, &years)?,
            et: et.values_for(EVAPOTRANSPIRATION, &years)?,
            runoff: runoff.values_for(RUNOFF, &years)?,
            years,
        };
        info!(
            "Aligned fluxes for {}..{}",
            aligned.years[0],
            aligned.years[aligned.years.len() - 1]
        );
        Ok(aligned)
    }

    pub fn years(&self) -> &[i32] {
        &self.years
    }

    pub fn precipitation(&self) -> &[f64] {
        &self.precipitation
    }

    pub fn et(&self) -> &[f64] {
        &self.et
    }

    pub fn runoff(&self) -> &[f64] {
        &self.runoff
    }

    pub fn storage_change(&self) -> Vec<f64> {
        storage_change(&self.precipitation, &self.et, &self.runoff)
    }

    pub fn rows(&self) -> Vec<BalanceRow> {
        let storage = self.storage_change();
        self.years
            .iter()
            .enumerate()
            .map(|(i, year)| BalanceRow {
                year: *year,
                precipitation_mm: self.precipitation[i],
                et_mm: self.et[i],
                runoff_mm: self.runoff[i],
                storage_mm: storage[i],
            })
            .collect()
    }
}

/// Element-wise `p - (et + r)`.
pub fn storage_change(precipitation: &[f64], et: &[f64], runoff: &[f64]) -> Vec<f64> {
    precipitation
        .iter()
        .zip(et)
        .zip(runoff)
        .map(|((p, e), r)| p - (e + r))
        .collect()
}
