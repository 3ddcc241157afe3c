//! Water-balance command: runoff from discharge, basin-mean precipitation and
//! ET, and the annual storage change.

use crate::plot::{plot_fluxes, plot_storage, FLUXES_SVG, STORAGE_SVG};
use anyhow::Context;
use h2o_core::config::PipelineConfig;
use h2o_data::aggregate::annual_sum;
use h2o_data::balance::{AlignedFluxes, BalanceRow};
use h2o_data::runoff::annual_runoff_mm;
use h2o_geo::basin::BasinBoundary;
use h2o_geo::netcdf_io::{read_discharge, read_et_annual_means, read_spatial_mean_series};
use log::info;
use std::path::Path;

/// Combine the three fluxes for the configured years and write the table
/// and, unless `no_plots`, the two charts.
pub fn run_water_balance(config_path: Option<&Path>, no_plots: bool) -> anyhow::Result<()> {
    let config = PipelineConfig::load(config_path)?;
    let fluxes = compute_fluxes(&config)?;

    for row in fluxes.rows() {
        info!(
            "{}: P {:.1} ET {:.1} R {:.1} dS {:.1} mm",
            row.year, row.precipitation_mm, row.et_mm, row.runoff_mm, row.storage_mm
        );
    }

    let table = config.resolve(&config.balance.table_file);
    write_balance_table(&table, &fluxes.rows())?;

    if no_plots {
        info!("Plots skipped");
    } else {
        let plot_dir = config.resolve(&config.balance.plot_dir);
        std::fs::create_dir_all(&plot_dir)
            .with_context(|| format!("Failed to create {}", plot_dir.display()))?;
        plot_fluxes(&fluxes, &plot_dir.join(FLUXES_SVG))?;
        plot_storage(
            fluxes.years(),
            &fluxes.storage_change(),
            &plot_dir.join(STORAGE_SVG),
        )?;
    }
    Ok(())
}

/// Read every input and align the annual precipitation, ET and runoff.
pub fn compute_fluxes(config: &PipelineConfig) -> anyhow::Result<AlignedFluxes> {
    let window = config.window();
    let years = window.years();
    info!("Water balance for {}..{} ({} years)", window.start, window.end, years.len());

    let basin_path = config.resolve(&config.basin.path);
    let basin = BasinBoundary::load(&basin_path, config.basin.target_epsg)
        .with_context(|| format!("Failed to load basin {}", basin_path.display()))?;
    let area = basin.area_m2();
    info!("Basin area {:.1} km²", area / 1.0e6);

    let hydrometric = config.resolve(&config.balance.hydrometric_file);
    let discharge = read_discharge(&hydrometric, &config.balance.discharge_variable)
        .with_context(|| format!("Failed to read discharge from {}", hydrometric.display()))?;
    let runoff = annual_runoff_mm(&discharge, &window, area)?;

    let precip_path = config.resolve(&config.balance.precip_file);
    let precip_steps = read_spatial_mean_series(
        &precip_path,
        &config.balance.precip_variable,
        &config.balance.precip_spatial_dims,
    )
    .with_context(|| format!("Failed to read precipitation from {}", precip_path.display()))?;
    let precipitation = annual_sum(&precip_steps);

    let et_path = config.resolve(&config.et.output_file);
    let et = read_et_annual_means(&et_path, &config.et.variable, &config.balance.et_spatial_dims)
        .with_context(|| format!("Failed to read ET from {}", et_path.display()))?;

    Ok(AlignedFluxes::align(&years, &precipitation, &et, &runoff)?)
}

/// Write the aligned fluxes as `year,precipitation_mm,et_mm,runoff_mm,storage_mm`.
pub fn write_balance_table(path: &Path, rows: &[BalanceRow]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}
