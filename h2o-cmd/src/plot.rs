//! SVG charts of the annual fluxes and the storage change.

use anyhow::anyhow;
use h2o_data::balance::AlignedFluxes;
use log::info;
use plotters::prelude::*;
use std::path::Path;

pub const FLUXES_SVG: &str = "fluxes.svg";
pub const STORAGE_SVG: &str = "storage.svg";

const SIZE: (u32, u32) = (800, 600);

/// Padded (min, max) of the finite values, always including zero.
fn value_range(values: &[f64]) -> (f64, f64) {
    let (lo, hi) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0f64, 0.0f64), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    let pad = ((hi - lo) * 0.05).max(1.0);
    (lo - pad, hi + pad)
}

fn year_range(years: &[i32]) -> (f64, f64) {
    match (years.first(), years.last()) {
        (Some(first), Some(last)) => (*first as f64 - 0.5, *last as f64 + 0.5),
        _ => (0.0, 1.0),
    }
}

/// Precipitation, ET and runoff as three lines.
pub fn plot_fluxes(fluxes: &AlignedFluxes, path: &Path) -> anyhow::Result<()> {
    let years = fluxes.years();
    let all: Vec<f64> = [fluxes.precipitation(), fluxes.et(), fluxes.runoff()].concat();
    let (y_min, y_max) = value_range(&all);
    let (x_min, x_max) = year_range(years);

    let backend_drawing_area = SVGBackend::new(path, SIZE).into_drawing_area();
    backend_drawing_area
        .fill(&WHITE)
        .map_err(|e| anyhow!("Failed to draw {}: {}", path.display(), e))?;
    let mut chart = ChartBuilder::on(&backend_drawing_area)
        .margin(20i32)
        .x_label_area_size(30u32)
        .y_label_area_size(60u32)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(|e| anyhow!("Failed to build chart: {}", e))?;
    chart
        .configure_mesh()
        .x_labels(years.len().max(2))
        .x_label_formatter(&|x| format!("{:.0}", x))
        .y_desc("Water Flux (mm per year)")
        .draw()
        .map_err(|e| anyhow!("Failed to draw mesh: {}", e))?;

    let series: [(&str, &[f64], RGBColor); 3] = [
        ("Precipitation", fluxes.precipitation(), BLUE),
        ("ET", fluxes.et(), GREEN),
        ("Runoff", fluxes.runoff(), RED),
    ];
    for (label, values, color) in series {
        chart
            .draw_series(LineSeries::new(
                years
                    .iter()
                    .zip(values)
                    .map(|(year, value)| (*year as f64, *value))
                    .collect::<Vec<_>>(),
                color,
            ))
            .map_err(|e| anyhow!("Failed to draw {} series: {}", label, e))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(|e| anyhow!("Failed to draw legend: {}", e))?;
    backend_drawing_area
        .present()
        .map_err(|e| anyhow!("Failed to write {}: {}", path.display(), e))?;
    info!("Wrote {}", path.display());
    Ok(())
}

/// Storage change per year as bars.
pub fn plot_storage(years: &[i32], storage: &[f64], path: &Path) -> anyhow::Result<()> {
    let (y_min, y_max) = value_range(storage);
    let (x_min, x_max) = year_range(years);

    let backend_drawing_area = SVGBackend::new(path, SIZE).into_drawing_area();
    backend_drawing_area
        .fill(&WHITE)
        .map_err(|e| anyhow!("Failed to draw {}: {}", path.display(), e))?;
    let mut chart = ChartBuilder::on(&backend_drawing_area)
        .margin(20i32)
        .x_label_area_size(30u32)
        .y_label_area_size(60u32)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(|e| anyhow!("Failed to build chart: {}", e))?;
    chart
        .configure_mesh()
        .x_labels(years.len().max(2))
        .x_label_formatter(&|x| format!("{:.0}", x))
        .y_desc("Change in Storage (mm per year)")
        .draw()
        .map_err(|e| anyhow!("Failed to draw mesh: {}", e))?;

    chart
        .draw_series(
            years
                .iter()
                .zip(storage)
                .filter(|(_, value)| value.is_finite())
                .map(|(year, value)| {
                    let x = *year as f64;
                    Rectangle::new([(x - 0.4, 0.0), (x + 0.4, *value)], BLUE.filled())
                }),
        )
        .map_err(|e| anyhow!("Failed to draw storage bars: {}", e))?;
    chart
        .draw_series(LineSeries::new(vec![(x_min, 0.0), (x_max, 0.0)], BLACK))
        .map_err(|e| anyhow!("Failed to draw zero line: {}", e))?;

    backend_drawing_area
        .present()
        .map_err(|e| anyhow!("Failed to write {}: {}", path.display(), e))?;
    info!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use h2o_core::year_series::YearSeries;
    use tempfile::tempdir;

    #[test]
    fn test_value_range_includes_zero() {
        let (lo, hi) = value_range(&[50.0, 70.0, f64::NAN]);
        assert!(lo < 0.0 && hi > 70.0);
        let (lo, hi) = value_range(&[-20.0, -10.0]);
        assert!(lo < -20.0 && hi > 0.0);
    }

    #[test]
    fn test_plots_are_written() {
        let dir = tempdir().unwrap();
        let p: YearSeries = vec![(2014, 600.0), (2015, 650.0)].into_iter().collect();
        let et: YearSeries = vec![(2014, 400.0), (2015, 420.0)].into_iter().collect();
        let r: YearSeries = vec![(2014, 150.0), (2015, 160.0)].into_iter().collect();
        let fluxes = AlignedFluxes::align(&[2014, 2015], &p, &et, &r).unwrap();

        let fluxes_svg = dir.path().join(FLUXES_SVG);
        let storage_svg = dir.path().join(STORAGE_SVG);
        plot_fluxes(&fluxes, &fluxes_svg).unwrap();
        plot_storage(fluxes.years(), &fluxes.storage_change(), &storage_svg).unwrap();

        let svg = std::fs::read_to_string(&fluxes_svg).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("Precipitation"));
        assert!(std::fs::metadata(&storage_svg).unwrap().len() > 0);
    }
}
