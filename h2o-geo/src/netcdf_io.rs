//! NetCDF files exchanged with the water-balance stage.
//!
//! - the aggregated ET stack written by the aggregator, `(time, y, x)` with
//!   integer calendar years on the time axis
//! - gridded monthly precipitation, averaged over its spatial dimensions
//! - gauge discharge, squeezed to a single time series

use crate::error::{GeoError, Result};
use crate::raster::Raster;
use chrono::{Datelike, NaiveDateTime};
use h2o_core::cf_time::CfTimeUnits;
use h2o_core::year_series::YearSeries;
use h2o_data::aggregate::nan_mean;
use h2o_data::runoff::DischargeSeries;
use log::{debug, info};
use netcdf::AttributeValue;
use std::collections::BTreeMap;
use std::path::Path;

pub const TIME_DIM: &str = "time";
pub const X_DIM: &str = "x";
pub const Y_DIM: &str = "y";

/// Write the per-year clipped rasters as one `(time, y, x)` stack.
///
/// Every slice must share the grid of the first year. The file carries no
/// creation timestamp, so unchanged inputs give an identical file.
pub fn write_et_stack(
    path: &Path,
    variable: &str,
    stack: &BTreeMap<i32, Raster>,
    epsg: u32,
) -> Result<()> {
    let Some((_, first)) = stack.iter().next() else {
        return Err(GeoError::InvalidData("no ET slices to write".to_string()));
    };
    for (year, raster) in stack {
        if !raster.same_grid(first) {
            return Err(GeoError::GridMismatch { year: *year });
        }
    }
    let (rows, cols) = first.data.dim();
    let years: Vec<i32> = stack.keys().copied().collect();
    let values: Vec<f32> = stack
        .values()
        .flat_map(|raster| raster.data.iter().copied())
        .collect();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(h2o_core::error::CoreError::from)?;
    }
    let mut file = netcdf::create(path)?;
    file.add_dimension(TIME_DIM, years.len())?;
    file.add_dimension(Y_DIM, rows)?;
    file.add_dimension(X_DIM, cols)?;

    {
        let mut time_var = file.add_variable::<i32>(TIME_DIM, &[TIME_DIM])?;
        time_var.put_attribute("long_name", "calendar year")?;
        time_var.put_values(&years, ..)?;
    }
    {
        let mut y_var = file.add_variable::<f64>(Y_DIM, &[Y_DIM])?;
        y_var.put_attribute("standard_name", "projection_y_coordinate")?;
        y_var.put_attribute("units", "m")?;
        y_var.put_values(&first.y_coords(), ..)?;
    }
    {
        let mut x_var = file.add_variable::<f64>(X_DIM, &[X_DIM])?;
        x_var.put_attribute("standard_name", "projection_x_coordinate")?;
        x_var.put_attribute("units", "m")?;
        x_var.put_values(&first.x_coords(), ..)?;
    }
    {
        let mut et_var = file.add_variable::<f32>(variable, &[TIME_DIM, Y_DIM, X_DIM])?;
        et_var.put_attribute("_FillValue", f32::NAN)?;
        et_var.put_attribute("long_name", "annual evapotranspiration")?;
        et_var.put_attribute("units", "mm yr-1")?;
        et_var.put_attribute("crs", format!("EPSG:{}", epsg).as_str())?;
        et_var.put_attribute("spatial_ref", first.crs_wkt.as_str())?;
        et_var.put_values(&values, ..)?;
    }
    file.add_attribute("Conventions", "CF-1.8")?;
    file.add_attribute("crs", format!("EPSG:{}", epsg).as_str())?;
    file.add_attribute("spatial_ref", first.crs_wkt.as_str())?;

    info!(
        "Wrote {} years ({}x{} cells) of {} to {}",
        years.len(),
        cols,
        rows,
        variable,
        path.display()
    );
    Ok(())
}

fn attr_f64(var: &netcdf::Variable, name: &str) -> Option<f64> {
    var.attribute_value(name)
        .and_then(|r| r.ok())
        .and_then(|v| match v {
            AttributeValue::Double(d) => Some(d),
            AttributeValue::Float(f) => Some(f as f64),
            AttributeValue::Int(i) => Some(i as f64),
            AttributeValue::Short(s) => Some(s as f64),
            AttributeValue::Ushort(s) => Some(s as f64),
            AttributeValue::Uint(u) => Some(u as f64),
            AttributeValue::Schar(c) => Some(c as f64),
            AttributeValue::Uchar(c) => Some(c as f64),
            AttributeValue::Longlong(l) => Some(l as f64),
            AttributeValue::Doubles(d) => d.first().copied(),
            AttributeValue::Floats(f) => f.first().map(|v| *v as f64),
            _ => None,
        })
}

fn attr_string(var: &netcdf::Variable, name: &str) -> Option<String> {
    var.attribute_value(name)
        .and_then(|r| r.ok())
        .and_then(|v| match v {
            AttributeValue::Str(s) => Some(s),
            _ => None,
        })
}

fn dimension_names(var: &netcdf::Variable) -> Vec<String> {
    var.dimensions().iter().map(|d| d.name()).collect()
}

/// Values of `var` as f64 with fill and missing values set to NaN and
/// `scale_factor`/`add_offset` applied.
fn read_masked(var: &netcdf::Variable) -> Result<Vec<f64>> {
    let fill = attr_f64(var, "_FillValue");
    let missing = attr_f64(var, "missing_value");
    let scale = attr_f64(var, "scale_factor").unwrap_or(1.0);
    let offset = attr_f64(var, "add_offset").unwrap_or(0.0);
    let raw: Vec<f64> = var.get_values::<f64, _>(..)?;
    Ok(raw
        .into_iter()
        .map(|v| {
            if !v.is_finite() || Some(v) == fill || Some(v) == missing {
                f64::NAN
            } else {
                v * scale + offset
            }
        })
        .collect())
}

fn variable<'f>(file: &'f netcdf::File, name: &str) -> Result<netcdf::Variable<'f>> {
    file.variable(name)
        .ok_or_else(|| GeoError::MissingVariable(name.to_string()))
}

/// Time stamps of the `time` coordinate, decoded from its CF units.
fn read_cf_time(file: &netcdf::File) -> Result<Vec<NaiveDateTime>> {
    let time_var = variable(file, TIME_DIM)?;
    let units = attr_string(&time_var, "units").ok_or_else(|| GeoError::MissingMetadata {
        item: "time units".to_string(),
        path: file.path().map(|p| p.display().to_string()).unwrap_or_default(),
    })?;
    let calendar = attr_string(&time_var, "calendar");
    let units = CfTimeUnits::parse(&units, calendar.as_deref())?;
    let offsets: Vec<f64> = time_var.get_values::<f64, _>(..)?;
    Ok(units.decode_all(&offsets)?)
}

/// Mean over every dimension except `time`, one value per time step.
///
/// The variable's non-time dimensions must be exactly `spatial_dims`, in
/// any order.
fn spatial_means(var: &netcdf::Variable, spatial_dims: &[String]) -> Result<Vec<f64>> {
    let names = dimension_names(var);
    let mut expected: Vec<String> = spatial_dims.to_vec();
    expected.push(TIME_DIM.to_string());
    let mut found_sorted = names.clone();
    found_sorted.sort();
    let mut expected_sorted = expected.clone();
    expected_sorted.sort();
    if found_sorted != expected_sorted {
        return Err(GeoError::Dimension {
            variable: var.name(),
            expected,
            found: names,
        });
    }

    let lens: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
    let time_axis = names.iter().position(|n| n == TIME_DIM).unwrap_or(0);
    let stride: usize = lens[time_axis + 1..].iter().product();
    let n_time = lens[time_axis];

    let values = read_masked(var)?;
    let mut per_time: Vec<Vec<f64>> = vec![Vec::new(); n_time];
    for (i, v) in values.into_iter().enumerate() {
        per_time[(i / stride.max(1)) % n_time.max(1)].push(v);
    }
    Ok(per_time.into_iter().map(nan_mean).collect())
}

/// Basin-mean ET per year from the aggregated stack.
pub fn read_et_annual_means(path: &Path, variable_name: &str, spatial_dims: &[String]) -> Result<YearSeries> {
    let file = netcdf::open(path)?;
    let var = variable(&file, variable_name)?;
    let means = spatial_means(&var, spatial_dims)?;

    let time_var = variable(&file, TIME_DIM)?;
    let years: Vec<i32> = match attr_string(&time_var, "units").filter(|u| u.contains(" since ")) {
        Some(_) => read_cf_time(&file)?.iter().map(|t| t.year()).collect(),
        None => time_var
            .get_values::<f64, _>(..)?
            .into_iter()
            .map(|y| y.round() as i32)
            .collect(),
    };
    if years.len() != means.len() {
        return Err(GeoError::InvalidData(format!(
            "{} time values for {} {} slices",
            years.len(),
            means.len(),
            variable_name
        )));
    }

    let mut series = YearSeries::new();
    for (year, mean) in years.into_iter().zip(means) {
        if series.insert(year, mean).is_some() {
            return Err(GeoError::InvalidData(format!(
                "{} holds year {} more than once",
                path.display(),
                year
            )));
        }
        debug!("ET {}: {:.1} mm", year, mean);
    }
    Ok(series)
}

/// Spatial-mean precipitation at each time step.
pub fn read_spatial_mean_series(
    path: &Path,
    variable_name: &str,
    spatial_dims: &[String],
) -> Result<Vec<(NaiveDateTime, f64)>> {
    let file = netcdf::open(path)?;
    let var = variable(&file, variable_name)?;
    let means = spatial_means(&var, spatial_dims)?;
    let times = read_cf_time(&file)?;
    if times.len() != means.len() {
        return Err(GeoError::InvalidData(format!(
            "{} time values for {} {} steps",
            times.len(),
            means.len(),
            variable_name
        )));
    }
    info!("{}: {} time steps of {}", path.display(), times.len(), variable_name);
    Ok(times.into_iter().zip(means).collect())
}

/// Discharge at the gauge. Dimensions other than `time` must have length 1.
pub fn read_discharge(path: &Path, variable_name: &str) -> Result<DischargeSeries> {
    let file = netcdf::open(path)?;
    let var = variable(&file, variable_name)?;
    let names = dimension_names(&var);
    let wide: Vec<String> = var
        .dimensions()
        .iter()
        .filter(|d| d.name() != TIME_DIM && d.len() != 1)
        .map(|d| d.name())
        .collect();
    if !names.iter().any(|n| n == TIME_DIM) || !wide.is_empty() {
        return Err(GeoError::Dimension {
            variable: variable_name.to_string(),
            expected: vec![TIME_DIM.to_string()],
            found: names,
        });
    }

    let rates = read_masked(&var)?;
    let times = read_cf_time(&file)?;
    let series = DischargeSeries::from_parts(&times, &rates)?;
    info!(
        "{}: {} discharge samples from {} to {}",
        path.display(),
        series.len(),
        times.first().map(|t| t.to_string()).unwrap_or_default(),
        times.last().map(|t| t.to_string()).unwrap_or_default()
    );
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GeoTransform;
    use chrono::NaiveDate;
    use h2o_data::aggregate::annual_sum;
    use ndarray::Array2;
    use tempfile::tempdir;

    fn dims(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn slice(values: Vec<f32>) -> Raster {
        Raster::new(
            Array2::from_shape_vec((2, 2), values).unwrap(),
            GeoTransform::new(1000.0, 2000.0, 500.0, -500.0),
            "PROJCS[\"test\"]".to_string(),
        )
    }

    fn stack() -> BTreeMap<i32, Raster> {
        let mut stack = BTreeMap::new();
        stack.insert(2015, slice(vec![400.0, 420.0, f32::NAN, 440.0]));
        stack.insert(2014, slice(vec![300.0, f32::NAN, f32::NAN, 500.0]));
        stack
    }

    #[test]
    fn test_et_stack_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("processed/et.nc");
        write_et_stack(&path, "ET", &stack(), 5070).unwrap();

        let file = netcdf::open(&path).unwrap();
        let years: Vec<i32> = file.variable("time").unwrap().get_values::<i32, _>(..).unwrap();
        assert_eq!(years, vec![2014, 2015]);
        let xs: Vec<f64> = file.variable("x").unwrap().get_values::<f64, _>(..).unwrap();
        assert_eq!(xs, vec![1250.0, 1750.0]);
        let ys: Vec<f64> = file.variable("y").unwrap().get_values::<f64, _>(..).unwrap();
        assert_eq!(ys, vec![1750.0, 1250.0]);
        let et = file.variable("ET").unwrap();
        assert_eq!(dimension_names(&et), dims(&["time", "y", "x"]));
        assert_eq!(attr_string(&et, "crs").as_deref(), Some("EPSG:5070"));

        let means = read_et_annual_means(&path, "ET", &dims(&["x", "y"])).unwrap();
        assert_eq!(means.get(2014), Some(400.0));
        assert!((means.get(2015).unwrap() - 420.0).abs() < 1e-9);
    }

    #[test]
    fn test_et_stack_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("et.nc");
        write_et_stack(&path, "ET", &stack(), 5070).unwrap();
        let first: Vec<f32> = netcdf::open(&path).unwrap().variable("ET").unwrap().get_values::<f32, _>(..).unwrap();
        write_et_stack(&path, "ET", &stack(), 5070).unwrap();
        let second: Vec<f32> = netcdf::open(&path).unwrap().variable("ET").unwrap().get_values::<f32, _>(..).unwrap();
        assert_eq!(first.len(), second.len());
        assert!(first
            .iter()
            .zip(&second)
            .all(|(a, b)| a.to_bits() == b.to_bits()));
    }

    #[test]
    fn test_grid_mismatch_is_rejected() {
        let dir = tempdir().unwrap();
        let mut stack = stack();
        let mut shifted = slice(vec![1.0; 4]);
        shifted.transform.origin_x += 500.0;
        stack.insert(2016, shifted);
        assert!(matches!(
            write_et_stack(&dir.path().join("et.nc"), "ET", &stack, 5070),
            Err(GeoError::GridMismatch { year: 2016 })
        ));
    }

    #[test]
    fn test_wrong_spatial_dims_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("et.nc");
        write_et_stack(&path, "ET", &stack(), 5070).unwrap();
        assert!(matches!(
            read_et_annual_means(&path, "ET", &dims(&["lon", "lat"])),
            Err(GeoError::Dimension { .. })
        ));
        assert!(matches!(
            read_et_annual_means(&path, "evap", &dims(&["x", "y"])),
            Err(GeoError::MissingVariable(_))
        ));
    }

    #[test]
    fn test_precip_spatial_means_and_annual_sum() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("precip.nc");
        {
            let mut file = netcdf::create(&path).unwrap();
            file.add_dimension("time", 3).unwrap();
            file.add_dimension("lon", 2).unwrap();
            file.add_dimension("lat", 1).unwrap();
            let mut time = file.add_variable::<f64>("time", &["time"]).unwrap();
            time.put_attribute("units", "days since 2014-01-01").unwrap();
            time.put_attribute("calendar", "standard").unwrap();
            time.put_values(&[0.0, 31.0, 365.0], ..).unwrap();
            let mut precip = file.add_variable::<f32>("precip_monthly", &["time", "lon", "lat"]).unwrap();
            precip.put_attribute("_FillValue", -9999.0f32).unwrap();
            precip
                .put_values(&[10.0f32, 20.0, 30.0, -9999.0, 5.0, 7.0], ..)
                .unwrap();
        }

        let series = read_spatial_mean_series(&path, "precip_monthly", &dims(&["lon", "lat"])).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series[0].1, 15.0);
        assert_eq!(series[1].1, 30.0);
        assert_eq!(series[2].0.date(), NaiveDate::from_ymd_opt(2015, 1, 1).unwrap());

        let annual = annual_sum(&series);
        assert_eq!(annual.get(2014), Some(45.0));
        assert_eq!(annual.get(2015), Some(6.0));
    }

    #[test]
    fn test_discharge_squeezes_singleton_dims() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hysets.nc");
        {
            let mut file = netcdf::create(&path).unwrap();
            file.add_dimension("watershed", 1).unwrap();
            file.add_dimension("time", 4).unwrap();
            let mut time = file.add_variable::<f64>("time", &["time"]).unwrap();
            time.put_attribute("units", "days since 1950-01-01").unwrap();
            time.put_values(&[23741.0, 23742.0, 23743.0, 23744.0], ..).unwrap();
            let mut q = file.add_variable::<f32>("discharge", &["watershed", "time"]).unwrap();
            q.put_attribute("_FillValue", -1.0f32).unwrap();
            q.put_values(&[100.0f32, -1.0, 120.0, 130.0], ..).unwrap();
        }

        let series = read_discharge(&path, "discharge").unwrap();
        assert_eq!(series.len(), 4);
        let first = series.samples()[0];
        assert_eq!(first.time.date(), NaiveDate::from_ymd_opt(2015, 1, 1).unwrap());
        assert_eq!(first.rate, 100.0);
        assert!(series.samples()[1].rate.is_nan());
    }

    #[test]
    fn test_discharge_with_multiple_gauges_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hysets.nc");
        {
            let mut file = netcdf::create(&path).unwrap();
            file.add_dimension("watershed", 2).unwrap();
            file.add_dimension("time", 1).unwrap();
            let mut time = file.add_variable::<f64>("time", &["time"]).unwrap();
            time.put_attribute("units", "days since 1950-01-01").unwrap();
            time.put_values(&[0.0], ..).unwrap();
            let mut q = file.add_variable::<f32>("discharge", &["watershed", "time"]).unwrap();
            q.put_values(&[1.0f32, 2.0], ..).unwrap();
        }
        assert!(matches!(
            read_discharge(&path, "discharge"),
            Err(GeoError::Dimension { .. })
        ));
    }
}
