//! Decoding of MODIS HDF-EOS granules and the per-year GeoTIFF files
//! derived from them.

use crate::error::{GeoError, Result};
use crate::raster::{GeoTransform, Raster};
use gdal::raster::{Buffer, RasterBand};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager, Metadata};
use h2o_core::granule::{processed_file_name, GranuleName};
use log::{debug, info};
use ndarray::Array2;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// GDAL metadata item carrying the acquisition year of a processed raster.
pub const YEAR_METADATA_ITEM: &str = "ACQUISITION_YEAR";

/// GDAL name of one band of an HDF4-EOS grid.
pub fn subdataset_path(path: &Path, grid: &str, band: &str) -> String {
    format!("HDF4_EOS:EOS_GRID:\"{}\":{}:{}", path.display(), grid, band)
}

/// Packing of a stored band: `physical = raw * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandEncoding {
    pub scale: f64,
    pub offset: f64,
    pub fill: Option<f64>,
    pub valid_range: Option<(f64, f64)>,
}

impl Default for BandEncoding {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: 0.0,
            fill: None,
            valid_range: None,
        }
    }
}

impl BandEncoding {
    /// Physical value of `raw`, NaN for fill and out-of-range cells.
    pub fn decode(&self, raw: f64) -> f32 {
        if !raw.is_finite() || self.fill == Some(raw) {
            return f32::NAN;
        }
        if let Some((lo, hi)) = self.valid_range {
            if raw < lo || raw > hi {
                return f32::NAN;
            }
        }
        (raw * self.scale + self.offset) as f32
    }

    fn read(dataset: &Dataset, band: &RasterBand) -> Self {
        let item = |key: &str| {
            band.metadata_item(key, "")
                .or_else(|| dataset.metadata_item(key, ""))
        };
        let number = |key: &str| item(key).and_then(|v| parse_numbers(&v).first().copied());

        let valid_range = item("valid_range").and_then(|v| match parse_numbers(&v)[..] {
            [lo, hi] => Some((lo, hi)),
            _ => None,
        });
        Self {
            scale: band.scale().or_else(|| number("scale_factor")).unwrap_or(1.0),
            offset: band.offset().or_else(|| number("add_offset")).unwrap_or(0.0),
            fill: band.no_data_value().or_else(|| number("_FillValue")),
            valid_range,
        }
    }
}

fn parse_numbers(text: &str) -> Vec<f64> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .filter_map(|t| t.parse::<f64>().ok())
        .collect()
}

fn read_band(dataset: &Dataset, decode: impl Fn(f64) -> f32) -> Result<Raster> {
    let band = dataset.rasterband(1)?;
    let (cols, rows) = dataset.raster_size();
    let buffer = band.read_as::<f64>((0, 0), (cols, rows), (cols, rows), None)?;
    let values: Vec<f32> = buffer.data().iter().map(|v| decode(*v)).collect();
    let data = Array2::from_shape_vec((rows, cols), values)?;
    let transform = GeoTransform::from_gdal(dataset.geo_transform()?)?;
    Ok(Raster::new(data, transform, dataset.projection()))
}

/// Open `source` with GDAL and decode its first band to physical units.
pub fn decode_band(source: &str) -> Result<Raster> {
    let dataset = Dataset::open(Path::new(source))?;
    let band = dataset.rasterband(1)?;
    let encoding = BandEncoding::read(&dataset, &band);
    debug!("{}: {:?}", source, encoding);
    let raster = read_band(&dataset, |raw| encoding.decode(raw))?;
    if raster.crs_wkt.is_empty() {
        return Err(GeoError::MissingMetadata {
            item: "CRS".to_string(),
            path: source.to_string(),
        });
    }
    Ok(raster)
}

/// Decode one band of an HDF4-EOS granule.
pub fn decode_granule(path: &Path, grid: &str, band: &str) -> Result<Raster> {
    decode_band(&subdataset_path(path, grid, band))
}

/// Write `raster` as a single-band f32 GeoTIFF tagged with `year`.
pub fn write_geotiff(raster: &Raster, year: i32, path: &Path) -> Result<()> {
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let (rows, cols) = raster.data.dim();
    let mut dataset = driver.create_with_band_type::<f32, _>(path, cols, rows, 1)?;
    dataset.set_geo_transform(&raster.transform.to_gdal())?;
    let srs = SpatialRef::from_wkt(&raster.crs_wkt).map_err(|e| GeoError::Crs(e.to_string()))?;
    dataset.set_spatial_ref(&srs)?;
    dataset.set_metadata_item(YEAR_METADATA_ITEM, &year.to_string(), "")?;

    let mut band = dataset.rasterband(1)?;
    band.set_no_data_value(Some(f64::NAN))?;
    let values: Vec<f32> = raster.data.iter().copied().collect();
    let mut buffer = Buffer::new((cols, rows), values);
    band.write((0, 0), (cols, rows), &mut buffer)?;
    Ok(())
}

/// Read a processed GeoTIFF together with its acquisition year.
pub fn read_geotiff(path: &Path) -> Result<(i32, Raster)> {
    let dataset = Dataset::open(path)?;
    let year = read_year(&dataset, path)?;
    let raster = read_band(&dataset, |v| if v.is_finite() { v as f32 } else { f32::NAN })?;
    Ok((year, raster))
}

fn read_year(dataset: &Dataset, path: &Path) -> Result<i32> {
    let missing = || GeoError::MissingMetadata {
        item: YEAR_METADATA_ITEM.to_string(),
        path: path.display().to_string(),
    };
    dataset
        .metadata_item(YEAR_METADATA_ITEM, "")
        .ok_or_else(missing)?
        .trim()
        .parse::<i32>()
        .map_err(|_| missing())
}

/// Decode a granule's ET band and persist it as
/// `<processed_dir>/<SHORT_NAME>_<YYYY>_<band>.tiff`.
pub fn convert_granule(
    name: &GranuleName,
    path: &Path,
    grid: &str,
    band: &str,
    processed_dir: &Path,
) -> Result<PathBuf> {
    let raster = decode_granule(path, grid, band)?;
    let output = processed_dir.join(processed_file_name(&name.short_name, name.year, band));
    write_geotiff(&raster, name.year, &output)?;
    info!(
        "{} -> {} ({} valid cells)",
        name.file_name,
        output.display(),
        raster.valid_count()
    );
    Ok(output)
}

/// Key processed GeoTIFFs by the year stored in their metadata.
pub fn index_processed(paths: &[PathBuf]) -> Result<BTreeMap<i32, PathBuf>> {
    let mut index = BTreeMap::new();
    for path in paths {
        let dataset = Dataset::open(path)?;
        let year = read_year(&dataset, path)?;
        if let Some(previous) = index.insert(year, path.clone()) {
            return Err(h2o_core::error::CoreError::DuplicateYear {
                year,
                first: previous.display().to_string(),
                second: path.display().to_string(),
            }
            .into());
        }
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::spatial_ref_from_epsg;
    use tempfile::tempdir;

    fn albers_wkt() -> String {
        spatial_ref_from_epsg(5070).unwrap().to_wkt().unwrap()
    }

    #[test]
    fn test_subdataset_path() {
        assert_eq!(
            subdataset_path(Path::new("/d/MOD16A3GF.A2016001.h10v04.061.1.hdf"), "MOD_Grid_MOD16A3", "ET_500m"),
            "HDF4_EOS:EOS_GRID:\"/d/MOD16A3GF.A2016001.h10v04.061.1.hdf\":MOD_Grid_MOD16A3:ET_500m"
        );
    }

    #[test]
    fn test_encoding_masks_fill_and_range() {
        let encoding = BandEncoding {
            scale: 0.1,
            offset: 0.0,
            fill: Some(32767.0),
            valid_range: Some((-32767.0, 32700.0)),
        };
        assert!((encoding.decode(4521.0) - 452.1).abs() < 1e-3);
        assert!(encoding.decode(32767.0).is_nan());
        assert!(encoding.decode(32761.0).is_nan());
        assert!(encoding.decode(f64::NAN).is_nan());
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_numbers("-32767, 32700"), vec![-32767.0, 32700.0]);
        assert_eq!(parse_numbers("0.1"), vec![0.1]);
    }

    #[test]
    fn test_decode_scaled_band() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("packed.tif");
        {
            let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
            let mut dataset = driver.create_with_band_type::<i16, _>(&path, 2, 2, 1).unwrap();
            dataset
                .set_geo_transform(&[0.0, 500.0, 0.0, 1000.0, 0.0, -500.0])
                .unwrap();
            dataset.set_spatial_ref(&spatial_ref_from_epsg(5070).unwrap()).unwrap();
            let mut band = dataset.rasterband(1).unwrap();
            band.set_no_data_value(Some(32767.0)).unwrap();
            band.set_metadata_item("scale_factor", "0.1", "").unwrap();
            band.set_metadata_item("valid_range", "-32767, 32700", "").unwrap();
            let mut buffer = Buffer::new((2, 2), vec![100i16, 32767, 32761, -5]);
            band.write((0, 0), (2, 2), &mut buffer).unwrap();
        }

        let raster = decode_band(path.to_str().unwrap()).unwrap();
        assert_eq!(raster.data.dim(), (2, 2));
        assert!((raster.data[[0, 0]] - 10.0).abs() < 1e-5);
        assert!(raster.data[[0, 1]].is_nan());
        assert!(raster.data[[1, 0]].is_nan());
        assert!((raster.data[[1, 1]] + 0.5).abs() < 1e-5);
        assert_eq!(raster.transform, GeoTransform::new(0.0, 1000.0, 500.0, -500.0));
    }

    #[test]
    fn test_geotiff_round_trip_keeps_year_and_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("MOD16A3GF_2016_ET_500m.tiff");
        let data = Array2::from_shape_vec((2, 3), vec![452.1f32, f32::NAN, 0.1, 1.5, 2.25, 3.0]).unwrap();
        let raster = Raster::new(data, GeoTransform::new(100.0, 200.0, 463.3, -463.3), albers_wkt());
        write_geotiff(&raster, 2016, &path).unwrap();

        let (year, loaded) = read_geotiff(&path).unwrap();
        assert_eq!(year, 2016);
        assert!(loaded.same_grid(&raster));
        for (a, b) in loaded.data.iter().zip(raster.data.iter()) {
            assert!((a.is_nan() && b.is_nan()) || (a - b).abs() <= f32::EPSILON * b.abs());
        }
    }

    #[test]
    fn test_index_processed_uses_metadata_not_names() {
        let dir = tempdir().unwrap();
        let raster = Raster::new(
            Array2::from_elem((1, 1), 1.0f32),
            GeoTransform::new(0.0, 1.0, 1.0, -1.0),
            albers_wkt(),
        );
        // Names sort opposite to the years they hold.
        let a = dir.path().join("a.tiff");
        let b = dir.path().join("b.tiff");
        write_geotiff(&raster, 2015, &a).unwrap();
        write_geotiff(&raster, 2014, &b).unwrap();

        let index = index_processed(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(index[&2014], b);
        assert_eq!(index[&2015], a);

        let err = index_processed(&[a.clone(), a]).unwrap_err();
        assert!(matches!(
            err,
            GeoError::Core(h2o_core::error::CoreError::DuplicateYear { year: 2015, .. })
        ));
    }
}
