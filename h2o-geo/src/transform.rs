//! Coordinate transformation between CRSs.

use crate::error::{GeoError, Result};
use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};

/// Transforms coordinate arrays in place.
pub trait PointTransform {
    fn transform(&self, xs: &mut [f64], ys: &mut [f64]) -> Result<()>;

    fn transform_point(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let mut xs = [x];
        let mut ys = [y];
        self.transform(&mut xs, &mut ys)?;
        Ok((xs[0], ys[0]))
    }
}

/// CRS from an EPSG code, with x/y in easting/northing (lon/lat) order.
pub fn spatial_ref_from_epsg(code: u32) -> Result<SpatialRef> {
    let mut srs = SpatialRef::from_epsg(code)
        .map_err(|e| GeoError::Crs(format!("EPSG:{}: {}", code, e)))?;
    srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    Ok(srs)
}

pub fn spatial_ref_from_wkt(wkt: &str) -> Result<SpatialRef> {
    if wkt.trim().is_empty() {
        return Err(GeoError::Crs("empty WKT".to_string()));
    }
    let mut srs = SpatialRef::from_wkt(wkt).map_err(|e| GeoError::Crs(e.to_string()))?;
    srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    Ok(srs)
}

/// GDAL/PROJ backed transformation.
pub struct GdalTransform {
    inner: CoordTransform,
}

impl GdalTransform {
    pub fn new(source: &SpatialRef, target: &SpatialRef) -> Result<Self> {
        let inner = CoordTransform::new(source, target)
            .map_err(|e| GeoError::Crs(format!("no transformation available: {}", e)))?;
        Ok(Self { inner })
    }
}

impl PointTransform for GdalTransform {
    fn transform(&self, xs: &mut [f64], ys: &mut [f64]) -> Result<()> {
        if xs.is_empty() {
            return Ok(());
        }
        let mut zs = vec![0.0; xs.len()];
        self.inner.transform_coords(xs, ys, &mut zs)?;
        Ok(())
    }
}
