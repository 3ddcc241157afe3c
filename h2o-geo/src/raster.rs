//! In-memory single-band rasters on north-up grids.

use crate::error::{GeoError, Result};
use h2o_core::bbox::BoundingBox;
use ndarray::Array2;

/// Affine transform of a north-up grid (no rotation terms).
///
/// `x = origin_x + col * pixel_width`, `y = origin_y + row * pixel_height`
/// where `pixel_height` is negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// From GDAL's six coefficients. Rotated grids are rejected.
    pub fn from_gdal(coeffs: [f64; 6]) -> Result<Self> {
        if coeffs[2] != 0.0 || coeffs[4] != 0.0 {
            return Err(GeoError::InvalidData(format!(
                "rotated geotransform {:?} is not supported",
                coeffs
            )));
        }
        if coeffs[1] == 0.0 || coeffs[5] == 0.0 {
            return Err(GeoError::InvalidData(format!(
                "degenerate geotransform {:?}",
                coeffs
            )));
        }
        Ok(Self::new(coeffs[0], coeffs[3], coeffs[1], coeffs[5]))
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            0.0,
            self.origin_y,
            0.0,
            self.pixel_height,
        ]
    }

    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y + (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Fractional (col, row) of a map coordinate.
    pub fn to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }

    pub fn bounds(&self, rows: usize, cols: usize) -> BoundingBox {
        let x1 = self.origin_x + cols as f64 * self.pixel_width;
        let y1 = self.origin_y + rows as f64 * self.pixel_height;
        BoundingBox::new(
            self.origin_x.min(x1),
            self.origin_y.min(y1),
            self.origin_x.max(x1),
            self.origin_y.max(y1),
        )
    }

    pub fn approx_eq(&self, other: &GeoTransform, tolerance: f64) -> bool {
        (self.origin_x - other.origin_x).abs() <= tolerance
            && (self.origin_y - other.origin_y).abs() <= tolerance
            && (self.pixel_width - other.pixel_width).abs() <= tolerance
            && (self.pixel_height - other.pixel_height).abs() <= tolerance
    }
}

/// A single band of f32 values, NaN where there is no data.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub data: Array2<f32>,
    pub transform: GeoTransform,
    /// WKT of the grid's CRS
    pub crs_wkt: String,
}

impl Raster {
    pub fn new(data: Array2<f32>, transform: GeoTransform, crs_wkt: String) -> Self {
        Self {
            data,
            transform,
            crs_wkt,
        }
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    pub fn bounds(&self) -> BoundingBox {
        self.transform.bounds(self.rows(), self.cols())
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_finite()).count()
    }

    /// Same shape and (within a millimetre) the same transform.
    pub fn same_grid(&self, other: &Raster) -> bool {
        self.data.dim() == other.data.dim() && self.transform.approx_eq(&other.transform, 1e-3)
    }

    /// Centre coordinates of the columns, west to east.
    pub fn x_coords(&self) -> Vec<f64> {
        (0..self.cols()).map(|c| self.transform.cell_center(0, c).0).collect()
    }

    /// Centre coordinates of the rows, top to bottom.
    pub fn y_coords(&self) -> Vec<f64> {
        (0..self.rows()).map(|r| self.transform.cell_center(r, 0).1).collect()
    }
}
