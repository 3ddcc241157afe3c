//! Reprojection of a raster onto the basin's equal-area grid, clipped to the
//! basin polygon.
//!
//! The target grid follows GDAL's suggested-warp-output rule: the source
//! footprint is sampled along its edges and transformed, and the square cell
//! size is the transformed extent's diagonal divided by the source's diagonal
//! in pixels. Only the window covering the basin bounds is resampled
//! (nearest neighbour); cells whose centre falls outside the polygon are NaN.

use crate::basin::BasinBoundary;
use crate::error::{GeoError, Result};
use crate::raster::{GeoTransform, Raster};
use crate::transform::{spatial_ref_from_epsg, spatial_ref_from_wkt, GdalTransform, PointTransform};
use h2o_core::bbox::BoundingBox;
use log::debug;
use ndarray::Array2;

const EDGE_SAMPLES: usize = 21;

/// A grid shape plus its placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetGrid {
    pub transform: GeoTransform,
    pub rows: usize,
    pub cols: usize,
}

impl TargetGrid {
    pub fn resolution(&self) -> f64 {
        self.transform.pixel_width
    }

    pub fn bounds(&self) -> BoundingBox {
        self.transform.bounds(self.rows, self.cols)
    }
}

/// Full target grid for `source` under `forward`.
pub fn suggest_grid(source: &Raster, forward: &dyn PointTransform) -> Result<TargetGrid> {
    let bounds = source.bounds();
    let mut xs = Vec::with_capacity(EDGE_SAMPLES * 4);
    let mut ys = Vec::with_capacity(EDGE_SAMPLES * 4);
    for i in 0..EDGE_SAMPLES {
        let t = i as f64 / (EDGE_SAMPLES - 1) as f64;
        let x = bounds.min_x + t * bounds.width();
        let y = bounds.min_y + t * bounds.height();
        xs.extend([x, x, bounds.min_x, bounds.max_x]);
        ys.extend([bounds.min_y, bounds.max_y, y, y]);
    }
    forward.transform(&mut xs, &mut ys)?;
    let extent = BoundingBox::from_points(xs.into_iter().zip(ys))
        .ok_or_else(|| GeoError::Crs("raster footprint does not transform to the target CRS".to_string()))?;

    let pixel_diagonal = ((source.cols().pow(2) + source.rows().pow(2)) as f64).sqrt();
    let resolution = extent.width().hypot(extent.height()) / pixel_diagonal;
    if !(resolution.is_finite() && resolution > 0.0) {
        return Err(GeoError::InvalidData(format!(
            "degenerate target resolution {}",
            resolution
        )));
    }
    Ok(TargetGrid {
        transform: GeoTransform::new(extent.min_x, extent.max_y, resolution, -resolution),
        rows: (extent.height() / resolution).ceil() as usize,
        cols: (extent.width() / resolution).ceil() as usize,
    })
}

/// The sub-grid of `grid` covering `bbox`, snapped outward to whole cells.
pub fn clip_window(grid: &TargetGrid, bbox: &BoundingBox) -> Option<TargetGrid> {
    if !grid.bounds().intersects(bbox) {
        return None;
    }
    let res = grid.resolution();
    let origin_x = grid.transform.origin_x;
    let origin_y = grid.transform.origin_y;
    let clamp = |v: f64, max: usize| (v.max(0.0) as usize).min(max);
    let col0 = clamp(((bbox.min_x - origin_x) / res).floor(), grid.cols);
    let col1 = clamp(((bbox.max_x - origin_x) / res).ceil(), grid.cols);
    let row0 = clamp(((origin_y - bbox.max_y) / res).floor(), grid.rows);
    let row1 = clamp(((origin_y - bbox.min_y) / res).ceil(), grid.rows);
    if col1 <= col0 || row1 <= row0 {
        return None;
    }
    Some(TargetGrid {
        transform: GeoTransform::new(
            origin_x + col0 as f64 * res,
            origin_y - row0 as f64 * res,
            res,
            -res,
        ),
        rows: row1 - row0,
        cols: col1 - col0,
    })
}

/// Resample `source` onto the basin window of the suggested grid.
///
/// `forward` maps source to target coordinates and `inverse` the reverse.
pub fn warp_to_basin(
    source: &Raster,
    year: i32,
    basin: &BasinBoundary,
    forward: &dyn PointTransform,
    inverse: &dyn PointTransform,
) -> Result<Raster> {
    let grid = suggest_grid(source, forward)?;
    let window = clip_window(&grid, &basin.projected_bbox()?).ok_or(GeoError::NoOverlap(year))?;
    debug!(
        "{}: {}x{} cells of {:.1} m inside a {}x{} grid",
        year,
        window.cols,
        window.rows,
        window.resolution(),
        grid.cols,
        grid.rows
    );

    let mut data = Array2::from_elem((window.rows, window.cols), f32::NAN);
    for row in 0..window.rows {
        let y = window.transform.cell_center(row, 0).1;
        let spans = basin.interior_spans(y);
        if spans.is_empty() {
            continue;
        }
        let mut xs: Vec<f64> = (0..window.cols)
            .map(|col| window.transform.cell_center(row, col).0)
            .collect();
        let inside: Vec<bool> = xs
            .iter()
            .map(|x| spans.iter().any(|(a, b)| *a <= *x && *x <= *b))
            .collect();
        let mut ys = vec![y; window.cols];
        inverse.transform(&mut xs, &mut ys)?;

        for col in 0..window.cols {
            if !inside[col] {
                continue;
            }
            let (fx, fy) = source.transform.to_pixel(xs[col], ys[col]);
            if !(fx.is_finite() && fy.is_finite()) || fx < 0.0 || fy < 0.0 {
                continue;
            }
            let (sc, sr) = (fx.floor() as usize, fy.floor() as usize);
            if sr < source.rows() && sc < source.cols() {
                data[[row, col]] = source.data[[sr, sc]];
            }
        }
    }

    let clipped = Raster::new(data, window.transform, basin.target_wkt().to_string());
    if clipped.valid_count() == 0 {
        return Err(GeoError::EmptyClip(year));
    }
    Ok(clipped)
}

/// Reproject `source` from its own CRS into the basin's target CRS and clip.
pub fn reproject_clip(source: &Raster, year: i32, basin: &BasinBoundary) -> Result<Raster> {
    let source_srs = spatial_ref_from_wkt(&source.crs_wkt)?;
    let target_srs = spatial_ref_from_epsg(basin.target_epsg())?;
    let forward = GdalTransform::new(&source_srs, &target_srs)?;
    let inverse = GdalTransform::new(&target_srs, &source_srs)?;
    warp_to_basin(source, year, basin, &forward, &inverse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, MultiPolygon, Polygon};

    /// `(x, y) -> (2x + 100, 2y)`
    struct Scale2;
    /// Inverse of [`Scale2`].
    struct Halve;

    impl PointTransform for Scale2 {
        fn transform(&self, xs: &mut [f64], ys: &mut [f64]) -> Result<()> {
            xs.iter_mut().for_each(|x| *x = *x * 2.0 + 100.0);
            ys.iter_mut().for_each(|y| *y *= 2.0);
            Ok(())
        }
    }

    impl PointTransform for Halve {
        fn transform(&self, xs: &mut [f64], ys: &mut [f64]) -> Result<()> {
            xs.iter_mut().for_each(|x| *x = (*x - 100.0) / 2.0);
            ys.iter_mut().for_each(|y| *y /= 2.0);
            Ok(())
        }
    }

    fn source() -> Raster {
        // 6 x 8 cells so the pixel diagonal is exactly 10.
        let values: Vec<f32> = (0..48).map(|v| v as f32).collect();
        Raster::new(
            Array2::from_shape_vec((6, 8), values).unwrap(),
            GeoTransform::new(0.0, 6.0, 1.0, -1.0),
            String::new(),
        )
    }

    fn basin(ring: Vec<(f64, f64)>) -> BasinBoundary {
        let multi = MultiPolygon(vec![Polygon::new(LineString::from(ring), vec![])]);
        BasinBoundary::from_parts(
            multi.clone(),
            BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            multi,
            5070,
            "target".to_string(),
        )
    }

    #[test]
    fn test_suggested_grid_uses_diagonal_rule() {
        let grid = suggest_grid(&source(), &Scale2).unwrap();
        assert_eq!(grid.resolution(), 2.0);
        assert_eq!((grid.rows, grid.cols), (6, 8));
        assert_eq!(grid.transform.origin_x, 100.0);
        assert_eq!(grid.transform.origin_y, 12.0);
    }

    #[test]
    fn test_clip_window_snaps_outward() {
        let grid = suggest_grid(&source(), &Scale2).unwrap();
        let window = clip_window(&grid, &BoundingBox::new(104.5, 4.0, 109.0, 11.0)).unwrap();
        assert_eq!((window.rows, window.cols), (4, 3));
        assert_eq!(window.transform.origin_x, 104.0);
        assert_eq!(window.transform.origin_y, 12.0);
        assert!(clip_window(&grid, &BoundingBox::new(500.0, 500.0, 600.0, 600.0)).is_none());
    }

    #[test]
    fn test_warp_samples_nearest_and_masks_outside() {
        let triangle = basin(vec![(104.0, 4.0), (110.0, 4.0), (104.0, 12.0), (104.0, 4.0)]);
        let clipped = warp_to_basin(&source(), 2016, &triangle, &Scale2, &Halve).unwrap();
        assert_eq!(clipped.data.dim(), (4, 3));
        assert_eq!(clipped.crs_wkt, "target");
        // Top-right of the window lies outside the triangle.
        assert!(clipped.data[[0, 0]].is_nan());
        assert!(clipped.data[[0, 2]].is_nan());
        // Bottom row of the window samples source row 3, columns 2..5.
        assert_eq!(clipped.data[[3, 0]], 26.0);
        assert_eq!(clipped.data[[3, 2]], 28.0);
    }

    #[test]
    fn test_full_square_keeps_every_cell() {
        let square = basin(vec![(104.0, 4.0), (110.0, 4.0), (110.0, 12.0), (104.0, 12.0), (104.0, 4.0)]);
        let clipped = warp_to_basin(&source(), 2016, &square, &Scale2, &Halve).unwrap();
        assert_eq!(clipped.valid_count(), 12);
        assert_eq!(clipped.data[[0, 0]], 2.0);
    }

    #[test]
    fn test_disjoint_basin_is_no_overlap() {
        let far = basin(vec![(500.0, 500.0), (510.0, 500.0), (510.0, 510.0), (500.0, 500.0)]);
        assert!(matches!(
            warp_to_basin(&source(), 2014, &far, &Scale2, &Halve),
            Err(GeoError::NoOverlap(2014))
        ));
    }

    #[test]
    fn test_all_nan_source_is_empty_clip() {
        let mut empty = source();
        empty.data.fill(f32::NAN);
        let square = basin(vec![(104.0, 4.0), (110.0, 4.0), (110.0, 12.0), (104.0, 12.0), (104.0, 4.0)]);
        assert!(matches!(
            warp_to_basin(&empty, 2015, &square, &Scale2, &Halve),
            Err(GeoError::EmptyClip(2015))
        ));
    }
}
