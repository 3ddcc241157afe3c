//! Basin boundary: the drainage polygon in its native CRS and in the
//! equal-area target CRS.

use crate::error::{GeoError, Result};
use crate::transform::{spatial_ref_from_epsg, GdalTransform, PointTransform};
use gdal::spatial_ref::AxisMappingStrategy;
use gdal::vector::LayerAccess;
use gdal::Dataset;
use geo::{Area, BooleanOps, Coord, Geometry, LineString, MultiPolygon, Polygon};
use h2o_core::bbox::BoundingBox;
use log::{debug, info};
use std::path::Path;

const WGS84_EPSG: u32 = 4326;

#[derive(Debug, Clone)]
pub struct BasinBoundary {
    native: MultiPolygon<f64>,
    geographic_bbox: BoundingBox,
    projected: MultiPolygon<f64>,
    target_epsg: u32,
    target_wkt: String,
}

impl BasinBoundary {
    /// Read every polygon of the first layer of `path` and project the
    /// merged geometry to `target_epsg`.
    pub fn load(path: &Path, target_epsg: u32) -> Result<Self> {
        let dataset = Dataset::open(path)?;
        let mut layer = dataset.layer(0)?;
        let mut native_srs = layer.spatial_ref().ok_or_else(|| {
            GeoError::Crs(format!("{} does not declare a CRS", path.display()))
        })?;
        native_srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);

        let mut polygons: Vec<Polygon<f64>> = Vec::new();
        for feature in layer.features() {
            let Some(geometry) = feature.geometry() else {
                continue;
            };
            match geometry.to_geo()? {
                Geometry::Polygon(polygon) => polygons.push(polygon),
                Geometry::MultiPolygon(multi) => polygons.extend(multi.0),
                _ => debug!("Ignoring non-polygon feature in {}", path.display()),
            }
        }
        if polygons.is_empty() {
            return Err(GeoError::EmptyBasin(path.display().to_string()));
        }
        let native = merge_polygons(polygons);

        let geographic_bbox = if native_srs.is_geographic() {
            multipolygon_bbox(&native)
        } else {
            let wgs84 = spatial_ref_from_epsg(WGS84_EPSG)?;
            let to_geographic = GdalTransform::new(&native_srs, &wgs84)?;
            multipolygon_bbox(&project_multipolygon(&native, &to_geographic)?)
        }
        .ok_or_else(|| GeoError::EmptyBasin(path.display().to_string()))?;

        let target_srs = spatial_ref_from_epsg(target_epsg)?;
        let to_target = GdalTransform::new(&native_srs, &target_srs)?;
        let projected = project_multipolygon(&native, &to_target)?;

        let basin = Self {
            native,
            geographic_bbox,
            projected,
            target_epsg,
            target_wkt: target_srs.to_wkt()?,
        };
        info!(
            "Basin {}: {} polygon(s), area {:.1} km² in EPSG:{}",
            path.display(),
            basin.native.0.len(),
            basin.area_m2() / 1.0e6,
            target_epsg
        );
        Ok(basin)
    }

    /// Assemble a basin from already projected parts.
    pub fn from_parts(
        native: MultiPolygon<f64>,
        geographic_bbox: BoundingBox,
        projected: MultiPolygon<f64>,
        target_epsg: u32,
        target_wkt: String,
    ) -> Self {
        Self {
            native,
            geographic_bbox,
            projected,
            target_epsg,
            target_wkt,
        }
    }

    pub fn native(&self) -> &MultiPolygon<f64> {
        &self.native
    }

    /// Lon/lat bounds, as used for catalog searches.
    pub fn geographic_bbox(&self) -> BoundingBox {
        self.geographic_bbox
    }

    pub fn projected(&self) -> &MultiPolygon<f64> {
        &self.projected
    }

    pub fn projected_bbox(&self) -> Result<BoundingBox> {
        multipolygon_bbox(&self.projected)
            .ok_or_else(|| GeoError::InvalidData("projected basin has no finite vertices".to_string()))
    }

    pub fn target_epsg(&self) -> u32 {
        self.target_epsg
    }

    pub fn target_wkt(&self) -> &str {
        &self.target_wkt
    }

    /// Planar area of the projected polygon in m².
    pub fn area_m2(&self) -> f64 {
        self.projected.unsigned_area()
    }

    /// Intervals of x inside the projected basin along the line at `y`.
    pub fn interior_spans(&self, y: f64) -> Vec<(f64, f64)> {
        scanline_spans(&self.projected, y)
    }
}

fn multipolygon_bbox(multi: &MultiPolygon<f64>) -> Option<BoundingBox> {
    BoundingBox::from_points(
        multi
            .0
            .iter()
            .flat_map(|p| p.exterior().coords())
            .map(|c| (c.x, c.y)),
    )
}

fn project_ring(ring: &LineString<f64>, transform: &dyn PointTransform) -> Result<LineString<f64>> {
    let mut xs: Vec<f64> = ring.coords().map(|c| c.x).collect();
    let mut ys: Vec<f64> = ring.coords().map(|c| c.y).collect();
    transform.transform(&mut xs, &mut ys)?;
    Ok(LineString(
        xs.into_iter()
            .zip(ys)
            .map(|(x, y)| Coord { x, y })
            .collect(),
    ))
}

/// Transform every ring of `multi`.
pub fn project_multipolygon(
    multi: &MultiPolygon<f64>,
    transform: &dyn PointTransform,
) -> Result<MultiPolygon<f64>> {
    let mut polygons = Vec::with_capacity(multi.0.len());
    for polygon in &multi.0 {
        let exterior = project_ring(polygon.exterior(), transform)?;
        let interiors = polygon
            .interiors()
            .iter()
            .map(|ring| project_ring(ring, transform))
            .collect::<Result<Vec<_>>>()?;
        polygons.push(Polygon::new(exterior, interiors));
    }
    Ok(MultiPolygon(polygons))
}

/// Union of all features, so overlapping parts count once in the area and
/// stay inside the even-odd mask.
pub fn merge_polygons(polygons: Vec<Polygon<f64>>) -> MultiPolygon<f64> {
    if polygons.len() < 2 {
        return MultiPolygon(polygons);
    }
    polygons
        .into_iter()
        .fold(MultiPolygon(Vec::new()), |merged, polygon| {
            merged.union(&MultiPolygon(vec![polygon]))
        })
}

/// Even-odd crossings of the horizontal line at `y` with all rings, paired
/// into inside intervals sorted by x.
pub fn scanline_spans(multi: &MultiPolygon<f64>, y: f64) -> Vec<(f64, f64)> {
    let mut crossings: Vec<f64> = Vec::new();
    for polygon in &multi.0 {
        for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
            for line in ring.lines() {
                let (a, b) = (line.start, line.end);
                if (a.y > y) != (b.y > y) {
                    crossings.push(a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y));
                }
            }
        }
    }
    crossings.sort_by(|a, b| a.total_cmp(b));
    crossings
        .chunks_exact(2)
        .map(|pair| (pair[0], pair[1]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use std::fs;
    use tempfile::tempdir;

    fn square_basin() -> BasinBoundary {
        let square = polygon![
            (x: 0.0, y: 0.0),
            (x: 10_000.0, y: 0.0),
            (x: 10_000.0, y: 10_000.0),
            (x: 0.0, y: 10_000.0),
            (x: 0.0, y: 0.0),
        ];
        let multi = MultiPolygon(vec![square]);
        BasinBoundary::from_parts(
            multi.clone(),
            BoundingBox::new(-110.0, 45.0, -109.9, 45.1),
            multi,
            5070,
            String::new(),
        )
    }

    #[test]
    fn test_square_area() {
        let basin = square_basin();
        assert!((basin.area_m2() - 1.0e8).abs() < 1e-6);
        assert_eq!(
            basin.projected_bbox().unwrap(),
            BoundingBox::new(0.0, 0.0, 10_000.0, 10_000.0)
        );
    }

    #[test]
    fn test_spans_respect_holes() {
        let with_hole = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)]),
            vec![LineString::from(vec![
                (4.0, 4.0),
                (6.0, 4.0),
                (6.0, 6.0),
                (4.0, 6.0),
                (4.0, 4.0),
            ])],
        );
        let multi = MultiPolygon(vec![with_hole]);
        assert_eq!(scanline_spans(&multi, 5.0), vec![(0.0, 4.0), (6.0, 10.0)]);
        assert_eq!(scanline_spans(&multi, 1.0), vec![(0.0, 10.0)]);
        assert!(scanline_spans(&multi, 11.0).is_empty());
        assert!((multi.unsigned_area() - 96.0).abs() < 1e-12);
    }

    #[test]
    fn test_overlapping_features_are_merged() {
        let left = polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ];
        let right = polygon![
            (x: 5.0, y: 0.0),
            (x: 15.0, y: 0.0),
            (x: 15.0, y: 10.0),
            (x: 5.0, y: 10.0),
            (x: 5.0, y: 0.0),
        ];
        let merged = merge_polygons(vec![left, right]);
        assert!((merged.unsigned_area() - 150.0).abs() < 1e-9);
        let spans = scanline_spans(&merged, 5.0);
        assert_eq!(spans.len(), 1);
        assert!((spans[0].0 - 0.0).abs() < 1e-9 && (spans[0].1 - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_load_geojson_projects_to_albers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("basin.geojson");
        fs::write(
            &path,
            r#"{
              "type": "FeatureCollection",
              "features": [
                { "type": "Feature", "properties": {},
                  "geometry": { "type": "Polygon", "coordinates": [[
                    [-110.0, 45.0], [-109.0, 45.0], [-109.0, 46.0], [-110.0, 46.0], [-110.0, 45.0]
                  ]] } }
              ]
            }"#,
        )
        .unwrap();

        let basin = BasinBoundary::load(&path, 5070).unwrap();
        let area = basin.area_m2();
        assert!(area.is_finite() && area > 0.0);
        // Planar area of the four projected corners in CONUS Albers.
        assert!((area - 8.686_334_654e9).abs() < 1.0e6, "area = {}", area);
        assert_eq!(basin.geographic_bbox(), BoundingBox::new(-110.0, 45.0, -109.0, 46.0));

        let again = BasinBoundary::load(&path, 5070).unwrap();
        assert_eq!(again.area_m2(), area);
    }

    #[test]
    fn test_load_without_polygons_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("points.geojson");
        fs::write(
            &path,
            r#"{ "type": "FeatureCollection", "features": [
                { "type": "Feature", "properties": {},
                  "geometry": { "type": "Point", "coordinates": [-110.0, 45.0] } } ] }"#,
        )
        .unwrap();
        assert!(matches!(
            BasinBoundary::load(&path, 5070),
            Err(GeoError::EmptyBasin(_))
        ));
    }
}
