use h2o_core::error::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeoError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// A CRS could not be built or has no usable definition
    #[error("CRS error: {0}")]
    Crs(String),

    #[error("Basin file {0} holds no polygons")]
    EmptyBasin(String),

    /// The raster footprint and the basin do not overlap
    #[error("Raster for {0} does not overlap the basin")]
    NoOverlap(i32),

    #[error("Clipping the {0} raster to the basin left no valid cells")]
    EmptyClip(i32),

    #[error("Raster grid for {year} differs from the first year's grid")]
    GridMismatch { year: i32 },

    #[error("Variable {variable} has dimensions {found:?}, expected {expected:?}")]
    Dimension {
        variable: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Missing variable: {0}")]
    MissingVariable(String),

    #[error("Missing {item} in {path}")]
    MissingMetadata { item: String, path: String },

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, GeoError>;
