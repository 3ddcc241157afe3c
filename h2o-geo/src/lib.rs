//! Geospatial side of the water-balance pipeline: the basin polygon, decoded
//! ET rasters, their reprojection onto the basin grid and the NetCDF files
//! exchanged between stages.

pub mod basin;
pub mod error;
pub mod granule_io;
pub mod netcdf_io;
pub mod raster;
pub mod transform;
pub mod warp;
