//! Default analysis parameters.
//!
//! These reproduce the Yellowstone River study: MOD16A3GF annual ET over
//! MODIS tile h10v04 for 2014 through 2023, HYSETS discharge and IMERG
//! precipitation, with all area-dependent work done in CONUS Albers
//! (EPSG:5070). Relative paths are resolved against the configured root.

/// Working directory that relative paths are resolved against.
pub const ROOT: &str = ".";

/// Basin boundary vector file (geographic CRS).
pub const BASIN_FILE: &str = "data/shp/YellowstoneRiver_drainage_WSG84.shp";

/// Equal-area CRS used for the basin area and as the reprojection target.
pub const TARGET_EPSG: u32 = 5070;

/// First day of the analysis window (inclusive).
pub const START_DATE: &str = "2014-01-01";

/// Last day of the analysis window (inclusive).
pub const END_DATE: &str = "2023-12-31";

/// CMR short name of the annual gap-filled MODIS ET product.
pub const PRODUCT_SHORT_NAME: &str = "MOD16A3GF";

/// MODIS sinusoidal tile covering the basin.
pub const TILE_ID: &str = "h10v04";

/// Whether search results and local granules are restricted to `TILE_ID`.
pub const APPLY_TILE_FILTER: bool = true;

/// Directory holding raw HDF granules.
pub const GRANULE_DIR: &str = "data/MOD16A3";

/// Directory receiving the per-year GeoTIFFs.
pub const PROCESSED_DIR: &str = "processed";

/// HDF-EOS grid holding the ET band.
pub const GRID_NAME: &str = "MOD_Grid_MOD16A3";

/// Physical band decoded from each granule.
pub const BAND_NAME: &str = "ET_500m";

/// Aggregated multi-year ET NetCDF.
pub const ET_OUTPUT_FILE: &str = "processed/MOD16_ET_monthly_2014-2023.nc";

/// Name of the ET field in the aggregated NetCDF.
pub const ET_VARIABLE: &str = "ET";

/// Spatial dimensions averaged out of the ET field.
pub const ET_SPATIAL_DIMS: [&str; 2] = ["x", "y"];

/// HYSETS watershed extract.
pub const HYDROMETRIC_FILE: &str = "data/HYSETS-2023_watershed_YellowstoneRiver.nc";

/// Discharge rate variable (m³ s⁻¹).
pub const DISCHARGE_VARIABLE: &str = "discharge";

/// Monthly precipitation NetCDF produced upstream.
pub const PRECIP_FILE: &str = "processed/IMERG-Final_precip_monthly_2014-2023.nc";

/// Monthly precipitation variable (mm month⁻¹).
pub const PRECIP_VARIABLE: &str = "precip_monthly";

/// Spatial dimensions averaged out of the precipitation field.
pub const PRECIP_SPATIAL_DIMS: [&str; 2] = ["lon", "lat"];

/// Directory receiving the diagnostic SVG plots.
pub const PLOT_DIR: &str = "processed";

/// Flat table of the aligned fluxes and storage change.
pub const BALANCE_TABLE: &str = "processed/water_balance.csv";

/// CMR granule search endpoint returning UMM JSON.
pub const CMR_GRANULE_SEARCH_URL: &str = "https://cmr.earthdata.nasa.gov/search/granules.umm_json";

/// Earthdata Login endpoint that exchanges credentials for a bearer token.
pub const EARTHDATA_TOKEN_URL: &str =
    "https://urs.earthdata.nasa.gov/api/users/find_or_create_token";

/// Granules requested per CMR page.
pub const CMR_PAGE_SIZE: usize = 2000;
