//! ET aggregation command: granules in, one clipped NetCDF stack out.

use anyhow::Context;
use h2o_core::config::PipelineConfig;
use h2o_core::earthdata::{ArchiveError, EarthdataClient, GranuleQuery};
use h2o_core::granule::{filter_by_tile, scan_granule_dir, GranuleRecord};
use h2o_geo::basin::BasinBoundary;
use h2o_geo::granule_io::{convert_granule, index_processed, read_geotiff};
use h2o_geo::netcdf_io::write_et_stack;
use h2o_geo::raster::Raster;
use h2o_geo::warp::reproject_clip;
use log::{info, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub async fn run_et_aggregate(config_path: Option<&Path>, download: bool) -> anyhow::Result<()> {
    let config = PipelineConfig::load(config_path)?;
    let basin_path = config.resolve(&config.basin.path);
    let basin = BasinBoundary::load(&basin_path, config.basin.target_epsg)
        .with_context(|| format!("Failed to load basin {}", basin_path.display()))?;

    let granule_dir = config.resolve(&config.et.granule_dir);
    if download {
        fetch_granules(&config, &basin, &granule_dir).await?;
    }

    let output = aggregate_granules(&config, &basin, &granule_dir)?;
    info!("ET stack written to {}", output.display());
    Ok(())
}

/// Search CMR over the basin's geographic extent and download what matches.
async fn fetch_granules(
    config: &PipelineConfig,
    basin: &BasinBoundary,
    granule_dir: &Path,
) -> anyhow::Result<()> {
    let client = EarthdataClient::login(&config.earthdata).await?;
    let query = GranuleQuery {
        short_name: config.et.short_name.clone(),
        start: config.analysis.start,
        end: config.analysis.end,
        bbox: basin.geographic_bbox(),
    };
    let records = select_tile(client.search(&query).await?, config)?;

    std::fs::create_dir_all(granule_dir)
        .with_context(|| format!("Failed to create {}", granule_dir.display()))?;
    client.download(&records, granule_dir).await?;
    Ok(())
}

/// Apply the configured tile filter to search results. Nothing left after
/// filtering is an empty search.
fn select_tile(records: Vec<GranuleRecord>, config: &PipelineConfig) -> anyhow::Result<Vec<GranuleRecord>> {
    let records = if config.et.apply_tile_filter {
        filter_by_tile(records, &config.et.tile)
    } else {
        info!("Tile filter off: keeping all {} granules", records.len());
        records
    };
    if records.is_empty() {
        return Err(ArchiveError::EmptySearch {
            short_name: format!("{} tile {}", config.et.short_name, config.et.tile),
        }
        .into());
    }
    Ok(records)
}

/// Convert, reproject and clip every local granule, then write the stack.
pub fn aggregate_granules(
    config: &PipelineConfig,
    basin: &BasinBoundary,
    granule_dir: &Path,
) -> anyhow::Result<PathBuf> {
    let tile = config
        .et
        .apply_tile_filter
        .then_some(config.et.tile.as_str());
    let granules = scan_granule_dir(granule_dir, tile)
        .with_context(|| format!("Failed to scan {}", granule_dir.display()))?;

    let window = config.window();
    let years = window.years();
    for year in granules.keys().filter(|y| !years.contains(y)) {
        warn!("Granule year {} lies outside {}..{}", year, window.start, window.end);
    }

    let processed_dir = config.resolve(&config.et.processed_dir);
    std::fs::create_dir_all(&processed_dir)
        .with_context(|| format!("Failed to create {}", processed_dir.display()))?;

    let mut converted = Vec::with_capacity(granules.len());
    for (name, path) in granules.values() {
        let output = convert_granule(
            name,
            path,
            &config.et.grid_name,
            &config.et.band_name,
            &processed_dir,
        )
        .with_context(|| format!("Failed to convert {}", name))?;
        converted.push(output);
    }

    let stack = clip_processed(&converted, basin)?;
    let output = config.resolve(&config.et.output_file);
    write_et_stack(&output, &config.et.variable, &stack, config.basin.target_epsg)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(output)
}

/// Reproject each processed GeoTIFF to the basin grid, keyed by the year in
/// its metadata.
pub fn clip_processed(paths: &[PathBuf], basin: &BasinBoundary) -> anyhow::Result<BTreeMap<i32, Raster>> {
    let index = index_processed(paths)?;
    let mut stack = BTreeMap::new();
    for (year, path) in index {
        let (_, raster) = read_geotiff(&path)?;
        let clipped = reproject_clip(&raster, year, basin)
            .with_context(|| format!("Failed to clip {}", path.display()))?;
        info!(
            "{}: {}x{} basin cells, {} valid",
            year,
            clipped.cols(),
            clipped.rows(),
            clipped.valid_count()
        );
        stack.insert(year, clipped);
    }
    Ok(stack)
}
