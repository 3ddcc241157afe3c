//! MODIS granule naming and local granule discovery.
//!
//! Annual MODIS products are distributed as HDF-EOS files named
//! `<SHORT_NAME>.A<YYYY>001.<hHHvVV>.<collection>.<production>.hdf`,
//! e.g. `MOD16A3GF.A2016001.h10v04.061.2021225162125.hdf`. The year in the
//! `A<YYYY><DDD>` token is the only key used to line granules up in time.

use crate::error::{CoreError, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File extension of raw granules.
pub const GRANULE_EXTENSION: &str = "hdf";

/// Day-of-year every annual composite starts on.
const ANNUAL_DAY_OF_YEAR: &str = "001";

/// The parsed fields of a granule file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GranuleName {
    pub short_name: String,
    pub year: i32,
    pub tile: String,
    pub collection: String,
    pub file_name: String,
}

impl GranuleName {
    pub fn parse(file_name: &str) -> Result<Self> {
        let fail = |reason: &str| CoreError::GranuleName {
            name: file_name.to_string(),
            reason: reason.to_string(),
        };
        let tokens: Vec<&str> = file_name.split('.').collect();
        if tokens.len() < 5 {
            return Err(fail("expected at least five dot-separated fields"));
        }
        let extension = tokens[tokens.len() - 1];
        if !extension.eq_ignore_ascii_case(GRANULE_EXTENSION) {
            return Err(fail("extension is not .hdf"));
        }
        let short_name = tokens[0];
        if short_name.is_empty() {
            return Err(fail("empty product short name"));
        }

        let acquisition = tokens[1];
        let digits = acquisition
            .strip_prefix('A')
            .ok_or_else(|| fail("acquisition field must start with 'A'"))?;
        if digits.len() != 7 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(fail("acquisition field must be A<YYYY><DDD>"));
        }
        let (year_str, day_str) = digits.split_at(4);
        if day_str != ANNUAL_DAY_OF_YEAR {
            return Err(fail("annual composites must start on day 001"));
        }
        let year = year_str
            .parse::<i32>()
            .map_err(|_| fail("acquisition year is not a number"))?;

        let tile = tokens[2];
        if !is_tile_id(tile) {
            return Err(fail("tile field must look like hHHvVV"));
        }

        Ok(GranuleName {
            short_name: short_name.to_string(),
            year,
            tile: tile.to_string(),
            collection: tokens[3].to_string(),
            file_name: file_name.to_string(),
        })
    }
}

impl FromStr for GranuleName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        GranuleName::parse(s)
    }
}

impl fmt::Display for GranuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.short_name, self.tile, self.year)
    }
}

fn is_tile_id(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 6
        && b[0] == b'h'
        && b[3] == b'v'
        && b[1].is_ascii_digit()
        && b[2].is_ascii_digit()
        && b[4].is_ascii_digit()
        && b[5].is_ascii_digit()
}

/// A granule returned by a catalog search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GranuleRecord {
    /// Provider identifier, e.g. `MOD16A3GF.A2016001.h10v04.061.2021225162125`
    pub native_id: String,
    /// HTTPS links to the data files of this granule
    pub data_urls: Vec<String>,
}

impl GranuleRecord {
    /// Whether the provider identifier names the given tile.
    pub fn is_tile(&self, tile: &str) -> bool {
        self.native_id.contains(tile)
    }
}

/// Keep only the records whose native id contains `tile`.
pub fn filter_by_tile(records: Vec<GranuleRecord>, tile: &str) -> Vec<GranuleRecord> {
    let before = records.len();
    let kept: Vec<GranuleRecord> = records.into_iter().filter(|r| r.is_tile(tile)).collect();
    info!("Tile filter {}: kept {} of {} granules", tile, kept.len(), before);
    kept
}

/// File name given to the single-band GeoTIFF derived from a granule.
pub fn processed_file_name(short_name: &str, year: i32, band: &str) -> String {
    format!("{}_{}_{}.tiff", short_name, year, band)
}

/// Scan `dir` for raw granules and key them by acquisition year.
///
/// Files are visited in lexicographic order. Every `.hdf` file must parse;
/// a malformed name is an error rather than something to skip. When `tile`
/// is given, granules of other tiles are ignored. Two granules with the same
/// year, or no granules at all, are errors.
pub fn scan_granule_dir(dir: &Path, tile: Option<&str>) -> Result<BTreeMap<i32, (GranuleName, PathBuf)>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(GRANULE_EXTENSION))
        })
        .collect();
    paths.sort();

    let mut granules: BTreeMap<i32, (GranuleName, PathBuf)> = BTreeMap::new();
    for path in paths {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CoreError::GranuleName {
                name: path.display().to_string(),
                reason: "file name is not valid UTF-8".to_string(),
            })?
            .to_string();
        let name = GranuleName::parse(&file_name)?;
        if let Some(tile) = tile {
            if name.tile != tile {
                debug!("Skipping {} (tile {} != {})", file_name, name.tile, tile);
                continue;
            }
        }
        if let Some((existing, _)) = granules.get(&name.year) {
            return Err(CoreError::DuplicateYear {
                year: name.year,
                first: existing.file_name.clone(),
                second: file_name,
            });
        }
        granules.insert(name.year, (name, path));
    }

    if granules.is_empty() {
        return Err(CoreError::NoGranules(dir.display().to_string()));
    }
    info!(
        "Found {} granules in {} covering {:?}",
        granules.len(),
        dir.display(),
        granules.keys().collect::<Vec<_>>()
    );
    Ok(granules)
}
