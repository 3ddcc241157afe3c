//! Pipeline configuration.
//!
//! Every field is optional in the TOML file; missing values fall back to the
//! constants in [`crate::defaults`]. Relative paths resolve against `root`.
//!
//! ```toml
//! root = "/data/yellowstone"
//!
//! [analysis]
//! start = "2014-01-01"
//! end = "2023-12-31"
//!
//! [et]
//! tile = "h10v04"
//! apply_tile_filter = true
//! ```

use crate::date_range::AnalysisWindow;
use crate::defaults;
use crate::error::{CoreError, Result};
use chrono::NaiveDate;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DATE_FORMAT: &str = "%Y-%m-%d";

fn default_date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap_or_default()
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub root: PathBuf,
    pub basin: BasinConfig,
    pub analysis: AnalysisConfig,
    pub et: EtConfig,
    pub balance: BalanceConfig,
    pub earthdata: EarthdataConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasinConfig {
    /// Vector file holding the basin polygon(s)
    pub path: PathBuf,
    /// Equal-area CRS for the area and the reprojection target
    pub target_epsg: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtConfig {
    pub short_name: String,
    pub tile: String,
    pub apply_tile_filter: bool,
    pub granule_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub grid_name: String,
    pub band_name: String,
    pub output_file: PathBuf,
    pub variable: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    pub hydrometric_file: PathBuf,
    pub discharge_variable: String,
    pub precip_file: PathBuf,
    pub precip_variable: String,
    pub precip_spatial_dims: Vec<String>,
    pub et_spatial_dims: Vec<String>,
    pub plot_dir: PathBuf,
    pub table_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EarthdataConfig {
    pub search_url: String,
    pub token_url: String,
    pub page_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(defaults::ROOT),
            basin: BasinConfig::default(),
            analysis: AnalysisConfig::default(),
            et: EtConfig::default(),
            balance: BalanceConfig::default(),
            earthdata: EarthdataConfig::default(),
        }
    }
}

impl Default for BasinConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(defaults::BASIN_FILE),
            target_epsg: defaults::TARGET_EPSG,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            start: default_date(defaults::START_DATE),
            end: default_date(defaults::END_DATE),
        }
    }
}

impl Default for EtConfig {
    fn default() -> Self {
        Self {
            short_name: defaults::PRODUCT_SHORT_NAME.to_string(),
            tile: defaults::TILE_ID.to_string(),
            apply_tile_filter: defaults::APPLY_TILE_FILTER,
            granule_dir: PathBuf::from(defaults::GRANULE_DIR),
            processed_dir: PathBuf::from(defaults::PROCESSED_DIR),
            grid_name: defaults::GRID_NAME.to_string(),
            band_name: defaults::BAND_NAME.to_string(),
            output_file: PathBuf::from(defaults::ET_OUTPUT_FILE),
            variable: defaults::ET_VARIABLE.to_string(),
        }
    }
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            hydrometric_file: PathBuf::from(defaults::HYDROMETRIC_FILE),
            discharge_variable: defaults::DISCHARGE_VARIABLE.to_string(),
            precip_file: PathBuf::from(defaults::PRECIP_FILE),
            precip_variable: defaults::PRECIP_VARIABLE.to_string(),
            precip_spatial_dims: strings(&defaults::PRECIP_SPATIAL_DIMS),
            et_spatial_dims: strings(&defaults::ET_SPATIAL_DIMS),
            plot_dir: PathBuf::from(defaults::PLOT_DIR),
            table_file: PathBuf::from(defaults::BALANCE_TABLE),
        }
    }
}

impl Default for EarthdataConfig {
    fn default() -> Self {
        Self {
            search_url: defaults::CMR_GRANULE_SEARCH_URL.to_string(),
            token_url: defaults::EARTHDATA_TOKEN_URL.to_string(),
            page_size: defaults::CMR_PAGE_SIZE,
        }
    }
}

impl PipelineConfig {
    /// Load from `path`, or use the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                let text = std::fs::read_to_string(path)?;
                Self::from_toml_str(&text)?
            }
            None => {
                info!("No configuration file given, using defaults");
                Self::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.analysis.start > self.analysis.end {
            return Err(CoreError::Config(format!(
                "analysis start {} is after end {}",
                self.analysis.start, self.analysis.end
            )));
        }
        let names = [
            ("et.short_name", &self.et.short_name),
            ("et.tile", &self.et.tile),
            ("et.grid_name", &self.et.grid_name),
            ("et.band_name", &self.et.band_name),
            ("et.variable", &self.et.variable),
            ("balance.discharge_variable", &self.balance.discharge_variable),
            ("balance.precip_variable", &self.balance.precip_variable),
        ];
        for (key, value) in names {
            if value.trim().is_empty() {
                return Err(CoreError::Config(format!("{} must not be empty", key)));
            }
        }
        for (key, dims) in [
            ("balance.precip_spatial_dims", &self.balance.precip_spatial_dims),
            ("balance.et_spatial_dims", &self.balance.et_spatial_dims),
        ] {
            if dims.is_empty() || dims.iter().any(|d| d.trim().is_empty()) {
                return Err(CoreError::Config(format!(
                    "{} must list non-empty dimension names",
                    key
                )));
            }
        }
        if self.earthdata.page_size == 0 {
            return Err(CoreError::Config("earthdata.page_size must be positive".to_string()));
        }
        Ok(())
    }

    /// Resolve `path` against `root` unless it is already absolute.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn window(&self) -> AnalysisWindow {
        AnalysisWindow::new(self.analysis.start, self.analysis.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_study() {
        let config = PipelineConfig::default();
        assert_eq!(config.analysis.start, NaiveDate::from_ymd_opt(2014, 1, 1).unwrap());
        assert_eq!(config.analysis.end, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
        assert_eq!(config.et.short_name, "MOD16A3GF");
        assert_eq!(config.basin.target_epsg, 5070);
        assert!(config.et.apply_tile_filter);
        assert_eq!(config.window().years().len(), 10);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            root = "/tmp/basin"

            [analysis]
            start = "2016-01-01"

            [et]
            apply_tile_filter = false
            "#,
        )
        .unwrap();
        assert_eq!(config.root, PathBuf::from("/tmp/basin"));
        assert_eq!(config.analysis.start, NaiveDate::from_ymd_opt(2016, 1, 1).unwrap());
        assert_eq!(config.analysis.end, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
        assert!(!config.et.apply_tile_filter);
        assert_eq!(config.et.tile, "h10v04");
        assert_eq!(
            config.resolve(&config.et.granule_dir),
            PathBuf::from("/tmp/basin/data/MOD16A3")
        );
        assert_eq!(config.resolve(Path::new("/abs/x.nc")), PathBuf::from("/abs/x.nc"));
    }

    #[test]
    fn test_reversed_window_rejected() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [analysis]
            start = "2020-01-01"
            end = "2019-12-31"
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_empty_variable_rejected() {
        let mut config = PipelineConfig::default();
        config.balance.precip_variable = " ".to_string();
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        let err = PipelineConfig::from_toml_str("[analysis]\nstart = 12").unwrap_err();
        assert!(matches!(err, CoreError::ConfigParse(_)));
    }
}
