/// Error types for the core library
use thiserror::Error;

/// Main error type for configuration, naming and alignment failures
#[derive(Error, Debug)]
pub enum CoreError {
    /// A granule file name does not follow the product naming convention
    #[error("Failed to parse granule name {name}: {reason}")]
    GranuleName { name: String, reason: String },

    /// The granule directory holds nothing to aggregate
    #[error("No granules found in {0}")]
    NoGranules(String),

    /// Two granules resolve to the same acquisition year
    #[error("Duplicate granules for year {year}: {first} and {second}")]
    DuplicateYear {
        year: i32,
        first: String,
        second: String,
    },

    /// CF time units attribute could not be interpreted
    #[error("Invalid CF time units: {0}")]
    TimeUnits(String),

    /// Configuration values are inconsistent
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Configuration file is not valid TOML for the expected schema
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A numeric input is outside its physical range
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Filesystem access failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A flux series does not cover exactly the analysis years
    #[error(
        "{series} series is not aligned with the analysis years (missing: {missing:?}, extra: {extra:?})"
    )]
    Alignment {
        series: String,
        missing: Vec<i32>,
        extra: Vec<i32>,
    },
}

/// Type alias for Results using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;
