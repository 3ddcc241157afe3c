pub mod bbox;
pub mod cf_time;
pub mod config;
pub mod date_range;
pub mod defaults;
#[cfg(feature = "api")]
pub mod earthdata;
pub mod error;
pub mod granule;
pub mod year_series;
