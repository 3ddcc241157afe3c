//! Command implementations for the h2o CLI.
//!
//! `et-aggregate` builds the basin's annual ET stack from MODIS granules and
//! `water-balance` combines it with precipitation and gauge runoff.

use clap::Subcommand;
use std::path::PathBuf;

pub mod aggregate;
pub mod balance;
pub mod plot;

#[derive(Subcommand)]
pub enum Command {
    /// Clip and reproject annual MODIS ET granules into one NetCDF stack
    EtAggregate {
        /// TOML configuration file (defaults are used when omitted)
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,

        /// Search Earthdata and download granules before aggregating
        #[arg(long)]
        download: bool,
    },

    /// Compute annual storage change from precipitation, ET and runoff
    WaterBalance {
        /// TOML configuration file (defaults are used when omitted)
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,

        /// Skip writing the SVG plots
        #[arg(long)]
        no_plots: bool,
    },
}

pub async fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::EtAggregate { config, download } => {
            aggregate::run_et_aggregate(config.as_deref(), download).await
        }
        Command::WaterBalance { config, no_plots } => {
            balance::run_water_balance(config.as_deref(), no_plots)
        }
    }
}
