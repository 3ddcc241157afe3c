//! h2o CLI - basin water balance from MODIS ET, precipitation and gauge runoff.

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "h2o-cli",
    version,
    about = "Basin water-balance toolkit"
)]
struct Cli {
    #[command(subcommand)]
    command: h2o_cmd::Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    h2o_cmd::run(cli.command).await
}
