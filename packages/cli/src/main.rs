#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `landwatch`: wildfire risk from satellite fire detections and gridded
//! weather.
//!
//! Logging goes through [`landwatch_cli_utils::init_logger`]; set
//! `RUST_LOG=info` to follow a run.

mod pipeline;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use landwatch_config::LandwatchConfig;

#[derive(Parser)]
#[command(name = "landwatch", about = "Wildfire risk pipeline", version)]
struct Cli {
    /// TOML file merged over the built-in defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print grid dimensions and the weather sampling stride
    Grid,
    /// Download FIRMS detections and write a fire snapshot
    FetchFirms,
    /// Download weather from the configured feed and write a weather snapshot
    FetchWeather,
    /// Score the latest snapshots and write `risk_latest.geojson`
    Score {
        /// Fire search radius in kilometres (overrides `risk.radius_km`)
        #[arg(long)]
        radius_km: Option<f64>,
    },
    /// Fetch both feeds, then score
    Run,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = landwatch_cli_utils::init_logger();
    let cli = Cli::parse();

    let mut config = LandwatchConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Grid => pipeline::describe_grid(&config)?,
        Commands::FetchFirms => {
            let path = pipeline::fetch_firms(&config).await?;
            println!("{}", path.display());
        }
        Commands::FetchWeather => {
            let path = pipeline::fetch_weather(&config, &multi).await?;
            println!("{}", path.display());
        }
        Commands::Score { radius_km } => {
            if let Some(radius_km) = radius_km {
                config.risk.radius_km = radius_km;
                config.validate()?;
            }
            let path = pipeline::score(&config)?;
            println!("{}", path.display());
        }
        Commands::Run => {
            let path = pipeline::run(&config, &multi).await?;
            println!("{}", path.display());
        }
    }

    Ok(())
}
