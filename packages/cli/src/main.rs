#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the risk map toolchain.
//!
//! Loads GTD exports into the event log, imports zone polygons, computes
//! one-off risk surfaces, and starts the API server.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use risk_map_server_models::PredictQueryParams;

mod commands;

/// Boxed error shared by all subcommands.
type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Risk map toolchain.
#[derive(Parser)]
#[command(name = "risk_map_cli")]
#[command(about = "Build and serve spatio-temporal risk surfaces")]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Replace the event log with a GTD CSV export.
    Ingest {
        /// Path to the GTD CSV file.
        #[arg(long)]
        csv: PathBuf,
    },

    /// Import zone polygons from a `GeoJSON` `FeatureCollection`.
    ImportZones {
        /// Path to the `GeoJSON` file.
        #[arg(long)]
        file: PathBuf,

        /// Feature property holding the zone name.
        #[arg(long, default_value = "name")]
        name_key: String,
    },

    /// Compute a risk surface and print it as `GeoJSON`.
    Predict {
        /// Forecast horizon label, in days.
        #[arg(long)]
        horizon_days: Option<u32>,

        /// Bounding box as `west,south,east,north`.
        #[arg(long, allow_hyphen_values = true)]
        bbox: Option<String>,

        /// Aggregation: `cell` or `country`.
        #[arg(long)]
        agg: Option<String>,

        /// Grid cell size in degrees.
        #[arg(long)]
        cell_size_deg: Option<f64>,

        /// Event lookback window, in days.
        #[arg(long)]
        lookback_days: Option<u32>,
    },

    /// Start the API server.
    Serve,
}

fn main() -> Result<(), BoxError> {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest { csv } => commands::ingest(&csv)?,
        Commands::ImportZones { file, name_key } => commands::import_zones(&file, &name_key)?,
        Commands::Predict {
            horizon_days,
            bbox,
            agg,
            cell_size_deg,
            lookback_days,
        } => commands::predict(&PredictQueryParams {
            horizon_days,
            bbox,
            agg,
            cell_size_deg,
            lookback_days,
        })?,
        Commands::Serve => {
            actix_web::rt::System::new().block_on(risk_map_server::run_server())?;
        }
    }

    Ok(())
}
