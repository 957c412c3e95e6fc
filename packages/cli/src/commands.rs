//! Subcommand implementations.

use std::path::Path;

use risk_map_database::{boundaries_db, etl, event_db};
use risk_map_risk::RiskConfig;
use risk_map_risk::store::import_zones_geojson;
use risk_map_server::AppState;
use risk_map_server_models::PredictQueryParams;

use crate::BoxError;

/// Loads a GTD CSV into the default event log.
pub fn ingest(csv: &Path) -> Result<(), BoxError> {
    let conn = event_db::open_default()?;
    let written = etl::load_gtd_csv(&conn, csv)?;
    let total = event_db::get_record_count(&conn)?;

    println!("Loaded {written} events ({total} in the event log)");
    Ok(())
}

/// Imports zones from a `GeoJSON` file into the default boundaries DB.
pub fn import_zones(file: &Path, name_key: &str) -> Result<(), BoxError> {
    log::info!("Importing zones from {}", file.display());
    let contents = std::fs::read_to_string(file)?;

    let conn = boundaries_db::open_default()?;
    let written = import_zones_geojson(&conn, &contents, name_key)?;
    let total = boundaries_db::get_zone_count(&conn)?;

    println!("Imported {written} zones ({total} stored)");
    Ok(())
}

/// Computes one surface against the default stores and prints it.
pub fn predict(params: &PredictQueryParams) -> Result<(), BoxError> {
    let config = RiskConfig::from_env()?;
    let request = params.resolve(&config.default_request());
    let state = AppState::open(config)?;

    let surface = state.risk.predict_risk(&request)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&surface.to_feature_collection())?
    );
    Ok(())
}
