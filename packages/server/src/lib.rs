#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the risk map.
//!
//! Serves risk surfaces computed by [`risk_map_risk::RiskService`] as
//! `GeoJSON`, plus the raw event points and model metadata for the map
//! frontend. The event log is read from `data/events.duckdb`, zone
//! polygons from `data/shared/boundaries.duckdb`, and computed surfaces are
//! cached under `data/cache/`.

mod handlers;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use risk_map_cache::FileCache;
use risk_map_database::paths;
use risk_map_risk::store::{DuckDbBoundaries, DuckDbEventStore};
use risk_map_risk::{RiskConfig, RiskError, RiskService};

/// Errors that prevent the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Bind or runtime failure.
    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Risk(#[from] RiskError),

    /// The event log could not be opened.
    #[error(transparent)]
    Database(#[from] risk_map_database::DbError),
}

/// Shared application state.
pub struct AppState {
    /// The risk engine.
    pub risk: Arc<RiskService>,
    /// Event log, also read directly by `/api/events`.
    pub events: Arc<DuckDbEventStore>,
}

impl AppState {
    /// Opens the event log, boundaries and result cache under the data
    /// directory and wires them into a [`RiskService`].
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] if the event log cannot be opened or the
    /// config is invalid.
    pub fn open(config: RiskConfig) -> Result<Self, ServerError> {
        let events_path = paths::events_db_path();
        log::info!("Opening event log at {}", events_path.display());
        let events = Arc::new(DuckDbEventStore::open(&events_path)?);

        let cache_root = paths::cache_dir();
        let cache = Arc::new(FileCache::new(&cache_root, &config.cache_namespace));
        log::info!("Caching results in {}", cache.dir().display());

        let boundaries = Arc::new(DuckDbBoundaries::new(paths::boundaries_db_path()));

        let risk = RiskService::new(config, events.clone(), cache)?.with_boundaries(boundaries);

        Ok(Self {
            risk: Arc::new(risk),
            events,
        })
    }
}

/// Registers the `/api` routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/meta", web::get().to(handlers::meta))
            .route("/predict", web::get().to(handlers::predict))
            .route("/events", web::get().to(handlers::events)),
    );
}

/// Starts the risk map API server.
///
/// Loads the config named by `RISK_MAP_CONFIG` (or the defaults), opens
/// the stores, and starts the Actix-Web HTTP server on `BIND_ADDR:PORT`.
/// This is a regular async function; the caller provides the runtime.
///
/// # Errors
///
/// Returns [`ServerError`] if the config or stores cannot be loaded, or if
/// the HTTP server fails to bind or encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> Result<(), ServerError> {
    let config = RiskConfig::from_env()?;
    let state = web::Data::new(AppState::open(config)?);

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await?;

    Ok(())
}
