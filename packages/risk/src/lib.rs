#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Spatio-temporal risk engine.
//!
//! Turns a log of historical violent events into a normalized risk surface
//! over a regular lon/lat grid. Every event contributes to every cell
//! through an exponential decay kernel:
//!
//! ```text
//! sqrt(1 + fatalities) * exp(-age_days / timescale) * exp(-distance_km / lengthscale)
//! ```
//!
//! Raw cell scores are divided by the largest one so the hottest cell is
//! exactly `1.0`. Optionally the cells are averaged per zone (country).
//! [`service::RiskService`] ties the pieces together with the event store,
//! the boundary source and the result cache.

pub mod aggregate;
pub mod config;
pub mod decay;
pub mod geometry;
pub mod grid;
pub mod service;
pub mod store;
pub mod zonal;

pub use config::RiskConfig;
pub use service::RiskService;

/// Errors that fail a prediction request or engine setup.
#[derive(Debug, thiserror::Error)]
pub enum RiskError {
    /// Cell size was zero, negative, or not finite.
    #[error("Cell size must be a positive number of degrees, got {0}")]
    InvalidCellSize(f64),

    /// The requested grid exceeds the configured ceiling.
    #[error("Grid of {cells} cells exceeds the limit of {max}; use a larger cell size or a smaller bbox")]
    GridTooLarge {
        /// Cells the request would need.
        cells: usize,
        /// Configured ceiling.
        max: usize,
    },

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration file could not be read.
    #[error("Config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// The configuration file is not valid TOML for [`RiskConfig`].
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}
