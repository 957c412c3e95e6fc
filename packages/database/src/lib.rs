#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! `DuckDB` storage for the risk map.
//!
//! The event log lives in `data/events.duckdb` (see [`event_db`]) and the
//! zone polygons used for zonal aggregation in
//! `data/shared/boundaries.duckdb` (see [`boundaries_db`]). [`etl`] loads a
//! Global Terrorism Database CSV export into the event log.

pub mod boundaries_db;
pub mod etl;
pub mod event_db;
pub mod paths;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}
