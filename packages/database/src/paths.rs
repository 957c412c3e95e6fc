#![allow(clippy::module_name_repetitions)]
//! Canonical file paths for the data directory.
//!
//! All paths are relative to the data directory, which defaults to the
//! project root's `data/` and can be moved with `RISK_MAP_DATA_DIR`.

use std::path::{Path, PathBuf};

/// Returns the workspace root directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`.
///
/// # Panics
///
/// Panics if the project root cannot be resolved.
#[must_use]
pub fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .expect("Failed to find project root from CARGO_MANIFEST_DIR")
        .to_path_buf()
}

/// Returns the data directory (`RISK_MAP_DATA_DIR`, else `<root>/data`).
#[must_use]
pub fn data_dir() -> PathBuf {
    std::env::var_os("RISK_MAP_DATA_DIR")
        .filter(|v| !v.is_empty())
        .map_or_else(|| project_root().join("data"), PathBuf::from)
}

/// Returns the `shared/` directory for shared databases.
#[must_use]
pub fn shared_dir() -> PathBuf {
    data_dir().join("shared")
}

/// Returns the path for the event log `DuckDB` file.
#[must_use]
pub fn events_db_path() -> PathBuf {
    data_dir().join("events.duckdb")
}

/// Returns the path for the boundaries `DuckDB` file.
#[must_use]
pub fn boundaries_db_path() -> PathBuf {
    shared_dir().join("boundaries.duckdb")
}

/// Returns the root directory of the result cache.
#[must_use]
pub fn cache_dir() -> PathBuf {
    data_dir().join("cache")
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
