//! Shared boundary data storage in `DuckDB`.
//!
//! Stores named zone polygons (countries by default) with their `GeoJSON`
//! geometry as plain TEXT. The boundaries `DuckDB` lives at
//! `data/shared/boundaries.duckdb` and is read by the spatial index when a
//! request asks for zonal aggregation.

use std::path::Path;

use duckdb::Connection;

use crate::DbError;

/// Opens (or creates) the boundaries `DuckDB` and ensures schema exists.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open(path: &Path) -> Result<Connection, DbError> {
    if let Some(parent) = path.parent() {
        crate::paths::ensure_dir(parent)?;
    }

    let conn = Connection::open(path)?;

    conn.execute_batch("SET threads = 4; SET memory_limit = '512MB';")?;

    create_schema(&conn)?;

    Ok(conn)
}

/// Opens the boundaries DB at the default path.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open_default() -> Result<Connection, DbError> {
    open(&crate::paths::boundaries_db_path())
}

/// Opens a throwaway in-memory boundaries DB.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open_in_memory() -> Result<Connection, DbError> {
    let conn = Connection::open_in_memory()?;
    create_schema(&conn)?;
    Ok(conn)
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS zones (
            name TEXT PRIMARY KEY,
            boundary_geojson TEXT
        );",
    )?;

    Ok(())
}

/// Upserts `(name, boundary_geojson)` pairs into the `zones` table.
///
/// Returns the number of zones written.
///
/// # Errors
///
/// Returns [`DbError`] if any insert fails.
pub fn upsert_zones(conn: &Connection, zones: &[(String, String)]) -> Result<u64, DbError> {
    if zones.is_empty() {
        return Ok(0);
    }

    let mut stmt = conn.prepare(
        "INSERT INTO zones (name, boundary_geojson) VALUES (?, ?)
         ON CONFLICT (name) DO UPDATE SET boundary_geojson = EXCLUDED.boundary_geojson",
    )?;

    let mut written = 0u64;
    for (name, geojson) in zones {
        stmt.execute([name, geojson])?;
        written += 1;
    }

    log::info!("Upserted {written} zones");
    Ok(written)
}

/// Returns the number of stored zones.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn get_zone_count(conn: &Connection) -> Result<u64, DbError> {
    let count: i64 = conn
        .prepare("SELECT COUNT(*) FROM zones")?
        .query_row([], |row| row.get(0))?;
    #[allow(clippy::cast_sign_loss)]
    Ok(count as u64)
}
