//! Event log storage in `DuckDB`.
//!
//! The `events` table mirrors the columns kept from a GTD export. A `_meta`
//! table records load bookkeeping (e.g. when the log was last replaced).

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use duckdb::Connection;
use risk_map_event_models::Event;

use crate::DbError;

/// A full event row as written by the loader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventRow {
    /// Source event identifier.
    pub eventid: String,
    /// Year component (0 when unknown).
    pub year: i32,
    /// Month component (0 when unknown).
    pub month: i32,
    /// Day component (0 when unknown).
    pub day: i32,
    /// Calendar date, when year/month/day form a real date.
    pub occurred_on: Option<NaiveDate>,
    /// Latitude (WGS84).
    pub latitude: Option<f64>,
    /// Longitude (WGS84).
    pub longitude: Option<f64>,
    /// Country name.
    pub country: Option<String>,
    /// Region name.
    pub region: Option<String>,
    /// Primary attack type.
    pub attacktype: Option<String>,
    /// Fatalities.
    pub nkill: Option<f64>,
    /// Wounded.
    pub nwound: Option<f64>,
}

/// Opens (or creates) the event log `DuckDB` and ensures the schema exists.
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

/// Opens the event log at the default path.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open_default() -> Result<Connection, DbError> {
    open(&crate::paths::events_db_path())
}

/// Opens a throwaway in-memory event log.
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
    create_events_table(conn)?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;

    Ok(())
}

fn create_events_table(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS events (
            eventid TEXT NOT NULL PRIMARY KEY,
            year INTEGER,
            month INTEGER,
            day INTEGER,
            occurred_on DATE,
            latitude DOUBLE,
            longitude DOUBLE,
            country TEXT,
            region TEXT,
            attacktype TEXT,
            nkill DOUBLE,
            nwound DOUBLE
        );",
    )?;

    Ok(())
}

/// Replaces the whole event log with `rows`.
///
/// The table is dropped and recreated, so the log always reflects exactly
/// the last load. Later rows win when an `eventid` repeats. Returns the
/// number of rows written.
///
/// # Errors
///
/// Returns [`DbError`] if any database operation fails. The previous
/// contents are kept when the replacement fails.
pub fn replace_events(conn: &Connection, rows: &[EventRow]) -> Result<u64, DbError> {
    conn.execute_batch("BEGIN TRANSACTION;")?;

    match write_events(conn, rows) {
        Ok(written) => {
            conn.execute_batch("COMMIT;")?;
            Ok(written)
        }
        Err(e) => {
            if let Err(rollback) = conn.execute_batch("ROLLBACK;") {
                log::error!("Failed to roll back event replacement: {rollback}");
            }
            Err(e)
        }
    }
}

fn write_events(conn: &Connection, rows: &[EventRow]) -> Result<u64, DbError> {
    conn.execute_batch("DROP TABLE IF EXISTS events;")?;
    create_events_table(conn)?;

    // Deduplicate: keep last occurrence of each eventid
    let mut last_seen: BTreeMap<&str, usize> = BTreeMap::new();
    for (i, row) in rows.iter().enumerate() {
        last_seen.insert(&row.eventid, i);
    }
    let deduped = rows
        .iter()
        .enumerate()
        .filter(|(i, row)| last_seen.get(row.eventid.as_str()) == Some(i))
        .map(|(_, row)| row);

    let mut stmt = conn.prepare(
        "INSERT INTO events (
            eventid, year, month, day, occurred_on, latitude, longitude,
            country, region, attacktype, nkill, nwound
        ) VALUES (?, ?, ?, ?, CAST(? AS DATE), ?, ?, ?, ?, ?, ?, ?)",
    )?;

    let mut written = 0u64;
    for row in deduped {
        let occurred_on = row.occurred_on.map(|d| d.format("%Y-%m-%d").to_string());

        stmt.execute(duckdb::params![
            row.eventid,
            row.year,
            row.month,
            row.day,
            occurred_on,
            row.latitude,
            row.longitude,
            row.country.as_deref(),
            row.region.as_deref(),
            row.attacktype.as_deref(),
            row.nkill,
            row.nwound,
        ])?;
        written += 1;
    }

    Ok(written)
}

/// Returns the number of stored events.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn get_record_count(conn: &Connection) -> Result<u64, DbError> {
    let mut stmt = conn.prepare("SELECT COUNT(*) FROM events")?;
    let count: i64 = stmt.query_row([], |row| row.get(0))?;
    #[allow(clippy::cast_sign_loss)]
    Ok(count as u64)
}

/// Returns located events whose date falls within `[since, until]`,
/// newest first, at most `limit` of them.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn recent_events(
    conn: &Connection,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<Event>, DbError> {
    let sql = format!(
        "SELECT eventid, occurred_on::TEXT, latitude, longitude, nkill
         FROM events
         WHERE occurred_on >= CAST(? AS DATE)
           AND occurred_on <= CAST(? AS DATE)
           AND latitude IS NOT NULL
           AND longitude IS NOT NULL
         ORDER BY occurred_on DESC, eventid
         LIMIT {limit}"
    );

    let mut stmt = conn.prepare(&sql)?;
    let since = since.date_naive().format("%Y-%m-%d").to_string();
    let until = until.date_naive().format("%Y-%m-%d").to_string();
    let mut rows = stmt.query([since, until])?;

    collect_events(&mut rows)
}

/// Returns the newest `limit` located events, regardless of date.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn list_events(conn: &Connection, limit: usize) -> Result<Vec<Event>, DbError> {
    let sql = format!(
        "SELECT eventid, occurred_on::TEXT, latitude, longitude, nkill
         FROM events
         WHERE latitude IS NOT NULL AND longitude IS NOT NULL
         ORDER BY occurred_on DESC NULLS LAST, eventid
         LIMIT {limit}"
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;

    collect_events(&mut rows)
}

fn collect_events(rows: &mut duckdb::Rows<'_>) -> Result<Vec<Event>, DbError> {
    let mut events = Vec::new();

    while let Some(row) = rows.next()? {
        let id: String = row.get(0)?;
        let occurred_on: Option<String> = row.get(1)?;
        let latitude: f64 = row.get(2)?;
        let longitude: f64 = row.get(3)?;
        let nkill: Option<f64> = row.get(4)?;

        let occurred_at = occurred_on.as_deref().and_then(parse_date);

        events.push(Event::new(id, occurred_at, latitude, longitude, nkill));
    }

    Ok(events)
}

/// Parses a `DuckDB` `DATE::TEXT` value (`YYYY-MM-DD`) as midnight UTC.
fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    match NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
        Ok(date) => Some(date.and_hms_opt(0, 0, 0)?.and_utc()),
        Err(e) => {
            log::warn!("Failed to parse event date {s:?}: {e}");
            None
        }
    }
}

/// Gets a metadata value from the `_meta` table.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>, DbError> {
    let mut stmt = conn.prepare("SELECT value FROM _meta WHERE key = ?")?;
    let result = stmt.query_row([key], |row| row.get(0));
    match result {
        Ok(v) => Ok(Some(v)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(DbError::DuckDb(e)),
    }
}

/// Sets a metadata value in the `_meta` table.
///
/// # Errors
///
/// Returns [`DbError`] if the upsert fails.
pub fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO _meta (key, value) VALUES (?, ?)
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        [key, value],
    )?;
    Ok(())
}
