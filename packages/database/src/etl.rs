//! Global Terrorism Database CSV loader.
//!
//! Reads a GTD export, keeps the columns the risk engine and the events
//! endpoint need, coerces messy values, and replaces the event log with the
//! result. Columns that are absent from the file are stored as NULL.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, Utc};
use duckdb::Connection;
use risk_map_event_models::parse_fatalities;

use crate::DbError;
use crate::event_db::{self, EventRow};

/// GTD header -> event column.
const COLUMN_MAP: &[(&str, &str)] = &[
    ("eventid", "eventid"),
    ("iyear", "year"),
    ("imonth", "month"),
    ("iday", "day"),
    ("latitude", "latitude"),
    ("longitude", "longitude"),
    ("country_txt", "country"),
    ("region_txt", "region"),
    ("attacktype1_txt", "attacktype"),
    ("nkill", "nkill"),
    ("nwound", "nwound"),
];

/// Loads the GTD CSV at `path` into the event log, replacing its contents.
///
/// A missing file is logged and treated as nothing to load. Returns the
/// number of rows written.
///
/// # Errors
///
/// Returns [`DbError`] if the file cannot be read or parsed, or the write
/// fails.
pub fn load_gtd_csv(conn: &Connection, path: &Path) -> Result<u64, DbError> {
    log::info!("Loading GTD from {}", path.display());

    if !path.exists() {
        log::warn!("GTD file not found at {}", path.display());
        return Ok(0);
    }

    let file = std::fs::File::open(path)?;
    let rows = parse_gtd_records(file)?;
    let written = event_db::replace_events(conn, &rows)?;

    event_db::set_meta(conn, "loaded_at", &Utc::now().to_rfc3339())?;
    event_db::set_meta(conn, "loaded_from", &path.display().to_string())?;

    log::info!("Loaded {written} events into the event log");
    Ok(written)
}

/// Parses GTD CSV records into [`EventRow`]s.
///
/// GTD exports are Latin-1, so every byte is decoded as its own code
/// point.
///
/// # Errors
///
/// Returns [`DbError`] if the CSV is malformed.
pub fn parse_gtd_records<R: Read>(reader: R) -> Result<Vec<EventRow>, DbError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);

    let headers = reader.byte_headers()?.clone();
    let index: BTreeMap<&str, usize> = COLUMN_MAP
        .iter()
        .filter_map(|(gtd, column)| {
            headers
                .iter()
                .position(|h| latin1(h).trim() == *gtd)
                .map(|i| (*column, i))
        })
        .collect();

    for (gtd, column) in COLUMN_MAP {
        if !index.contains_key(column) {
            log::warn!("GTD column '{gtd}' not found, '{column}' will be NULL");
        }
    }

    let mut rows = Vec::new();

    for (n, record) in reader.byte_records().enumerate() {
        let record = record?;
        let field = |column: &str| -> Option<String> {
            let i = *index.get(column)?;
            let raw = record.get(i)?;
            let value = latin1(raw).trim().to_string();
            (!value.is_empty()).then_some(value)
        };

        let year = field("year").and_then(|v| parse_int(&v)).unwrap_or(0);
        let month = field("month").map_or(Some(1), |v| parse_int(&v)).unwrap_or(1);
        let day = field("day").map_or(Some(1), |v| parse_int(&v)).unwrap_or(1);

        let eventid = field("eventid").unwrap_or_else(|| format!("row-{n}"));

        rows.push(EventRow {
            eventid,
            year,
            month,
            day,
            occurred_on: calendar_date(year, month, day),
            latitude: field("latitude").and_then(|v| parse_coordinate(&v)),
            longitude: field("longitude").and_then(|v| parse_coordinate(&v)),
            country: field("country"),
            region: field("region"),
            attacktype: field("attacktype"),
            nkill: field("nkill").and_then(|v| parse_fatalities(&v)),
            nwound: field("nwound").and_then(|v| parse_fatalities(&v)),
        });
    }

    log::info!("Parsed {} GTD records", rows.len());
    Ok(rows)
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Parses an integer column, accepting float spellings like `"2014.0"`.
#[allow(clippy::cast_possible_truncation)]
fn parse_int(s: &str) -> Option<i32> {
    s.parse::<i32>().ok().or_else(|| {
        s.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && v.fract() == 0.0 && v.abs() <= f64::from(i32::MAX))
            .map(|v| v as i32)
    })
}

fn parse_coordinate(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Builds a date from GTD components. GTD uses `0` for unknown month/day,
/// which yields `None` rather than a guessed date.
fn calendar_date(year: i32, month: i32, day: i32) -> Option<NaiveDate> {
    if year <= 0 {
        return None;
    }
    NaiveDate::from_ymd_opt(year, u32::try_from(month).ok()?, u32::try_from(day).ok()?)
}
