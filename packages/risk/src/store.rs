//! Event and boundary sources the service reads from.
//!
//! Both are traits so the service can be driven by the `DuckDB` stores in
//! production and by in-memory fixtures in tests.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use chrono::{DateTime, Utc};
use risk_map_database::{boundaries_db, event_db};
use risk_map_event_models::Event;
use risk_map_spatial::ZoneIndex;

/// Error type returned by stores. Callers only log it.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Read access to the historical event log.
pub trait EventStore: Send + Sync {
    /// Located events dated within `[since, until]`, newest first, at most
    /// `limit` of them.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the underlying store cannot be queried.
    fn recent_events(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Event>, StoreError>;
}

/// Provider of the zone polygons used for zonal aggregation.
pub trait BoundarySource: Send + Sync {
    /// The zone index, built on first use.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the boundaries cannot be read or parsed.
    fn zone_index(&self) -> Result<Arc<ZoneIndex>, StoreError>;
}

/// [`EventStore`] backed by the `events` table of a `DuckDB` file.
///
/// `duckdb::Connection` is `Send` but not `Sync`, so a `Mutex` is needed.
pub struct DuckDbEventStore {
    conn: Mutex<duckdb::Connection>,
}

impl DuckDbEventStore {
    /// Wraps an already-open connection.
    #[must_use]
    pub const fn new(conn: duckdb::Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Opens (or creates) the event log at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`risk_map_database::DbError`] if the database cannot be
    /// opened.
    pub fn open(path: &Path) -> Result<Self, risk_map_database::DbError> {
        Ok(Self::new(event_db::open(path)?))
    }

    /// Newest `limit` located events, regardless of date.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the lock is poisoned or the query fails.
    pub fn list_events(&self, limit: usize) -> Result<Vec<Event>, StoreError> {
        let conn = self.conn.lock().map_err(|_| "event store lock poisoned")?;
        Ok(event_db::list_events(&conn, limit)?)
    }

    /// Total number of stored events.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the lock is poisoned or the query fails.
    pub fn count(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock().map_err(|_| "event store lock poisoned")?;
        Ok(event_db::get_record_count(&conn)?)
    }
}

impl EventStore for DuckDbEventStore {
    fn recent_events(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Event>, StoreError> {
        let conn = self.conn.lock().map_err(|_| "event store lock poisoned")?;
        Ok(event_db::recent_events(&conn, since, until, limit)?)
    }
}

/// [`BoundarySource`] reading the `zones` table of the boundaries `DuckDB`.
///
/// The file is opened read-only on first use and the index is kept for the
/// lifetime of the source. A failed load is not cached and is retried on
/// the next call.
pub struct DuckDbBoundaries {
    path: PathBuf,
    index: OnceLock<Arc<ZoneIndex>>,
}

impl DuckDbBoundaries {
    /// Creates a source for the boundaries database at `path`.
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self {
            path,
            index: OnceLock::new(),
        }
    }
}

impl BoundarySource for DuckDbBoundaries {
    fn zone_index(&self) -> Result<Arc<ZoneIndex>, StoreError> {
        if let Some(index) = self.index.get() {
            return Ok(index.clone());
        }

        if !self.path.exists() {
            return Err(format!("boundaries database not found at {}", self.path.display()).into());
        }

        log::info!("Loading zones from {}", self.path.display());
        let conn = duckdb::Connection::open_with_flags(
            &self.path,
            duckdb::Config::default().access_mode(duckdb::AccessMode::ReadOnly)?,
        )?;
        let index = Arc::new(ZoneIndex::load(&conn)?);

        Ok(self.index.get_or_init(|| index).clone())
    }
}

/// [`BoundarySource`] reading a `GeoJSON` `FeatureCollection` file.
pub struct GeoJsonBoundaries {
    path: PathBuf,
    name_key: String,
    index: OnceLock<Arc<ZoneIndex>>,
}

impl GeoJsonBoundaries {
    /// Creates a source for the file at `path`, naming zones by the
    /// `name_key` feature property.
    #[must_use]
    pub fn new(path: PathBuf, name_key: impl Into<String>) -> Self {
        Self {
            path,
            name_key: name_key.into(),
            index: OnceLock::new(),
        }
    }
}

impl BoundarySource for GeoJsonBoundaries {
    fn zone_index(&self) -> Result<Arc<ZoneIndex>, StoreError> {
        if let Some(index) = self.index.get() {
            return Ok(index.clone());
        }

        log::info!("Loading zones from {}", self.path.display());
        let contents = std::fs::read_to_string(&self.path)?;
        let index = Arc::new(ZoneIndex::from_feature_collection(&contents, &self.name_key)?);

        Ok(self.index.get_or_init(|| index).clone())
    }
}

/// [`BoundarySource`] over a fixed, pre-built index.
pub struct StaticZones(Arc<ZoneIndex>);

impl StaticZones {
    /// Wraps `index`.
    #[must_use]
    pub fn new(index: ZoneIndex) -> Self {
        Self(Arc::new(index))
    }
}

impl BoundarySource for StaticZones {
    fn zone_index(&self) -> Result<Arc<ZoneIndex>, StoreError> {
        Ok(self.0.clone())
    }
}

/// Imports every named polygonal feature of a `GeoJSON` `FeatureCollection`
/// into the `zones` table, naming zones by the `name_key` property.
///
/// Returns the number of zones written.
///
/// # Errors
///
/// Returns [`StoreError`] if the document is not a valid
/// `FeatureCollection` or the write fails.
pub fn import_zones_geojson(
    conn: &duckdb::Connection,
    geojson_str: &str,
    name_key: &str,
) -> Result<u64, StoreError> {
    let zones = risk_map_spatial::zones_from_feature_collection(geojson_str, name_key)?;

    let rows: Vec<(String, String)> = zones
        .iter()
        .map(|z| (z.name().to_string(), z.geometry().to_string()))
        .collect();

    Ok(boundaries_db::upsert_zones(conn, &rows)?)
}
