#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial index over named zone polygons.
//!
//! Zones (countries, regions) are loaded either from the `zones` table of the
//! boundaries `DuckDB` or straight from a `GeoJSON` `FeatureCollection`, then
//! bulk-loaded into an R-tree keyed by envelope. [`ZoneIndex::lookup`] answers
//! "which zone contains this point" for zonal aggregation.

use geo::{Area, BoundingRect, Contains, MultiPolygon};
use geojson::{Feature, GeoJson, Geometry};
use rstar::{AABB, RTree, RTreeObject};

/// Errors that can occur while building a [`ZoneIndex`].
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// Boundaries database error.
    #[error("Boundaries database error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// `GeoJSON` could not be parsed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The `GeoJSON` document was valid but not a `FeatureCollection`.
    #[error("Expected a GeoJSON FeatureCollection")]
    NotFeatureCollection,
}

/// A named polygon stored in the R-tree.
#[derive(Debug, Clone)]
pub struct Zone {
    name: String,
    geometry: Geometry,
    polygon: MultiPolygon<f64>,
    area: f64,
    envelope: AABB<[f64; 2]>,
}

impl Zone {
    /// Builds a zone from a `GeoJSON` geometry.
    ///
    /// Returns `None` for anything that is not a `Polygon` or
    /// `MultiPolygon`.
    #[must_use]
    pub fn new(name: impl Into<String>, geometry: Geometry) -> Option<Self> {
        let polygon = to_multipolygon(&geometry)?;
        let envelope = compute_envelope(&polygon);
        let area = polygon.unsigned_area();

        Some(Self {
            name: name.into(),
            geometry,
            polygon,
            area,
            envelope,
        })
    }

    /// Zone name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Zone boundary as `GeoJSON`.
    #[must_use]
    pub const fn geometry(&self) -> &Geometry {
        &self.geometry
    }
}

impl RTreeObject for Zone {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Pre-built R-tree over zone polygons.
pub struct ZoneIndex {
    zones: RTree<Zone>,
}

impl ZoneIndex {
    /// Builds an index from already-parsed zones.
    #[must_use]
    pub fn from_zones(zones: Vec<Zone>) -> Self {
        Self {
            zones: RTree::bulk_load(zones),
        }
    }

    /// Loads zones from the `zones` table of the boundaries `DuckDB`.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the query fails.
    pub fn load(conn: &duckdb::Connection) -> Result<Self, SpatialError> {
        let mut stmt = conn.prepare(
            "SELECT name, boundary_geojson FROM zones \
             WHERE boundary_geojson IS NOT NULL ORDER BY name",
        )?;
        let mut rows = stmt.query([])?;
        let mut zones = Vec::new();

        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            let geojson_str: String = row.get(1)?;

            if name.is_empty() || geojson_str.is_empty() {
                continue;
            }

            let Some(zone) = parse_geometry(&geojson_str).and_then(|g| Zone::new(&name, g)) else {
                log::warn!("Failed to parse GeoJSON for zone {name}");
                continue;
            };

            zones.push(zone);
        }

        log::info!("Loaded {} zones into spatial index", zones.len());

        Ok(Self::from_zones(zones))
    }

    /// Builds an index from a `GeoJSON` `FeatureCollection`, reading each
    /// zone's name from the `name_key` property.
    ///
    /// Features without a string name or without polygonal geometry are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the document is not a valid
    /// `FeatureCollection`.
    pub fn from_feature_collection(geojson_str: &str, name_key: &str) -> Result<Self, SpatialError> {
        let zones = zones_from_feature_collection(geojson_str, name_key)?;
        log::info!("Loaded {} zones from GeoJSON", zones.len());
        Ok(Self::from_zones(zones))
    }

    /// Number of indexed zones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.zones.size()
    }

    /// Whether the index holds no zones.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up the zone containing a point.
    ///
    /// Zones can overlap; the smallest area wins.
    #[must_use]
    pub fn lookup(&self, lon: f64, lat: f64) -> Option<&Zone> {
        let point = geo::Point::new(lon, lat);
        let query_env = AABB::from_point([lon, lat]);

        let mut best: Option<&Zone> = None;

        for zone in self.zones.locate_in_envelope_intersecting(&query_env) {
            if zone.polygon.contains(&point) {
                match best {
                    None => best = Some(zone),
                    Some(current) if zone.area < current.area => best = Some(zone),
                    _ => {}
                }
            }
        }

        best
    }
}

/// Parses every named polygonal feature of a `FeatureCollection`.
///
/// # Errors
///
/// Returns [`SpatialError`] if the document is not a valid
/// `FeatureCollection`.
pub fn zones_from_feature_collection(
    geojson_str: &str,
    name_key: &str,
) -> Result<Vec<Zone>, SpatialError> {
    let GeoJson::FeatureCollection(fc) = geojson_str.parse::<GeoJson>()? else {
        return Err(SpatialError::NotFeatureCollection);
    };

    Ok(fc
        .features
        .into_iter()
        .filter_map(|f| feature_to_zone(f, name_key))
        .collect())
}

fn feature_to_zone(feature: Feature, name_key: &str) -> Option<Zone> {
    let name = feature
        .property(name_key)
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let Some(name) = name.filter(|n| !n.is_empty()) else {
        log::debug!("Skipping feature without a '{name_key}' property");
        return None;
    };

    let zone = feature.geometry.and_then(|g| Zone::new(&name, g));
    if zone.is_none() {
        log::warn!("Skipping zone {name}: missing or non-polygonal geometry");
    }
    zone
}

fn parse_geometry(geojson_str: &str) -> Option<Geometry> {
    match geojson_str.parse::<GeoJson>().ok()? {
        GeoJson::Geometry(geom) => Some(geom),
        _ => None,
    }
}

/// Converts a `GeoJSON` geometry into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
fn to_multipolygon(geometry: &Geometry) -> Option<MultiPolygon<f64>> {
    let geo_geom: geo::Geometry<f64> = geometry.clone().try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZONES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "name": "West" },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0, 0], [10, 0], [10, 20], [0, 20], [0, 0]]]
                }
            },
            {
                "type": "Feature",
                "properties": { "name": "Enclave" },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[2, 2], [4, 2], [4, 4], [2, 4], [2, 2]]]
                }
            },
            {
                "type": "Feature",
                "properties": { "name": "Islands" },
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [
                        [[[30, 0], [31, 0], [31, 1], [30, 1], [30, 0]]],
                        [[[40, 0], [41, 0], [41, 1], [40, 1], [40, 0]]]
                    ]
                }
            },
            {
                "type": "Feature",
                "properties": { "other": "Nameless" },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[50, 0], [51, 0], [51, 1], [50, 1], [50, 0]]]
                }
            },
            {
                "type": "Feature",
                "properties": { "name": "Pin" },
                "geometry": { "type": "Point", "coordinates": [60, 0] }
            }
        ]
    }"#;

    #[test]
    fn loads_only_named_polygons() {
        let index = ZoneIndex::from_feature_collection(ZONES, "name").unwrap();
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn looks_up_containing_zone() {
        let index = ZoneIndex::from_feature_collection(ZONES, "name").unwrap();
        assert_eq!(index.lookup(5.0, 15.0).map(Zone::name), Some("West"));
        assert_eq!(index.lookup(40.5, 0.5).map(Zone::name), Some("Islands"));
        assert!(index.lookup(20.0, 0.5).is_none());
    }

    #[test]
    fn smallest_overlapping_zone_wins() {
        let index = ZoneIndex::from_feature_collection(ZONES, "name").unwrap();
        assert_eq!(index.lookup(3.0, 3.0).map(Zone::name), Some("Enclave"));
    }

    #[test]
    fn rejects_non_collection() {
        let result = ZoneIndex::from_feature_collection(
            r#"{"type": "Point", "coordinates": [0, 0]}"#,
            "name",
        );
        assert!(matches!(result, Err(SpatialError::NotFeatureCollection)));
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(ZoneIndex::from_feature_collection("{oops", "name").is_err());
    }

    #[test]
    fn loads_from_duckdb_table() {
        let conn = duckdb::Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE zones (name TEXT PRIMARY KEY, boundary_geojson TEXT);
             INSERT INTO zones VALUES
                ('Square', '{\"type\":\"Polygon\",\"coordinates\":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}'),
                ('Broken', 'not geojson'),
                ('Empty', NULL);",
        )
        .unwrap();

        let index = ZoneIndex::load(&conn).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.lookup(0.5, 0.5).map(Zone::name), Some("Square"));
    }
}
