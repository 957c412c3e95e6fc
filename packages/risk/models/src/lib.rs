#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Grid geometry, prediction request, and risk surface types.
//!
//! These are the shapes that flow between the risk engine, the result cache,
//! and the API layer. A [`RiskSurface`] is either a per-cell surface or a
//! per-zone surface; both serialize to a `GeoJSON` `FeatureCollection` via
//! [`RiskSurface::to_feature_collection`].

use geo::{Coord, Polygon, Rect};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A geographic bounding box in WGS84 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western longitude boundary.
    pub west: f64,
    /// Southern latitude boundary.
    pub south: f64,
    /// Eastern longitude boundary.
    pub east: f64,
    /// Northern latitude boundary.
    pub north: f64,
}

impl BoundingBox {
    /// The whole world, used whenever a request has no usable bbox.
    pub const WORLD: Self = Self::new(-180.0, -90.0, 180.0, 90.0);

    /// Creates a new bounding box from the given coordinates.
    #[must_use]
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Parses a bounding box string `"west,south,east,north"`.
    ///
    /// Returns `None` unless there are exactly four finite numbers with
    /// `west <= east` and `south <= north`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
            .collect::<Option<Vec<f64>>>()?;

        let [west, south, east, north] = parts.as_slice() else {
            return None;
        };

        if west > east || south > north {
            return None;
        }

        Some(Self::new(*west, *south, *east, *north))
    }

    /// Resolves an optional bbox string, falling back to [`Self::WORLD`]
    /// when absent or malformed.
    #[must_use]
    pub fn resolve(s: Option<&str>) -> Self {
        s.and_then(Self::parse).unwrap_or(Self::WORLD)
    }

    /// Extent along the longitude axis, in degrees.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    /// Extent along the latitude axis, in degrees.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Whether the box has zero (or negative) area.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Stable textual form used for cache keys.
    #[must_use]
    pub fn canonical(&self) -> String {
        format!("{},{},{},{}", self.west, self.south, self.east, self.north)
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::WORLD
    }
}

/// One rectangular cell of a regular grid, with its centroid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridCell {
    /// Western edge.
    pub west: f64,
    /// Southern edge.
    pub south: f64,
    /// Eastern edge.
    pub east: f64,
    /// Northern edge.
    pub north: f64,
    /// Centroid longitude.
    pub centroid_lon: f64,
    /// Centroid latitude.
    pub centroid_lat: f64,
}

impl GridCell {
    /// Creates a cell from its edges, computing the centroid.
    #[must_use]
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
            centroid_lon: (west + east) / 2.0,
            centroid_lat: (south + north) / 2.0,
        }
    }

    /// Area in square degrees.
    #[must_use]
    pub fn area_deg2(&self) -> f64 {
        (self.east - self.west) * (self.north - self.south)
    }

    /// The cell as a closed polygon.
    #[must_use]
    pub fn to_polygon(&self) -> Polygon<f64> {
        Rect::new(
            Coord {
                x: self.west,
                y: self.south,
            },
            Coord {
                x: self.east,
                y: self.north,
            },
        )
        .to_polygon()
    }
}

/// How the per-cell surface is reported.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AggregationMode {
    /// One feature per grid cell.
    #[default]
    Cell,
    /// One feature per country polygon, holding the mean of its cells.
    Country,
}

impl AggregationMode {
    /// Parses a mode, degrading unknown values to [`Self::Cell`].
    #[must_use]
    pub fn parse_or_default(s: Option<&str>) -> Self {
        s.and_then(|v| v.trim().parse().ok()).unwrap_or_default()
    }
}

/// A fully resolved prediction request.
///
/// `horizon_days` labels the response and keys the cache; it does not
/// change the decay computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictRequest {
    /// Forecast horizon the result is labelled with.
    pub horizon_days: u32,
    /// Area to score.
    pub bbox: BoundingBox,
    /// Output aggregation.
    pub agg: AggregationMode,
    /// Grid cell size in degrees. Must be positive.
    pub cell_size_deg: f64,
    /// How far back to pull events from the store.
    pub lookback_days: u32,
}

impl Default for PredictRequest {
    fn default() -> Self {
        Self {
            horizon_days: 90,
            bbox: BoundingBox::WORLD,
            agg: AggregationMode::Cell,
            cell_size_deg: 1.0,
            lookback_days: 365,
        }
    }
}

/// A grid cell with its normalized risk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellRisk {
    /// The cell geometry.
    pub cell: GridCell,
    /// Risk in `[0, 1]`, relative to the highest cell of the same result.
    pub risk: f64,
}

/// A named zone with the mean risk of the cells it contains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneRisk {
    /// Zone name (e.g. a country name).
    pub name: String,
    /// Zone boundary.
    pub geometry: Geometry,
    /// Mean risk of the associated cells.
    pub risk: f64,
}

/// The output of one risk computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RiskSurface {
    /// Per-cell surface, in grid order.
    Cells {
        /// Scored cells.
        cells: Vec<CellRisk>,
    },
    /// Per-zone surface, ordered by zone name.
    Zones {
        /// Scored zones.
        zones: Vec<ZoneRisk>,
    },
}

impl RiskSurface {
    /// Number of features the surface will produce.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Cells { cells } => cells.len(),
            Self::Zones { zones } => zones.len(),
        }
    }

    /// Whether the surface has no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All risk values in output order.
    #[must_use]
    pub fn risks(&self) -> Vec<f64> {
        match self {
            Self::Cells { cells } => cells.iter().map(|c| c.risk).collect(),
            Self::Zones { zones } => zones.iter().map(|z| z.risk).collect(),
        }
    }

    /// Converts the surface into a `GeoJSON` `FeatureCollection`.
    ///
    /// Cell features carry `{risk}`; zone features carry `{risk, name}`.
    #[must_use]
    pub fn to_feature_collection(&self) -> FeatureCollection {
        let features = match self {
            Self::Cells { cells } => cells
                .iter()
                .map(|c| {
                    let geometry = Geometry::new(geojson::Value::from(&c.cell.to_polygon()));
                    feature(geometry, risk_properties(c.risk, None))
                })
                .collect(),
            Self::Zones { zones } => zones
                .iter()
                .map(|z| feature(z.geometry.clone(), risk_properties(z.risk, Some(&z.name))))
                .collect(),
        };

        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }
}

fn feature(geometry: Geometry, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(geometry),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn risk_properties(risk: f64, name: Option<&str>) -> JsonObject {
    let mut props = JsonObject::new();
    props.insert("risk".to_string(), serde_json::Value::from(risk));
    if let Some(name) = name {
        props.insert("name".to_string(), serde_json::Value::from(name));
    }
    props
}
