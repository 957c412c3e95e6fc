#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the risk map server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the engine types so the query-string contract can stay lenient
//! while the engine works with fully resolved values.

use risk_map_risk_models::{AggregationMode, BoundingBox, PredictRequest};
use serde::{Deserialize, Serialize};

/// Default number of events returned by `/api/events`.
pub const DEFAULT_EVENTS_LIMIT: usize = 1000;

/// Query parameters for the predict endpoint.
///
/// Every field is optional. Missing or unusable values fall back to the
/// server defaults, except a non-positive cell size, which is rejected
/// by the engine.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictQueryParams {
    /// Forecast horizon label, in days.
    pub horizon_days: Option<u32>,
    /// Bounding box as `west,south,east,north`.
    pub bbox: Option<String>,
    /// `cell` or `country`.
    pub agg: Option<String>,
    /// Grid cell size in degrees.
    pub cell_size_deg: Option<f64>,
    /// Event lookback window, in days.
    pub lookback_days: Option<u32>,
}

impl PredictQueryParams {
    /// Resolves the parameters against `defaults`.
    ///
    /// A malformed bbox becomes the whole world and an unknown `agg`
    /// becomes `cell`.
    #[must_use]
    pub fn resolve(&self, defaults: &PredictRequest) -> PredictRequest {
        PredictRequest {
            horizon_days: self.horizon_days.unwrap_or(defaults.horizon_days),
            bbox: BoundingBox::resolve(self.bbox.as_deref()),
            agg: AggregationMode::parse_or_default(self.agg.as_deref()),
            cell_size_deg: self.cell_size_deg.unwrap_or(defaults.cell_size_deg),
            lookback_days: self.lookback_days.unwrap_or(defaults.lookback_days),
        }
    }
}

/// Query parameters for the events endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventsQueryParams {
    /// Maximum number of events.
    pub limit: Option<usize>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiHealth {
    /// Whether the server is healthy.
    pub healthy: bool,
    /// Server version.
    pub version: String,
}

/// Model description returned by `/api/meta`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMeta {
    /// Model identifier.
    pub model: String,
    /// Horizon applied when a request omits one.
    pub default_horizon: u32,
    /// Temporal decay timescale, in days.
    pub timescale_days: f64,
    /// Spatial decay lengthscale, in kilometers.
    pub lengthscale_km: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_uses_defaults() {
        let resolved = PredictQueryParams::default().resolve(&PredictRequest::default());
        assert_eq!(resolved, PredictRequest::default());
    }

    #[test]
    fn reads_camel_case_parameters() {
        let p: PredictQueryParams = serde_json::from_value(serde_json::json!({
            "horizonDays": 30,
            "agg": "country",
            "cellSizeDeg": 0.5,
            "lookbackDays": 60,
        }))
        .unwrap();
        let resolved = p.resolve(&PredictRequest::default());

        assert_eq!(resolved.horizon_days, 30);
        assert_eq!(resolved.agg, AggregationMode::Country);
        assert!((resolved.cell_size_deg - 0.5).abs() < f64::EPSILON);
        assert_eq!(resolved.lookback_days, 60);
    }

    #[test]
    fn lenient_values_degrade_to_defaults() {
        let p = PredictQueryParams {
            bbox: Some("10,20,5,30".to_string()),
            agg: Some("province".to_string()),
            ..PredictQueryParams::default()
        };
        let resolved = p.resolve(&PredictRequest::default());

        assert_eq!(resolved.bbox, BoundingBox::WORLD);
        assert_eq!(resolved.agg, AggregationMode::Cell);
    }

    #[test]
    fn keeps_a_valid_bbox() {
        let p = PredictQueryParams {
            bbox: Some("-10.5, 3, 7.75, 9".to_string()),
            ..PredictQueryParams::default()
        };
        let resolved = p.resolve(&PredictRequest::default());
        assert_eq!(resolved.bbox, BoundingBox::new(-10.5, 3.0, 7.75, 9.0));
    }

    #[test]
    fn meta_serializes_camel_case() {
        let meta = ApiMeta {
            model: "kernel-decay".to_string(),
            default_horizon: 90,
            timescale_days: 30.0,
            lengthscale_km: 200.0,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["defaultHorizon"], 90);
        assert_eq!(json["lengthscaleKm"], 200.0);
    }
}
