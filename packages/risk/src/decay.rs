//! Exponential decay kernel.
//!
//! Each event contributes `severity * temporal_decay * spatial_decay` to a
//! cell. Severity grows with the square root of the fatality count; both
//! decays are plain exponentials with configurable scales.

use chrono::{DateTime, Utc};
use risk_map_event_models::Event;
use risk_map_risk_models::GridCell;
use serde::{Deserialize, Serialize};

use crate::geometry::distance_km;

/// Default temporal decay timescale, in days.
pub const DEFAULT_TIMESCALE_DAYS: f64 = 30.0;

/// Default spatial decay lengthscale, in kilometers.
pub const DEFAULT_LENGTHSCALE_KM: f64 = 200.0;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Tunable scales of the decay kernel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayParams {
    /// Temporal e-folding time, in days.
    pub timescale_days: f64,
    /// Spatial e-folding distance, in kilometers.
    pub lengthscale_km: f64,
}

impl Default for DecayParams {
    fn default() -> Self {
        Self {
            timescale_days: DEFAULT_TIMESCALE_DAYS,
            lengthscale_km: DEFAULT_LENGTHSCALE_KM,
        }
    }
}

/// `sqrt(1 + fatalities)`, with missing or invalid counts treated as 0.
#[must_use]
pub fn severity(event: &Event) -> f64 {
    (1.0 + event.fatality_count()).sqrt()
}

/// `exp(-t / timescale)` where `t` is the age of the event in days at
/// `reference`.
///
/// Events dated after `reference` are clamped to `t = 0` and get full
/// weight. Undated events get no weight at all.
#[must_use]
pub fn temporal_decay(event: &Event, reference: DateTime<Utc>, timescale_days: f64) -> f64 {
    let Some(occurred_at) = event.occurred_at else {
        return 0.0;
    };

    let age_days = age_in_days(occurred_at, reference).max(0.0);
    (-age_days / timescale_days).exp()
}

/// `exp(-distance / lengthscale)`.
#[must_use]
pub fn spatial_decay(distance_km: f64, lengthscale_km: f64) -> f64 {
    (-distance_km / lengthscale_km).exp()
}

/// Full contribution of `event` to `cell`, measured at the cell centroid.
#[must_use]
pub fn contribution(
    event: &Event,
    cell: &GridCell,
    reference: DateTime<Utc>,
    params: &DecayParams,
) -> f64 {
    let distance = distance_km(
        cell.centroid_lon,
        cell.centroid_lat,
        event.longitude,
        event.latitude,
    );

    severity(event)
        * temporal_decay(event, reference, params.timescale_days)
        * spatial_decay(distance, params.lengthscale_km)
}

#[allow(clippy::cast_precision_loss)]
fn age_in_days(occurred_at: DateTime<Utc>, reference: DateTime<Utc>) -> f64 {
    (reference - occurred_at).num_milliseconds() as f64 / MILLIS_PER_DAY
}
