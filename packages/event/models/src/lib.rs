#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Historical point-event record types.
//!
//! An [`Event`] is one row of the event log as handed to the risk engine:
//! where and when something happened, plus its fatality count. Rows without
//! usable coordinates never make it into an [`Event`]; the store filters them
//! out and [`Event::has_valid_location`] guards the rest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single historical event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Identifier from the source dataset (e.g. a GTD `eventid`).
    pub id: String,
    /// When the event occurred. `None` when the source date was unusable.
    pub occurred_at: Option<DateTime<Utc>>,
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// Raw fatality count as stored. May be missing or garbage.
    pub fatalities: Option<f64>,
}

impl Event {
    /// Creates a new event.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        occurred_at: Option<DateTime<Utc>>,
        latitude: f64,
        longitude: f64,
        fatalities: Option<f64>,
    ) -> Self {
        Self {
            id: id.into(),
            occurred_at,
            latitude,
            longitude,
            fatalities,
        }
    }

    /// Fatality count coerced to a non-negative finite number.
    #[must_use]
    pub fn fatality_count(&self) -> f64 {
        coerce_fatalities(self.fatalities)
    }

    /// Whether both coordinates are finite and inside the WGS84 range.
    #[must_use]
    pub fn has_valid_location(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Coerces a raw fatality value: missing, non-finite and negative values
/// all become `0.0`.
#[must_use]
pub fn coerce_fatalities(raw: Option<f64>) -> f64 {
    match raw {
        Some(v) if v.is_finite() && v > 0.0 => v,
        _ => 0.0,
    }
}

/// Parses a fatality count from free text. Blank or non-numeric input
/// yields `None`.
#[must_use]
pub fn parse_fatalities(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
