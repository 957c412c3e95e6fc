//! Kernel summation over the grid and max-normalization.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use risk_map_event_models::Event;
use risk_map_risk_models::{CellRisk, GridCell};

use crate::decay::{DecayParams, severity, spatial_decay, temporal_decay};
use crate::geometry::distance_km;

/// An event reduced to what the kernel needs: its location and its
/// distance-independent weight.
#[derive(Debug, Clone, Copy)]
struct WeightedEvent {
    lon: f64,
    lat: f64,
    weight: f64,
}

/// Raw, unnormalized scores, one per cell in grid order.
///
/// Each score is the sum of every event's kernel contribution at the cell
/// centroid. Events without a usable location are skipped. Cells are scored
/// in parallel; the sum within a cell runs in event order.
#[must_use]
pub fn raw_scores(
    cells: &[GridCell],
    events: &[Event],
    reference: DateTime<Utc>,
    params: &DecayParams,
) -> Vec<f64> {
    let weighted = weigh_events(events, reference, params);

    cells
        .par_iter()
        .map(|cell| {
            weighted.iter().fold(0.0, |acc, e| {
                let d = distance_km(cell.centroid_lon, cell.centroid_lat, e.lon, e.lat);
                e.weight.mul_add(spatial_decay(d, params.lengthscale_km), acc)
            })
        })
        .collect()
}

/// Scales `scores` so the largest becomes exactly `1.0`.
///
/// If no score is positive, every value becomes `0.0`. Non-finite values
/// never reach the output.
#[must_use]
pub fn normalize(scores: &[f64]) -> Vec<f64> {
    let max = scores
        .iter()
        .copied()
        .filter(|s| s.is_finite())
        .fold(0.0_f64, f64::max);

    if max <= 0.0 {
        return vec![0.0; scores.len()];
    }

    scores
        .iter()
        .map(|&s| {
            let r = s / max;
            if r.is_finite() { r.clamp(0.0, 1.0) } else { 0.0 }
        })
        .collect()
}

/// Scores and normalizes every cell against `events`.
#[must_use]
pub fn aggregate(
    cells: &[GridCell],
    events: &[Event],
    reference: DateTime<Utc>,
    params: &DecayParams,
) -> Vec<CellRisk> {
    let risks = normalize(&raw_scores(cells, events, reference, params));

    cells
        .iter()
        .zip(risks)
        .map(|(cell, risk)| CellRisk { cell: *cell, risk })
        .collect()
}

fn weigh_events(events: &[Event], reference: DateTime<Utc>, params: &DecayParams) -> Vec<WeightedEvent> {
    let mut skipped = 0usize;

    let weighted: Vec<WeightedEvent> = events
        .iter()
        .filter(|e| {
            let valid = e.has_valid_location();
            if !valid {
                skipped += 1;
            }
            valid
        })
        .map(|e| WeightedEvent {
            lon: e.longitude,
            lat: e.latitude,
            weight: severity(e) * temporal_decay(e, reference, params.timescale_days),
        })
        .filter(|e| e.weight > 0.0)
        .collect();

    if skipped > 0 {
        log::warn!("Skipped {skipped} events without a usable location");
    }

    weighted
}
