//! Regular lon/lat grid construction.
//!
//! Cells are emitted column-major: the outer loop walks west to east, the
//! inner loop south to north. That order is the feature order of every
//! cell surface. The last column and row are clipped so the grid covers
//! the bounding box exactly.

use risk_map_risk_models::{BoundingBox, GridCell};

use crate::RiskError;

/// Slack, in ULPs of the step count, when deciding whether
/// `extent / cell_size` is a whole number, so `0.7 / 0.1` gives 7 rows
/// rather than 8. Anything further off gets an extra clipped cell, so no
/// cell is ever wider than `cell_size`.
const STEP_TOLERANCE_ULPS: f64 = 4.0;

/// Number of `(columns, rows)` the grid for `bbox` will have.
///
/// # Errors
///
/// Returns [`RiskError::InvalidCellSize`] if `cell_size_deg` is not a
/// positive finite number.
pub fn grid_dimensions(bbox: &BoundingBox, cell_size_deg: f64) -> Result<(usize, usize), RiskError> {
    if !cell_size_deg.is_finite() || cell_size_deg <= 0.0 {
        return Err(RiskError::InvalidCellSize(cell_size_deg));
    }

    if bbox.is_degenerate() {
        return Ok((0, 0));
    }

    Ok((
        steps(bbox.width(), cell_size_deg),
        steps(bbox.height(), cell_size_deg),
    ))
}

/// Total cell count, saturating instead of overflowing.
///
/// # Errors
///
/// Returns [`RiskError::InvalidCellSize`] if `cell_size_deg` is not a
/// positive finite number.
pub fn cell_count(bbox: &BoundingBox, cell_size_deg: f64) -> Result<usize, RiskError> {
    let (cols, rows) = grid_dimensions(bbox, cell_size_deg)?;
    Ok(cols.saturating_mul(rows))
}

/// Tiles `bbox` into cells of `cell_size_deg` degrees.
///
/// A zero-width or zero-height box yields an empty grid.
///
/// # Errors
///
/// Returns [`RiskError::InvalidCellSize`] if `cell_size_deg` is not a
/// positive finite number.
#[allow(clippy::cast_precision_loss)]
pub fn build_grid(bbox: &BoundingBox, cell_size_deg: f64) -> Result<Vec<GridCell>, RiskError> {
    let (cols, rows) = grid_dimensions(bbox, cell_size_deg)?;
    let mut cells = Vec::with_capacity(cols.saturating_mul(rows));

    for i in 0..cols {
        let west = (i as f64).mul_add(cell_size_deg, bbox.west);
        let east = if i + 1 == cols {
            bbox.east
        } else {
            (west + cell_size_deg).min(bbox.east)
        };

        for j in 0..rows {
            let south = (j as f64).mul_add(cell_size_deg, bbox.south);
            let north = if j + 1 == rows {
                bbox.north
            } else {
                (south + cell_size_deg).min(bbox.north)
            };

            cells.push(GridCell::new(west, south, east, north));
        }
    }

    Ok(cells)
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn steps(extent: f64, cell_size_deg: f64) -> usize {
    let n = extent / cell_size_deg;
    let rounded = n.round();

    let n = if (n - rounded).abs() <= STEP_TOLERANCE_ULPS * f64::EPSILON * rounded.max(1.0) {
        rounded
    } else {
        n.ceil()
    };

    n.max(0.0) as usize
}
