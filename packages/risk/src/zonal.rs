//! Cell-to-zone reduction.

use std::collections::BTreeMap;

use risk_map_risk_models::{CellRisk, ZoneRisk};
use risk_map_spatial::ZoneIndex;

/// Averages cell risks per zone.
///
/// Each cell is assigned to the zone containing its centroid. A centroid
/// covered by several zones goes to the smallest one; a centroid outside
/// every zone is dropped. Zones that receive no cells are omitted. The
/// result is sorted by zone name.
#[must_use]
pub fn reduce_by_zone(cells: &[CellRisk], zones: &ZoneIndex) -> Vec<ZoneRisk> {
    let mut totals: BTreeMap<&str, (geojson::Geometry, f64, usize)> = BTreeMap::new();
    let mut unassigned = 0usize;

    for scored in cells {
        let Some(zone) = zones.lookup(scored.cell.centroid_lon, scored.cell.centroid_lat) else {
            unassigned += 1;
            continue;
        };

        let entry = totals
            .entry(zone.name())
            .or_insert_with(|| (zone.geometry().clone(), 0.0, 0));
        entry.1 += scored.risk;
        entry.2 += 1;
    }

    log::debug!(
        "Assigned {} cells to {} zones ({unassigned} outside every zone)",
        cells.len() - unassigned,
        totals.len()
    );

    totals
        .into_iter()
        .map(|(name, (geometry, sum, count))| {
            #[allow(clippy::cast_precision_loss)]
            let risk = sum / count as f64;
            ZoneRisk {
                name: name.to_string(),
                geometry,
                risk,
            }
        })
        .collect()
}
