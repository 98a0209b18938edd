// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Geospatial Cell Codec: (lat,lng) <-> H3 cell, k-ring neighbours, haversine
//! distance. Pure and referentially transparent — no state, no I/O. Server
//! and client must agree bit-for-bit on the same (resolution, algorithm), so
//! this module never changes behaviour based on configuration at runtime.

use h3o::{CellIndex, LatLng, Resolution};

/// Fixed resolution for the whole service. H3 res 9 cells have an edge length
/// of roughly 150m (~0.1 km^2 area).
pub const CELL_RESOLUTION: Resolution = Resolution::Nine;

/// Opaque cell identifier. Total ordering is irrelevant; equality and
/// neighbour enumeration are the only operations callers need.
pub type CellId = CellIndex;

/// Map a (lat,lng) pair to the H3 cell containing it at [`CELL_RESOLUTION`].
pub fn cell_of(lat: f64, lng: f64) -> Result<CellId, h3o::error::InvalidLatLng> {
    Ok(LatLng::new(lat, lng)?.to_cell(CELL_RESOLUTION))
}

/// All cells within graph-distance `k` of `center` (k=0 returns the cell
/// itself; k=1 adds the six adjacent cells; k=2 the twelve beyond that).
pub fn neighbours(center: CellId, k: u32) -> Vec<CellId> {
    center.grid_disk::<Vec<_>>(k)
}

/// Only the cells at graph-distance exactly `k` (the newly-discovered ring),
/// so an expanding-ring search never rescans cells already visited.
pub fn ring_at(center: CellId, k: u32) -> Vec<CellId> {
    if k == 0 {
        return vec![center];
    }
    let outer: std::collections::HashSet<CellId> = neighbours(center, k).into_iter().collect();
    let inner: std::collections::HashSet<CellId> = neighbours(center, k - 1).into_iter().collect();
    outer.difference(&inner).copied().collect()
}

/// Straight-line distance between two cell centers, in kilometres.
pub fn haversine_km(a: CellId, b: CellId) -> f64 {
    let a: LatLng = a.into();
    let b: LatLng = b.into();
    haversine_km_points(a.lat(), a.lng(), b.lat(), b.lng())
}

/// Straight-line distance between two raw (lat,lng) points, in kilometres.
pub fn haversine_km_points(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let (lat1, lat2) = (lat1.to_radians(), lat2.to_radians());
    let dlat = lat2 - lat1;
    let dlng = (lng2 - lng1).to_radians();
    let h = (dlat * 0.5).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng * 0.5).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

#[cfg(test)]
#[path = "geo_tests.rs"]
mod tests;
