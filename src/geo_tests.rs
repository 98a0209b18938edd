// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn cell_of_is_deterministic() {
    let a = cell_of(40.7128, -74.0060).expect("valid coordinate");
    let b = cell_of(40.7128, -74.0060).expect("valid coordinate");
    assert_eq!(a, b);
}

#[test]
fn ring_zero_is_center_only() {
    let center = cell_of(40.7128, -74.0060).expect("valid coordinate");
    assert_eq!(ring_at(center, 0), vec![center]);
}

#[test]
fn rings_are_disjoint_and_cumulative() {
    let center = cell_of(40.7128, -74.0060).expect("valid coordinate");
    let ring0 = ring_at(center, 0);
    let ring1 = ring_at(center, 1);
    let ring2 = ring_at(center, 2);

    assert_eq!(ring0.len(), 1);
    assert_eq!(ring1.len(), 6);
    assert_eq!(ring2.len(), 12);

    for cell in &ring1 {
        assert!(!ring0.contains(cell));
    }
    for cell in &ring2 {
        assert!(!ring1.contains(cell) && !ring0.contains(cell));
    }

    let disk2 = neighbours(center, 2);
    assert_eq!(disk2.len(), ring0.len() + ring1.len() + ring2.len());
}

#[test]
fn haversine_same_point_is_zero() {
    let cell = cell_of(51.5074, -0.1278).expect("valid coordinate");
    assert!(haversine_km(cell, cell) < 0.2); // within one cell center's own jitter
}

#[test]
fn haversine_known_distance_nyc_to_london() {
    // ~5570km great-circle distance, allow generous tolerance for cell-center snapping.
    let km = haversine_km_points(40.7128, -74.0060, 51.5074, -0.1278);
    assert!((5500.0..5650.0).contains(&km), "got {km}");
}
