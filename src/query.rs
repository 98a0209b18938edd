// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Nearby-Driver Query (4.D): expanding-ring search over the Driver Position
//! Store, filtered by status and ranked by ETA then distance.

use std::sync::Arc;

use crate::events::Coordinates;
use crate::geo::{cell_of, haversine_km_points, ring_at};
use crate::routing::{eta_or_fallback, RoutingProvider};
use crate::store::durable::DurableStore;
use crate::store::position::InMemoryPositionStore;

/// `constraints = { maxRings, minCount, onlyOnline, onlyAvailable,
/// onlyVerified, onlyUnblocked }`.
#[derive(Debug, Clone)]
pub struct QueryConstraints {
    pub max_rings: u32,
    pub min_count: usize,
    pub only_online: bool,
    pub only_available: bool,
    pub only_verified: bool,
    pub only_unblocked: bool,
}

impl Default for QueryConstraints {
    fn default() -> Self {
        Self {
            max_rings: 5,
            min_count: 1,
            only_online: true,
            only_available: true,
            only_verified: true,
            only_unblocked: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub driver_id: String,
    pub straight_line_km: f64,
    pub eta_minutes: f64,
    pub route_meters: f64,
}

#[derive(Debug, Clone)]
pub struct NearbyResult {
    pub candidates: Vec<Candidate>,
    pub search_radius: u32,
}

pub struct NearbyQuery {
    position_store: Arc<InMemoryPositionStore>,
    durable_store: Arc<dyn DurableStore>,
    routing: Option<Arc<dyn RoutingProvider>>,
    assumed_speed_kmh: u32,
}

impl NearbyQuery {
    pub fn new(
        position_store: Arc<InMemoryPositionStore>,
        durable_store: Arc<dyn DurableStore>,
        routing: Option<Arc<dyn RoutingProvider>>,
        assumed_speed_kmh: u32,
    ) -> Self {
        Self { position_store, durable_store, routing, assumed_speed_kmh }
    }

    /// `findNearby(lat,lng, constraints) -> ranked list of candidates`.
    pub async fn find_nearby(
        &self,
        lat: f64,
        lng: f64,
        constraints: &QueryConstraints,
    ) -> Result<NearbyResult, crate::error::DispatchError> {
        let center = cell_of(lat, lng).map_err(|_| crate::error::DispatchError::PreconditionFailed)?;
        let pickup: Coordinates = [lng, lat];

        // Accumulates across rings — only the ring-cell scan is incremental
        // (scanning just the new ring each iteration, not rescanning prior
        // ones); candidates already found must not be discarded (§4.D step e).
        let mut survivors = Vec::new();
        for k in 0..=constraints.max_rings {
            let ring_cells = ring_at(center, k);
            let member_ids = self.position_store.members_of_cells(&ring_cells).await;

            // Each candidate's durable-store check and routing ETA call is
            // independent of every other's, so they run concurrently (same
            // `join_all` fan-out as the sync worker's per-driver persist step)
            // instead of paying N sequential round trips.
            let evaluated = futures_util::future::join_all(member_ids.into_iter().map(|driver_id| {
                let constraints = constraints.clone();
                async move {
                    let Some(record) = self.position_store.get(&driver_id).await else {
                        // Expired between membership read and position read (P3).
                        return None;
                    };
                    if constraints.only_online && !record.is_online {
                        return None;
                    }
                    if constraints.only_available && !record.is_available {
                        return None;
                    }
                    if constraints.only_verified || constraints.only_unblocked {
                        match self.durable_store.get_driver_by_id(&driver_id).await {
                            Ok(durable) => {
                                if constraints.only_verified && !durable.is_verified {
                                    return None;
                                }
                                if constraints.only_unblocked && durable.is_blocked {
                                    return None;
                                }
                            }
                            Err(_) => return None,
                        }
                    }

                    let straight_line_km = haversine_km_points(lat, lng, record.lat, record.lng);
                    let driver_point: Coordinates = [record.lng, record.lat];
                    let routed =
                        eta_or_fallback(self.routing.as_deref(), pickup, driver_point, self.assumed_speed_kmh).await;

                    Some(Candidate {
                        driver_id,
                        straight_line_km,
                        eta_minutes: (routed.duration_sec / 60.0).round(),
                        route_meters: routed.distance_meters,
                    })
                }
            }))
            .await;
            survivors.extend(evaluated.into_iter().flatten());

            if survivors.len() >= constraints.min_count {
                survivors.sort_by(|a, b| {
                    a.eta_minutes
                        .partial_cmp(&b.eta_minutes)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(a.straight_line_km.partial_cmp(&b.straight_line_km).unwrap_or(std::cmp::Ordering::Equal))
                });
                return Ok(NearbyResult { candidates: survivors, search_radius: k });
            }
        }

        // Exhausted every ring without reaching min_count — return whatever
        // was found rather than discarding it (§4.D step e); only a literal
        // zero-candidate search is "empty".
        survivors.sort_by(|a, b| {
            a.eta_minutes
                .partial_cmp(&b.eta_minutes)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.straight_line_km.partial_cmp(&b.straight_line_km).unwrap_or(std::cmp::Ordering::Equal))
        });
        Ok(NearbyResult { candidates: survivors, search_radius: constraints.max_rings })
    }
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
