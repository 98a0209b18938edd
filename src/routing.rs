// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Routing Collaborator (§6): `route(fromLngLat, toLngLat) -> {durationSec,
//! distanceMeters}`, best-effort. Failure is permitted and expected — the
//! Nearby-Driver Query treats it as fallback, not an error (§7).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;
use crate::events::Coordinates;
use crate::geo::haversine_km_points;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteResult {
    pub duration_sec: f64,
    pub distance_meters: f64,
}

#[async_trait]
pub trait RoutingProvider: Send + Sync {
    async fn route(&self, from: Coordinates, to: Coordinates) -> Result<RouteResult, DispatchError>;
}

#[derive(Debug, Serialize)]
struct RouteRequestBody {
    from: Coordinates,
    to: Coordinates,
}

#[derive(Debug, Deserialize)]
struct RouteResponseBody {
    #[serde(rename = "durationSec")]
    duration_sec: f64,
    #[serde(rename = "distanceMeters")]
    distance_meters: f64,
}

/// HTTP-backed routing provider for a configured routing collaborator.
pub struct HttpRoutingProvider {
    base_url: String,
    client: Client,
}

impl HttpRoutingProvider {
    pub fn new(base_url: String, timeout: std::time::Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { base_url, client }
    }
}

#[async_trait]
impl RoutingProvider for HttpRoutingProvider {
    async fn route(&self, from: Coordinates, to: Coordinates) -> Result<RouteResult, DispatchError> {
        let resp = self
            .client
            .post(format!("{}/route", self.base_url))
            .json(&RouteRequestBody { from, to })
            .send()
            .await
            .map_err(|e| if e.is_timeout() { DispatchError::Timeout } else { DispatchError::RoutingUnavailable })?;

        let body: RouteResponseBody = resp
            .error_for_status()
            .map_err(|_| DispatchError::RoutingUnavailable)?
            .json()
            .await
            .map_err(|_| DispatchError::RoutingUnavailable)?;

        Ok(RouteResult { duration_sec: body.duration_sec, distance_meters: body.distance_meters })
    }
}

/// Straight-line fallback used when no routing collaborator is configured,
/// or when the configured one fails (§4.D step d): `etaMinutes =
/// round(straightLineKm / assumedSpeedKmh * 60)`.
pub fn haversine_fallback(from: Coordinates, to: Coordinates, assumed_speed_kmh: u32) -> RouteResult {
    let km = haversine_km_points(from[1], from[0], to[1], to[0]);
    let hours = km / assumed_speed_kmh.max(1) as f64;
    RouteResult { duration_sec: (hours * 3600.0).round(), distance_meters: km * 1000.0 }
}

/// Resolve an ETA/distance pair, preferring the routing collaborator and
/// falling back to haversine on any failure. Never returns an error: a
/// failed routing call is a fallback, not a propagated error (§7).
pub async fn eta_or_fallback(
    provider: Option<&dyn RoutingProvider>,
    from: Coordinates,
    to: Coordinates,
    assumed_speed_kmh: u32,
) -> RouteResult {
    if let Some(provider) = provider {
        match provider.route(from, to).await {
            Ok(result) => return result,
            Err(err) => {
                tracing::warn!(?err, "routing collaborator unavailable, falling back to haversine");
            }
        }
    }
    haversine_fallback(from, to, assumed_speed_kmh)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fallback_used_when_no_provider_configured() {
        let from = [-122.4194, 37.7749];
        let to = [-122.4194, 37.7749];
        let result = eta_or_fallback(None, from, to, 30).await;
        assert_eq!(result.distance_meters, 0.0);
        assert_eq!(result.duration_sec, 0.0);
    }

    #[test]
    fn haversine_fallback_assumes_configured_speed() {
        // ~1 degree of longitude at the equator is ~111km.
        let from = [0.0, 0.0];
        let to = [1.0, 0.0];
        let result = haversine_fallback(from, to, 60);
        let expected_hours = result.distance_meters / 1000.0 / 60.0;
        assert!((result.duration_sec - expected_hours * 3600.0).abs() < 1e-6);
    }
}
