// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP surface: the rider-facing "query API" (§2 data flow — search and
//! dispatch are invoked over HTTP, not the bidirectional channel; only
//! drivers speak the WS wire protocol per §6), plus the admin/operational
//! surface (§6A).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;
use crate::events::{Coordinates, OfferSnapshot, ServerEvent};
use crate::query::QueryConstraints;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(rename = "connectedChannels")]
    pub connected_channels: usize,
    #[serde(rename = "syncWorker")]
    pub sync_worker: crate::sync::SyncStatus,
}

/// `GET /api/v1/health` — liveness + a cheap summary, no external-dependency
/// checks (§4A).
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        connected_channels: state.registry.connected_count().await,
        sync_worker: state.sync_worker.status(),
    })
}

#[derive(Debug, Deserialize)]
pub struct NearbyQueryParams {
    pub lat: f64,
    pub lng: f64,
    #[serde(rename = "maxRings")]
    pub max_rings: Option<u32>,
    #[serde(rename = "minCount")]
    pub min_count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct NearbyResponseBody {
    pub candidates: Vec<NearbyCandidateBody>,
    #[serde(rename = "searchRadius")]
    pub search_radius: u32,
}

#[derive(Debug, Serialize)]
pub struct NearbyCandidateBody {
    #[serde(rename = "driverId")]
    pub driver_id: String,
    #[serde(rename = "straightLineKm")]
    pub straight_line_km: f64,
    #[serde(rename = "etaMinutes")]
    pub eta_minutes: f64,
    #[serde(rename = "routeMeters")]
    pub route_meters: f64,
}

/// `GET /api/v1/drivers/nearby` — rider search requests (§2 "enter via the
/// query API, call D"). Read-only, no offer is created.
pub async fn nearby_drivers(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NearbyQueryParams>,
) -> Result<Json<NearbyResponseBody>, (StatusCode, Json<crate::error::ErrorResponse>)> {
    let mut constraints = QueryConstraints { max_rings: state.config.max_rings, ..Default::default() };
    if let Some(max_rings) = params.max_rings {
        constraints.max_rings = max_rings;
    }
    if let Some(min_count) = params.min_count {
        constraints.min_count = min_count;
    }

    let result = state
        .nearby_query
        .find_nearby(params.lat, params.lng, &constraints)
        .await
        .map_err(|err| err.to_http_response("nearby query failed"))?;

    Ok(Json(NearbyResponseBody {
        candidates: result
            .candidates
            .into_iter()
            .map(|c| NearbyCandidateBody {
                driver_id: c.driver_id,
                straight_line_km: c.straight_line_km,
                eta_minutes: c.eta_minutes,
                route_meters: c.route_meters,
            })
            .collect(),
        search_radius: result.search_radius,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RideRequestBody {
    #[serde(rename = "riderId")]
    pub rider_id: String,
    pub pickup: Coordinates,
    pub destination: Coordinates,
    pub fare: f64,
    pub distance: f64,
}

#[derive(Debug, Serialize)]
pub struct RideRequestResponseBody {
    #[serde(rename = "requestId")]
    pub request_id: String,
}

/// `POST /api/v1/rides/request` — rider ride requests (§2 "invoke E, which
/// selects drivers via D, fans out through C"). On no reachable driver, the
/// rider's live channel (if any) receives the terminal `ride:request:failed`
/// event per §7, and this call reports the same outcome synchronously.
pub async fn request_ride(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RideRequestBody>,
) -> Result<Json<RideRequestResponseBody>, (StatusCode, Json<crate::error::ErrorResponse>)> {
    let constraints = QueryConstraints { max_rings: state.config.max_rings, ..Default::default() };
    let lat = body.pickup[1];
    let lng = body.pickup[0];

    let result = state
        .nearby_query
        .find_nearby(lat, lng, &constraints)
        .await
        .map_err(|err| err.to_http_response("nearby query failed"))?;

    if result.candidates.is_empty() {
        state
            .registry
            .emit(
                &body.rider_id,
                ServerEvent::RideRequestFailed {
                    request_id: String::new(),
                    message: "no reachable driver found".to_owned(),
                },
            )
            .await;
        let err = DispatchError::PreconditionFailed;
        return Err(err.to_http_response("no reachable driver found"));
    }

    let recipients: Vec<String> = result.candidates.into_iter().map(|c| c.driver_id).collect();
    let request_id = state
        .offers
        .open_offer(&body.rider_id, body.pickup, body.destination, recipients, body.fare, body.distance)
        .await;

    match request_id {
        Some(request_id) => Ok(Json(RideRequestResponseBody { request_id })),
        None => {
            let err = DispatchError::PreconditionFailed;
            Err(err.to_http_response("no reachable driver found"))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CancelRideBody {
    #[serde(rename = "riderId")]
    pub rider_id: String,
}

/// `POST /api/v1/rides/{id}/cancel` — `cancelOffer` (§4.E); no wire event
/// carries rider-initiated cancellation, so it is HTTP-only.
pub async fn cancel_ride(
    State(state): State<Arc<AppState>>,
    Path(offer_id): Path<String>,
    Json(body): Json<CancelRideBody>,
) -> impl IntoResponse {
    if state.offers.get_offer(&offer_id).await.is_none() {
        return StatusCode::NOT_FOUND;
    }
    if state.offers.cancel_offer(&offer_id, &body.rider_id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::CONFLICT
    }
}

/// `GET /api/v1/offers/{id}` — `getOffer` (§4.E supplement, §6A).
pub async fn get_offer(
    State(state): State<Arc<AppState>>,
    Path(offer_id): Path<String>,
) -> Result<Json<OfferSnapshot>, (StatusCode, Json<crate::error::ErrorResponse>)> {
    state
        .offers
        .get_offer(&offer_id)
        .await
        .map(Json)
        .ok_or_else(|| DispatchError::NotFound.to_http_response("offer not found"))
}

/// `POST /api/v1/sync/trigger` — admin `triggerNow()` (§6A, §4.F).
pub async fn trigger_sync(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let accepted = state.sync_worker.trigger_now().await;
    if accepted {
        StatusCode::ACCEPTED
    } else {
        StatusCode::CONFLICT
    }
}

/// `GET /api/v1/sync/status` — admin `status()` (§6A, §4.F).
pub async fn sync_status(State(state): State<Arc<AppState>>) -> Json<crate::sync::SyncStatus> {
    Json(state.sync_worker.status())
}
