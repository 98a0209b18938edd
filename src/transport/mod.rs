// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the dispatch core.

pub mod auth;
pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the axum `Router` with every route this service exposes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        // Rider-facing query API (§2 data flow)
        .route("/api/v1/drivers/nearby", get(http::nearby_drivers))
        .route("/api/v1/rides/request", post(http::request_ride))
        .route("/api/v1/rides/{id}/cancel", post(http::cancel_ride))
        // Offer reconciliation (§4.E supplement, §6A)
        .route("/api/v1/offers/{id}", get(http::get_offer))
        // Admin / operational surface (§6A)
        .route("/api/v1/sync/trigger", post(http::trigger_sync))
        .route("/api/v1/sync/status", get(http::sync_status))
        // Bidirectional channel (§4.G)
        .route("/ws", get(ws::ws_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
