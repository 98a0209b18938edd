// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the dispatch core's HTTP surface (§6A, §2's rider
//! "query API"). Uses `axum_test::TestServer` — no real TCP needed.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use tokio_util::sync::CancellationToken;

use dispatch_core::config::AppConfig;
use dispatch_core::error::DispatchError;
use dispatch_core::geo::cell_of;
use dispatch_core::offer::OfferManager;
use dispatch_core::query::NearbyQuery;
use dispatch_core::registry::ConnectionRegistry;
use dispatch_core::routing::RoutingProvider;
use dispatch_core::state::AppState;
use dispatch_core::store::durable::{DurableDriverRecord, DurableStore, PositionUpdate};
use dispatch_core::store::position::{InMemoryPositionStore, PositionRecord};
use dispatch_core::sync::LocationSyncWorker;
use dispatch_core::transport::build_router;

struct FakeDurableStore;

#[async_trait]
impl DurableStore for FakeDurableStore {
    async fn get_driver_by_id(&self, driver_id: &str) -> Result<DurableDriverRecord, DispatchError> {
        Ok(DurableDriverRecord {
            driver_id: driver_id.to_owned(),
            user_id: format!("user-{driver_id}"),
            name: format!("Driver {driver_id}"),
            is_verified: true,
            is_blocked: false,
        })
    }

    async fn find_driver_by_user(&self, user_id: &str) -> Result<DurableDriverRecord, DispatchError> {
        self.get_driver_by_id(user_id).await
    }

    async fn update_driver_position(&self, _update: &PositionUpdate) -> Result<(), DispatchError> {
        Ok(())
    }

    async fn list_pending_verifications(&self) -> Result<Vec<DurableDriverRecord>, DispatchError> {
        Ok(Vec::new())
    }

    async fn set_verified(&self, _driver_id: &str, _verified: bool) -> Result<(), DispatchError> {
        Ok(())
    }

    async fn set_blocked(&self, _driver_id: &str, _blocked: bool) -> Result<(), DispatchError> {
        Ok(())
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
        access_token_secret: None,
        refresh_token_secret: None,
        position_ttl_seconds: 300,
        offer_ttl_seconds: 15,
        sync_cadence_ms: 300_000,
        max_rings: 5,
        routing_timeout_ms: 5000,
        store_timeout_ms: 2000,
        assumed_speed_kmh: 30,
        durable_store_dsn: None,
        ephemeral_store_dsn: None,
        routing_url: None,
    }
}

/// Builds `AppState` directly (bypassing `AppState::new`, which wires a real
/// `HttpDurableStore`) so tests run entirely in-process against a fake
/// durable-store collaborator.
fn test_state(config: AppConfig) -> Arc<AppState> {
    let registry = ConnectionRegistry::new();
    let position_store = InMemoryPositionStore::new(config.position_ttl());
    let durable_store: Arc<dyn DurableStore> = Arc::new(FakeDurableStore);
    let routing: Option<Arc<dyn RoutingProvider>> = None;

    let nearby_query = NearbyQuery::new(
        Arc::clone(&position_store),
        Arc::clone(&durable_store),
        routing.clone(),
        config.assumed_speed_kmh,
    );
    let offers = OfferManager::new(Arc::clone(&registry), Arc::clone(&position_store), config.offer_ttl());
    let sync_worker =
        LocationSyncWorker::new(Arc::clone(&position_store), Arc::clone(&durable_store), config.sync_cadence());

    Arc::new(AppState {
        config,
        registry,
        position_store,
        durable_store,
        routing,
        nearby_query: Arc::new(nearby_query),
        offers,
        sync_worker,
        shutdown: CancellationToken::new(),
    })
}

fn test_server(state: Arc<AppState>) -> TestServer {
    TestServer::new(build_router(state)).expect("failed to create test server")
}

async fn seed_driver(store: &InMemoryPositionStore, driver_id: &str, lat: f64, lng: f64) {
    let cell = cell_of(lat, lng).expect("valid coordinates");
    store
        .upsert(
            driver_id,
            PositionRecord {
                driver_id: driver_id.to_owned(),
                user_id: format!("user-{driver_id}"),
                lng,
                lat,
                cell_id: cell,
                last_seen_at_ms: 0,
                is_online: true,
                is_available: true,
                connection_handle: None,
            },
        )
        .await;
}

#[tokio::test]
async fn health_reports_connected_channels_and_sync_status() {
    let state = test_state(test_config());
    let _rx = state.registry.attach("driver-1", "chan-1".to_owned()).await;
    let server = test_server(state);

    let resp = server.get("/api/v1/health").await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connectedChannels"], 1);
    assert_eq!(body["syncWorker"]["running"], false);
}

#[tokio::test]
async fn nearby_drivers_returns_closest_candidate() {
    // Scenario 3, exercised over HTTP.
    let state = test_state(test_config());
    let lat = 37.7749;
    let lng = -122.4194;
    seed_driver(&state.position_store, "near", lat + 0.0027, lng).await;
    seed_driver(&state.position_store, "far", lat + 0.036, lng).await;

    let server = test_server(state);
    let resp = server.get(&format!("/api/v1/drivers/nearby?lat={lat}&lng={lng}")).await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    let candidates = body["candidates"].as_array().expect("candidates array");
    assert!(!candidates.is_empty());
    assert_eq!(candidates[0]["driverId"], "near");
}

#[tokio::test]
async fn request_ride_with_no_reachable_driver_returns_precondition_failed() {
    let state = test_state(test_config());
    let server = test_server(state);

    let resp = server
        .post("/api/v1/rides/request")
        .json(&serde_json::json!({
            "riderId": "rider-1",
            "pickup": [-122.4194, 37.7749],
            "destination": [-122.5, 37.8],
            "fare": 12.5,
            "distance": 3.1,
        }))
        .await;

    resp.assert_status(StatusCode::PRECONDITION_FAILED);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "precondition_failed");
}

#[tokio::test]
async fn request_ride_opens_offer_and_cancel_then_rejects_wrong_rider() {
    let state = test_state(test_config());
    let lat = 37.7749;
    let lng = -122.4194;
    seed_driver(&state.position_store, "d1", lat, lng).await;

    let server = test_server(Arc::clone(&state));
    let resp = server
        .post("/api/v1/rides/request")
        .json(&serde_json::json!({
            "riderId": "rider-1",
            "pickup": [lng, lat],
            "destination": [-122.5, 37.8],
            "fare": 12.5,
            "distance": 3.1,
        }))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    let request_id = body["requestId"].as_str().expect("requestId present").to_owned();

    // Wrong rider cannot cancel.
    let wrong = server
        .post(&format!("/api/v1/rides/{request_id}/cancel"))
        .json(&serde_json::json!({ "riderId": "someone-else" }))
        .await;
    wrong.assert_status(StatusCode::CONFLICT);

    // Owning rider can.
    let ok = server
        .post(&format!("/api/v1/rides/{request_id}/cancel"))
        .json(&serde_json::json!({ "riderId": "rider-1" }))
        .await;
    ok.assert_status(StatusCode::NO_CONTENT);

    let offer_resp = server.get(&format!("/api/v1/offers/{request_id}")).await;
    offer_resp.assert_status_ok();
    let snapshot: serde_json::Value = offer_resp.json();
    assert_eq!(snapshot["state"], "EXPIRED");
}

#[tokio::test]
async fn get_offer_unknown_id_returns_404() {
    let state = test_state(test_config());
    let server = test_server(state);
    let resp = server.get("/api/v1/offers/does-not-exist").await;
    resp.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_unknown_offer_id_returns_404_not_conflict() {
    let state = test_state(test_config());
    let server = test_server(state);
    let resp = server
        .post("/api/v1/rides/does-not-exist/cancel")
        .json(&serde_json::json!({ "riderId": "rider-1" }))
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sync_trigger_then_status_reflects_idle_state() {
    let state = test_state(test_config());
    let server = test_server(state);

    let trigger = server.post("/api/v1/sync/trigger").await;
    trigger.assert_status(StatusCode::ACCEPTED);

    let status = server.get("/api/v1/sync/status").await;
    status.assert_status_ok();
    let body: serde_json::Value = status.json();
    assert_eq!(body["cadenceActive"], false);
}

#[tokio::test]
async fn bearer_auth_rejects_missing_or_wrong_token_but_not_health() {
    let mut config = test_config();
    config.access_token_secret = Some("secret-token".to_owned());
    let state = test_state(config);
    let server = test_server(state);

    // Health is exempt.
    server.get("/api/v1/health").await.assert_status_ok();

    // No header at all.
    let missing = server.get("/api/v1/drivers/nearby?lat=0&lng=0").await;
    missing.assert_status(StatusCode::UNAUTHORIZED);

    // Wrong token.
    let wrong = server
        .get("/api/v1/drivers/nearby?lat=0&lng=0")
        .add_header(axum::http::header::AUTHORIZATION, "Bearer wrong-token")
        .await;
    wrong.assert_status(StatusCode::UNAUTHORIZED);

    // Correct token.
    let ok = server
        .get("/api/v1/drivers/nearby?lat=0&lng=0")
        .add_header(axum::http::header::AUTHORIZATION, "Bearer secret-token")
        .await;
    ok.assert_status_ok();
}
