// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ingress/Egress Adapter (4.G): the bidirectional WebSocket channel.
//! Authenticates at connect time only, demultiplexes inbound frames into
//! core calls, and relays the Connection Registry's outbound queue back to
//! the socket. Per-channel processing is sequential (one in-flight frame at
//! a time) by construction — the select loop below drives a single task.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use uuid::Uuid;

use crate::events::{ClientEvent, Coordinates, Role, ServerEvent};
use crate::geo::cell_of;
use crate::state::AppState;
use crate::store::position::PositionRecord;
use crate::transport::auth;

/// Query parameters for the WS upgrade. `id` is the identity this channel
/// will be registered under (driverId or riderId); the wire protocol itself
/// carries no identity field, per §6 "identity is extracted once" at
/// connect time, not per message.
#[derive(Debug, Clone, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
    pub id: String,
}

/// `GET /ws` — WebSocket upgrade for a driver or rider channel.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if let Err(err) = auth::validate_ws_query(query.token.as_deref(), state.config.access_token_secret.as_deref()) {
        let (status, body) = err.to_http_response("unauthorized");
        return (status, body).into_response();
    }

    ws.on_upgrade(move |socket| handle_ws(socket, state, query.id)).into_response()
}

/// Per-connection handler: one Connection Registry attachment, one reader
/// loop. Exits (and detaches) on socket close, protocol violation, or
/// service shutdown.
async fn handle_ws(socket: WebSocket, state: Arc<AppState>, identity: String) {
    let channel_id = Uuid::new_v4().to_string();
    let mut inbox = state.registry.attach(&identity, channel_id.clone()).await;
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut role: Option<Role> = None;

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,

            outbound = inbox.recv() => {
                match outbound {
                    Some(event) => {
                        let Ok(text) = serde_json::to_string(&event) else { continue };
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => handle_client_event(&state, &identity, &channel_id, &mut role, event).await,
                            Err(err) => {
                                tracing::warn!(%identity, %err, "protocol violation, closing channel");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    state.registry.detach(&identity, &channel_id).await;
    if matches!(role, Some(Role::Driver)) {
        state.position_store.clear_on_disconnect(&identity).await;
    }
}

async fn handle_client_event(
    state: &Arc<AppState>,
    identity: &str,
    channel_id: &str,
    role: &mut Option<Role>,
    event: ClientEvent,
) {
    match event {
        ClientEvent::UserRegister { role: r, coordinates } => {
            *role = Some(r);
            if r == Role::Driver {
                if let Some(coordinates) = coordinates {
                    upsert_driver_position(state, identity, channel_id, coordinates).await;
                }
                state.position_store.set_connection(identity, Some(channel_id.to_owned())).await;
            }
            state
                .registry
                .emit(identity, ServerEvent::UserRegistered { success: true, channel_id: channel_id.to_owned() })
                .await;
        }
        ClientEvent::LocationUpdate { coordinates } => {
            // §6's inbound events are all driver-originated; a rider channel
            // sending this must not plant a dispatchable ghost record.
            if *role == Some(Role::Driver) {
                upsert_driver_position(state, identity, channel_id, coordinates).await;
            }
        }
        ClientEvent::RideAccept { request_id } => {
            state.offers.accept_offer(&request_id, identity).await;
        }
        ClientEvent::RideReject { request_id } => {
            state.offers.reject_offer(&request_id, identity).await;
        }
        ClientEvent::OfferQuery { request_id } => {
            if let Some(snapshot) = state.offers.get_offer(&request_id).await {
                state.registry.emit(identity, ServerEvent::OfferStatus(snapshot)).await;
            }
        }
    }
}

/// Shared by `user:register` (with initial coordinates) and `location:update`.
/// Preserves `isAvailable` across updates — a bare position refresh must
/// never undo the Offer Manager's accept-time availability flip (§4.E step 3).
/// `connection_handle` is always set to the calling channel: both call sites
/// only ever run against a live connection, so there is no stale value worth
/// preserving.
async fn upsert_driver_position(state: &Arc<AppState>, driver_id: &str, channel_id: &str, coordinates: Coordinates) {
    let Ok(cell_id) = cell_of(coordinates[1], coordinates[0]) else {
        tracing::warn!(driver_id, "rejecting location:update with invalid coordinates");
        return;
    };
    let existing = state.position_store.get(driver_id).await;
    let is_available = existing.as_ref().map_or(true, |r| r.is_available);

    let record = PositionRecord {
        driver_id: driver_id.to_owned(),
        user_id: driver_id.to_owned(),
        lng: coordinates[0],
        lat: coordinates[1],
        cell_id,
        last_seen_at_ms: 0,
        is_online: true,
        is_available,
        connection_handle: Some(channel_id.to_owned()),
    };
    state.position_store.upsert(driver_id, record).await;
}
