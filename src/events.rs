// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client wire protocol (§6): inbound/outbound events on the bidirectional
//! channel, expressed as a closed tagged union (§9 "dynamic event map ->
//! typed variants" — unknown events are protocol violations, not ignorable
//! noise, so deserialization failure is the caller's signal to close the
//! channel rather than skip the frame).

use serde::{Deserialize, Serialize};

/// `[lng, lat]` coordinate pair, matching the wire order used throughout §6.
pub type Coordinates = [f64; 2];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Driver,
    Rider,
}

/// Inbound frames (client → server): `{event, data}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "user:register")]
    UserRegister {
        role: Role,
        #[serde(default)]
        coordinates: Option<Coordinates>,
    },
    #[serde(rename = "location:update")]
    LocationUpdate { coordinates: Coordinates },
    #[serde(rename = "ride:accept")]
    RideAccept {
        #[serde(rename = "requestId")]
        request_id: String,
    },
    #[serde(rename = "ride:reject")]
    RideReject {
        #[serde(rename = "requestId")]
        request_id: String,
    },
    /// **(SUPPLEMENT, SPEC_FULL.md 4.E)** — poll the current state of an
    /// offer the caller has a stale view of (reconnect reconciliation).
    #[serde(rename = "offer:query")]
    OfferQuery {
        #[serde(rename = "requestId")]
        request_id: String,
    },
}

/// The offer payload carried in `ride:request`, shaped for the wire (the
/// internal `Offer` type in `offer.rs` is richer; this is its public view).
#[derive(Debug, Clone, Serialize)]
pub struct OfferPayload {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub pickup: Coordinates,
    pub destination: Coordinates,
    pub fare: f64,
    pub distance: f64,
    #[serde(rename = "expiresIn")]
    pub expires_in: u64,
}

/// `GET /api/v1/offers/{id}` and `offer:status` body — a read-only snapshot,
/// no side effects (§4.E supplement `getOffer`).
#[derive(Debug, Clone, Serialize)]
pub struct OfferSnapshot {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    #[serde(rename = "recipientsRemaining")]
    pub recipients_remaining: usize,
    #[serde(rename = "expiresAt")]
    pub expires_at_ms: u64,
}

/// Outbound frames (server → client): `{event, data}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "user:registered")]
    UserRegistered {
        success: bool,
        #[serde(rename = "channelId")]
        channel_id: String,
    },
    #[serde(rename = "ride:request")]
    RideRequest(OfferPayload),
    #[serde(rename = "ride:request:cancelled")]
    RideRequestCancelled {
        #[serde(rename = "requestId")]
        request_id: String,
        reason: String,
    },
    #[serde(rename = "ride:request:expired")]
    RideRequestExpired {
        #[serde(rename = "requestId")]
        request_id: String,
    },
    /// §7 "riders see one of three terminal events... an explicit
    /// `ride:request:failed` when no reachable driver could be found".
    #[serde(rename = "ride:request:failed")]
    RideRequestFailed {
        #[serde(rename = "requestId")]
        request_id: String,
        message: String,
    },
    #[serde(rename = "ride:accepted")]
    RideAccepted {
        #[serde(rename = "requestId")]
        request_id: String,
        #[serde(rename = "driverId")]
        driver_id: String,
        #[serde(rename = "driverName")]
        driver_name: String,
        message: String,
    },
    #[serde(rename = "ride:accept:success")]
    RideAcceptSuccess {
        #[serde(rename = "requestId")]
        request_id: String,
        #[serde(rename = "rideDetails")]
        ride_details: OfferPayload,
    },
    #[serde(rename = "ride:accept:failed")]
    RideAcceptFailed {
        #[serde(rename = "requestId")]
        request_id: String,
        message: String,
    },
    /// **(SUPPLEMENT)** response to `offer:query`.
    #[serde(rename = "offer:status")]
    OfferStatus(OfferSnapshot),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_event_deserializes_tagged_union() {
        let json = serde_json::json!({
            "event": "location:update",
            "data": { "coordinates": [-122.42, 37.77] }
        });
        let parsed: ClientEvent = serde_json::from_value(json).expect("valid frame");
        match parsed {
            ClientEvent::LocationUpdate { coordinates } => {
                assert_eq!(coordinates, [-122.42, 37.77]);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_is_a_protocol_violation_not_noise() {
        let json = serde_json::json!({ "event": "not:a:real:event", "data": {} });
        assert!(serde_json::from_value::<ClientEvent>(json).is_err());
    }

    #[test]
    fn server_event_serializes_with_wire_field_names() {
        let event = ServerEvent::RideRequestCancelled {
            request_id: "offer-1".into(),
            reason: "accepted_by_other".into(),
        };
        let value = serde_json::to_value(&event).expect("serializable");
        assert_eq!(value["event"], "ride:request:cancelled");
        assert_eq!(value["data"]["requestId"], "offer-1");
    }
}
