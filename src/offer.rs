// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Offer Manager (4.E) — the dispatch core. First-accept-wins offer
//! lifecycle: creation, fan-out, arbitration, expiry.
//!
//! The accept CAS (§4.E step 2, I3) is the single most load-bearing
//! primitive in the whole service: a `tokio::sync::RwLock` write-guard on
//! one offer gives exactly one caller a window in which it observes
//! `state == Open` and can flip it — every other concurrent caller either
//! blocks until that write completes (then observes the already-flipped
//! state) or queues behind it. No teacher module in this codebase's
//! lineage needed an "exactly one writer wins" primitive; this is the one
//! piece of the transformation with no direct idiom to imitate.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::events::{Coordinates, OfferPayload, OfferSnapshot, ServerEvent};
use crate::registry::ConnectionRegistry;
use crate::store::position::InMemoryPositionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferState {
    Open,
    Accepted,
    Expired,
}

impl OfferState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Accepted => "ACCEPTED",
            Self::Expired => "EXPIRED",
        }
    }
}

struct Offer {
    offer_id: String,
    rider_id: String,
    pickup: Coordinates,
    destination: Coordinates,
    fare: f64,
    distance: f64,
    expires_at_ms: u64,
    recipients: HashSet<String>,
    winner: Option<String>,
    state: OfferState,
}

impl Offer {
    fn to_payload(&self, offer_ttl_secs_remaining: u64) -> OfferPayload {
        OfferPayload {
            request_id: self.offer_id.clone(),
            pickup: self.pickup,
            destination: self.destination,
            fare: self.fare,
            distance: self.distance,
            expires_in: offer_ttl_secs_remaining,
        }
    }

    fn to_snapshot(&self) -> OfferSnapshot {
        OfferSnapshot {
            request_id: self.offer_id.clone(),
            state: self.state.as_str().to_owned(),
            winner: self.winner.clone(),
            recipients_remaining: self.recipients.len(),
            expires_at_ms: self.expires_at_ms,
        }
    }
}

/// Reason strings used on the wire; kept as constants so the expiry
/// sweeper, `reject`, and `cancel` paths cannot drift from each other.
mod reason {
    pub const TAKEN: &str = "taken";
    pub const EXPIRED_OR_GONE: &str = "expired_or_gone";
    pub const ACCEPTED_BY_OTHER: &str = "accepted_by_other";
    pub const RIDER_CANCELLED: &str = "rider_cancelled";
}

/// How long a terminal (`ACCEPTED`/`EXPIRED`) offer stays queryable via
/// `getOffer`/`offer:query` before the sweeper prunes it from memory.
const TERMINAL_OFFER_RETENTION_MS: u64 = 5 * 60 * 1000;

pub enum AcceptOutcome {
    Success,
    Failed { reason: &'static str },
}

fn epoch_ms() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

pub struct OfferManager {
    offers: RwLock<std::collections::HashMap<String, Arc<RwLock<Offer>>>>,
    registry: Arc<ConnectionRegistry>,
    position_store: Arc<InMemoryPositionStore>,
    offer_ttl: Duration,
    /// Monotonically-increasing counter purely for diagnostics; not part of
    /// correctness (offer ids are UUIDs).
    created_count: AtomicU64,
}

impl OfferManager {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        position_store: Arc<InMemoryPositionStore>,
        offer_ttl: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            offers: RwLock::new(std::collections::HashMap::new()),
            registry,
            position_store,
            offer_ttl,
            created_count: AtomicU64::new(0),
        })
    }

    /// `openOffer(riderId, pickup, destination, recipients[], fare, distance)
    /// -> offerId`. Returns `None` (and emits `ride:request:failed` to the
    /// rider directly, same as the "no candidates at all" case in the HTTP
    /// handler) if every candidate turns out unreachable on re-check — no
    /// offer is created, so the rider isn't left waiting out a 15s TTL for a
    /// dispatch that was never going to reach anyone.
    pub async fn open_offer(
        &self,
        rider_id: &str,
        pickup: Coordinates,
        destination: Coordinates,
        recipients: Vec<String>,
        fare: f64,
        distance: f64,
    ) -> Option<String> {
        let offer_id = Uuid::new_v4().to_string();
        let expires_at_ms = epoch_ms() + self.offer_ttl.as_millis() as u64;

        // §4.E precondition: recipients must be online, available, and
        // reachable at the moment the offer is created — the caller's list
        // (typically straight from the Nearby Query) may be stale by the
        // time it reaches here, so re-check against the Position Store.
        let mut reachable = Vec::with_capacity(recipients.len());
        for driver_id in recipients {
            if let Some(record) = self.position_store.get(&driver_id).await {
                if record.is_online && record.is_available {
                    reachable.push(driver_id);
                }
            }
        }

        if reachable.is_empty() {
            self.registry
                .emit(
                    rider_id,
                    ServerEvent::RideRequestFailed {
                        request_id: offer_id,
                        message: "no reachable driver found".to_owned(),
                    },
                )
                .await;
            return None;
        }

        let offer = Offer {
            offer_id: offer_id.clone(),
            rider_id: rider_id.to_owned(),
            pickup,
            destination,
            fare,
            distance,
            expires_at_ms,
            recipients: reachable.iter().cloned().collect(),
            winner: None,
            state: OfferState::Open,
        };

        let payload = offer.to_payload(self.offer_ttl.as_secs());
        let handle = Arc::new(RwLock::new(offer));
        self.offers.write().await.insert(offer_id.clone(), Arc::clone(&handle));
        self.created_count.fetch_add(1, Ordering::Relaxed);

        for driver_id in &reachable {
            self.registry.emit(driver_id, ServerEvent::RideRequest(payload.clone())).await;
        }

        Some(offer_id)
    }

    async fn lookup(&self, offer_id: &str) -> Option<Arc<RwLock<Offer>>> {
        self.offers.read().await.get(offer_id).cloned()
    }

    /// `acceptOffer(offerId, driverId)` — §4.E steps 1-4. The §7
    /// retry-once-then-`system_unavailable` rule for `transient_store`
    /// failures has no path to take here: every call this makes is
    /// in-memory and infallible (see DESIGN.md's Open Question decisions).
    pub async fn accept_offer(&self, offer_id: &str, driver_id: &str) -> AcceptOutcome {
        let Some(handle) = self.lookup(offer_id).await else {
            self.registry
                .emit(
                    driver_id,
                    ServerEvent::RideAcceptFailed {
                        request_id: offer_id.to_owned(),
                        message: reason::EXPIRED_OR_GONE.to_owned(),
                    },
                )
                .await;
            return AcceptOutcome::Failed { reason: reason::EXPIRED_OR_GONE };
        };

        // Step 2: the CAS. Whoever's write-guard observes `Open` AND is still
        // a recipient wins; everyone else's guard is acquired only after the
        // state already flipped (or they were never/no-longer a recipient —
        // rejected or not dispatched this offer in the first place), so they
        // observe a non-winning state and lose (I2, I3).
        let result = {
            let mut offer = handle.write().await;
            match offer.state {
                // Retained-terminal offers (the sweeper keeps them around for
                // `getOffer`) must read as "gone", not "taken by someone
                // else" — no other driver actually won an expired offer.
                OfferState::Expired => Err(reason::EXPIRED_OR_GONE),
                OfferState::Accepted => Err(reason::TAKEN),
                OfferState::Open if !offer.recipients.contains(driver_id) => Err(reason::TAKEN),
                OfferState::Open => {
                    offer.state = OfferState::Accepted;
                    offer.winner = Some(driver_id.to_owned());
                    Ok(clone_for_notify(&offer))
                }
            }
        };

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(reason) => {
                self.registry
                    .emit(
                        driver_id,
                        ServerEvent::RideAcceptFailed { request_id: offer_id.to_owned(), message: reason.to_owned() },
                    )
                    .await;
                return AcceptOutcome::Failed { reason };
            }
        };

        // Step 3: notification side effects. A delivery failure here is
        // logged, never rolled back — state takes precedence (§4.E).
        self.position_store.set_available(driver_id, false).await;

        let driver_name = format!("Driver {driver_id}");
        self.registry
            .emit(
                &snapshot.rider_id,
                ServerEvent::RideAccepted {
                    request_id: offer_id.to_owned(),
                    driver_id: driver_id.to_owned(),
                    driver_name: driver_name.clone(),
                    message: "your ride has been accepted".to_owned(),
                },
            )
            .await;

        self.registry
            .emit(
                driver_id,
                ServerEvent::RideAcceptSuccess {
                    request_id: offer_id.to_owned(),
                    ride_details: snapshot.payload,
                },
            )
            .await;

        for loser in snapshot.recipients.iter().filter(|id| *id != driver_id) {
            self.registry
                .emit(
                    loser,
                    ServerEvent::RideRequestCancelled {
                        request_id: offer_id.to_owned(),
                        reason: reason::ACCEPTED_BY_OTHER.to_owned(),
                    },
                )
                .await;
        }

        AcceptOutcome::Success
    }

    /// `rejectOffer(offerId, driverId)` — removes the driver from recipients,
    /// does not affect `state`. Rejection by the last recipient does not
    /// early-expire the offer.
    pub async fn reject_offer(&self, offer_id: &str, driver_id: &str) {
        if let Some(handle) = self.lookup(offer_id).await {
            handle.write().await.recipients.remove(driver_id);
        }
    }

    /// `cancelOffer(offerId, byRider)` — only the originating rider may
    /// cancel while `state == OPEN`.
    pub async fn cancel_offer(&self, offer_id: &str, by_rider: &str) -> bool {
        let Some(handle) = self.lookup(offer_id).await else { return false };

        let recipients = {
            let mut offer = handle.write().await;
            if offer.rider_id != by_rider || offer.state != OfferState::Open {
                return false;
            }
            offer.state = OfferState::Expired;
            offer.recipients.clone()
        };

        for driver_id in &recipients {
            self.registry
                .emit(
                    driver_id,
                    ServerEvent::RideRequestCancelled {
                        request_id: offer_id.to_owned(),
                        reason: reason::RIDER_CANCELLED.to_owned(),
                    },
                )
                .await;
        }
        true
    }

    /// `getOffer(offerId) -> OfferSnapshot` (§4.E supplement).
    pub async fn get_offer(&self, offer_id: &str) -> Option<OfferSnapshot> {
        let handle = self.lookup(offer_id).await?;
        Some(handle.read().await.to_snapshot())
    }

    /// Sweeps all still-`OPEN` offers whose `expiresAt` has passed and
    /// transitions them to `EXPIRED`, notifying the rider exactly once
    /// (§4.E expiry, P2). Runs on a short fixed cadence rather than a
    /// per-offer timer, matching this codebase's cadence-worker idiom
    /// (same `interval` + `CancellationToken` select loop as the position
    /// store's TTL reaper and the sync worker) instead of spawning one task
    /// per offer.
    pub fn spawn_expiry_sweeper(self: &Arc<Self>, shutdown: CancellationToken) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(Duration::from_millis(250));
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = timer.tick() => {}
                }
                manager.sweep_expired().await;
            }
        });
    }

    async fn sweep_expired(&self) {
        let now = epoch_ms();
        let handles: Vec<(String, Arc<RwLock<Offer>>)> =
            self.offers.read().await.iter().map(|(id, h)| (id.clone(), Arc::clone(h))).collect();

        let mut to_remove = Vec::new();
        for (offer_id, handle) in handles {
            let notify = {
                let mut offer = handle.write().await;
                if offer.state == OfferState::Open && offer.expires_at_ms <= now {
                    offer.state = OfferState::Expired;
                    Some(offer.rider_id.clone())
                } else {
                    None
                }
            };
            if let Some(rider_id) = notify {
                self.registry
                    .emit(&rider_id, ServerEvent::RideRequestExpired { request_id: offer_id.clone() })
                    .await;
            }

            // Terminal offers are retained for a grace window (so a
            // reconnecting rider can still `getOffer`/`offer:query` them),
            // then pruned so `self.offers` doesn't grow without bound.
            let offer = handle.read().await;
            if offer.state != OfferState::Open && now.saturating_sub(offer.expires_at_ms) > TERMINAL_OFFER_RETENTION_MS
            {
                to_remove.push(offer_id.clone());
            }
        }

        if !to_remove.is_empty() {
            let mut offers = self.offers.write().await;
            for offer_id in to_remove {
                offers.remove(&offer_id);
            }
        }
    }
}

struct NotifySnapshot {
    rider_id: String,
    recipients: HashSet<String>,
    payload: OfferPayload,
}

fn clone_for_notify(offer: &Offer) -> NotifySnapshot {
    NotifySnapshot {
        rider_id: offer.rider_id.clone(),
        recipients: offer.recipients.clone(),
        payload: offer.to_payload(0),
    }
}

#[cfg(test)]
#[path = "offer_tests.rs"]
mod tests;
