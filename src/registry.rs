// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection Registry (4.C): tracks which identity is reachable on which
//! bidirectional channel. Last-wins on re-attachment; detach preserves
//! position data (Position Store is untouched here — callers invoke
//! `clear_on_disconnect` separately, per §4.C).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use crate::events::ServerEvent;

/// Bounded outbound queue capacity per channel before backpressure closes it
/// (§5 "Backpressure").
const CHANNEL_QUEUE_CAPACITY: usize = 256;

/// Consecutive queue-full sends before the channel is treated as a
/// disconnect (§5 "Backpressure").
const QUEUE_FULL_DISCONNECT_THRESHOLD: u32 = 3;

/// Opaque handle to a single connected channel's outbound queue.
#[derive(Clone)]
pub struct Handle {
    pub channel_id: String,
    sender: mpsc::Sender<ServerEvent>,
    consecutive_full: Arc<AtomicU32>,
}

impl Handle {
    /// Best-effort fire-and-forget delivery. Returns `false` once the queue
    /// has been full `QUEUE_FULL_DISCONNECT_THRESHOLD` times in a row, so the
    /// caller can close the channel (§5). A successful send resets the count.
    fn try_emit(&self, event: ServerEvent) -> bool {
        if self.sender.try_send(event).is_err() {
            tracing::warn!(channel_id = %self.channel_id, "outbound queue full, dropping event");
            self.consecutive_full.fetch_add(1, Ordering::Relaxed) + 1 < QUEUE_FULL_DISCONNECT_THRESHOLD
        } else {
            self.consecutive_full.store(0, Ordering::Relaxed);
            true
        }
    }

    /// Best-effort fire-and-forget delivery with no backpressure tracking —
    /// for callers that don't own the registry entry and can't evict it.
    pub fn emit(&self, event: ServerEvent) {
        let _ = self.try_emit(event);
    }
}

/// Connection Registry: one live handle per identity, last-wins.
#[derive(Default)]
pub struct ConnectionRegistry {
    handles: RwLock<HashMap<String, Handle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { handles: RwLock::new(HashMap::new()) })
    }

    /// Register a freshly-authenticated channel for `identity`, returning the
    /// receiving half of its outbound queue. Any prior handle for the same
    /// identity is silently replaced (last-wins); the caller owning the old
    /// receiver observes the channel close naturally when its sender drops.
    pub async fn attach(&self, identity: &str, channel_id: String) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_QUEUE_CAPACITY);
        let handle = Handle { channel_id, sender: tx, consecutive_full: Arc::new(AtomicU32::new(0)) };
        self.handles.write().await.insert(identity.to_owned(), handle);
        rx
    }

    /// `handleFor(identity)` — current handle, if any.
    pub async fn handle_for(&self, identity: &str) -> Option<Handle> {
        self.handles.read().await.get(identity).cloned()
    }

    /// `emit(handle, event, payload)` convenience over `handle_for` + `emit`.
    /// Evicts the handle once its queue has been full
    /// `QUEUE_FULL_DISCONNECT_THRESHOLD` times in a row, treating it as a
    /// disconnect (§5 "Backpressure") — the receiver observes this as its
    /// channel closing, same as a dropped connection.
    pub async fn emit(&self, identity: &str, event: ServerEvent) {
        let Some(handle) = self.handle_for(identity).await else { return };
        if !handle.try_emit(event) {
            tracing::warn!(identity, channel_id = %handle.channel_id, "closing channel after repeated backpressure");
            self.detach(identity, &handle.channel_id).await;
        }
    }

    /// Detach a channel. No-ops if a newer handle has already replaced it
    /// (the registry only removes the handle it was asked to remove).
    pub async fn detach(&self, identity: &str, channel_id: &str) {
        let mut handles = self.handles.write().await;
        if let Some(current) = handles.get(identity) {
            if current.channel_id == channel_id {
                handles.remove(identity);
            }
        }
    }

    pub async fn connected_count(&self) -> usize {
        self.handles.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn attach_then_handle_for_round_trips() {
        let registry = ConnectionRegistry::new();
        let _rx = registry.attach("driver-1", "chan-a".to_owned()).await;

        let handle = registry.handle_for("driver-1").await.expect("handle present");
        assert_eq!(handle.channel_id, "chan-a");
    }

    #[tokio::test]
    async fn reattach_replaces_prior_handle_last_wins() {
        let registry = ConnectionRegistry::new();
        let _rx1 = registry.attach("driver-1", "chan-a".to_owned()).await;
        let _rx2 = registry.attach("driver-1", "chan-b".to_owned()).await;

        let handle = registry.handle_for("driver-1").await.expect("handle present");
        assert_eq!(handle.channel_id, "chan-b");
    }

    #[tokio::test]
    async fn detach_with_stale_channel_id_is_noop() {
        let registry = ConnectionRegistry::new();
        let _rx1 = registry.attach("driver-1", "chan-a".to_owned()).await;
        let _rx2 = registry.attach("driver-1", "chan-b".to_owned()).await;

        // Detaching the old (replaced) channel must not evict the new one.
        registry.detach("driver-1", "chan-a").await;
        assert!(registry.handle_for("driver-1").await.is_some());

        registry.detach("driver-1", "chan-b").await;
        assert!(registry.handle_for("driver-1").await.is_none());
    }

    #[tokio::test]
    async fn emit_to_unknown_identity_is_noop() {
        let registry = ConnectionRegistry::new();
        registry.emit("ghost", ServerEvent::RideRequestExpired { request_id: "x".into() }).await;
    }

    #[tokio::test]
    async fn repeated_queue_full_closes_the_channel() {
        let registry = ConnectionRegistry::new();
        let rx = registry.attach("driver-1", "chan-a".to_owned()).await;
        // Fill the queue without draining it, then push past the threshold.
        for _ in 0..CHANNEL_QUEUE_CAPACITY + QUEUE_FULL_DISCONNECT_THRESHOLD as usize {
            registry.emit("driver-1", ServerEvent::RideRequestExpired { request_id: "x".into() }).await;
        }

        assert!(registry.handle_for("driver-1").await.is_none(), "channel must be evicted after repeated backpressure");
        drop(rx);
    }
}
