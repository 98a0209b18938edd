// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Driver Position Store (4.B): per-driver position record + cell-membership
//! sets, both TTL-bearing, plus the Active-Dirty Set bookkeeping consumed by
//! the Location Sync Worker (4.F).
//!
//! TTL is always applied in the same write as the data (never "set then
//! expire" — see SPEC_FULL.md 9A). Liveness is enforced lazily on every read;
//! `spawn_reaper` only bounds memory for drivers that stop reporting.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::geo::CellId;

/// A driver's last-known position and liveness flags.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRecord {
    pub driver_id: String,
    pub user_id: String,
    pub lng: f64,
    pub lat: f64,
    pub cell_id: CellId,
    pub last_seen_at_ms: u64,
    pub is_online: bool,
    pub is_available: bool,
    pub connection_handle: Option<String>,
}

fn epoch_ms() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

struct Entry {
    record: PositionRecord,
    expires_at: Instant,
}

#[derive(Default)]
struct Inner {
    positions: HashMap<String, Entry>,
    cells: HashMap<CellId, HashSet<String>>,
}

impl Inner {
    fn is_live(&self, driver_id: &str, now: Instant) -> bool {
        self.positions.get(driver_id).is_some_and(|e| e.expires_at > now)
    }
}

/// Active-Dirty Set bookkeeping (3.): a driver is in at most one of
/// {active, processing} except during the sync worker's merge window (I4).
#[derive(Default)]
struct DirtySet {
    active: HashSet<String>,
    processing: HashSet<String>,
}

/// In-memory implementation of the ephemeral store contract. The spec
/// describes the backend abstractly ("e.g. Redis-class"); this is the only
/// implementation shipped, but every method here is the seam a networked
/// backend would need to replicate (see DESIGN.md).
pub struct InMemoryPositionStore {
    inner: RwLock<Inner>,
    dirty: RwLock<DirtySet>,
    ttl: Duration,
}

impl InMemoryPositionStore {
    pub fn new(ttl: Duration) -> Arc<Self> {
        Arc::new(Self { inner: RwLock::new(Inner::default()), dirty: RwLock::new(DirtySet::default()), ttl })
    }

    /// `upsert(driverId, record)`: TTL applied in the same write; if the cell
    /// changed, the prior membership is removed before the new one is added.
    pub async fn upsert(&self, driver_id: &str, mut record: PositionRecord) {
        record.driver_id = driver_id.to_owned();
        record.last_seen_at_ms = epoch_ms();
        let now = Instant::now();
        let expires_at = now + self.ttl;
        let new_cell = record.cell_id;

        {
            let mut inner = self.inner.write().await;
            let prior_cell = inner.positions.get(driver_id).map(|e| e.record.cell_id);
            if let Some(prior_cell) = prior_cell {
                if prior_cell != new_cell {
                    if let Some(members) = inner.cells.get_mut(&prior_cell) {
                        members.remove(driver_id);
                        if members.is_empty() {
                            inner.cells.remove(&prior_cell);
                        }
                    }
                }
            }
            inner.cells.entry(new_cell).or_default().insert(driver_id.to_owned());
            inner.positions.insert(driver_id.to_owned(), Entry { record, expires_at });
        }

        self.mark_dirty(driver_id).await;
    }

    /// `get(driverId)` — absent if never written or TTL elapsed.
    pub async fn get(&self, driver_id: &str) -> Option<PositionRecord> {
        let inner = self.inner.read().await;
        let now = Instant::now();
        inner.positions.get(driver_id).filter(|e| e.expires_at > now).map(|e| e.record.clone())
    }

    /// `membersOfCells(cells[])` — union of live members, filtering anything
    /// whose TTL lapsed between cell-set insertion and this read.
    pub async fn members_of_cells(&self, cells: &[CellId]) -> HashSet<String> {
        let inner = self.inner.read().await;
        let now = Instant::now();
        let mut out = HashSet::new();
        for cell in cells {
            if let Some(members) = inner.cells.get(cell) {
                out.extend(members.iter().filter(|id| inner.is_live(id, now)).cloned());
            }
        }
        out
    }

    /// `setConnection(driverId, handle|null)` — also flips `is_online` to
    /// match, since attaching a handle only ever happens on a live
    /// connection: a driver who re-registers without a fresh `location:update`
    /// (coordinates are optional on `user:register`) must still count as
    /// online, not just whoever happened to upsert a position most recently.
    pub async fn set_connection(&self, driver_id: &str, handle: Option<String>) {
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.positions.get_mut(driver_id) {
            entry.record.is_online = handle.is_some();
            entry.record.connection_handle = handle;
        }
    }

    /// `clearOnDisconnect(driverId)` — handle cleared and the driver marked
    /// offline; position preserved. Without flipping `is_online` here, a
    /// driver who disconnects and never reconnects would stay "online"
    /// forever (until the TTL reaper drops the record entirely), which the
    /// Offer Manager's reachability check (§4.E precondition) relies on to
    /// exclude disconnected drivers from dispatch.
    pub async fn clear_on_disconnect(&self, driver_id: &str) {
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.positions.get_mut(driver_id) {
            entry.record.connection_handle = None;
            entry.record.is_online = false;
        }
    }

    /// Flip `isAvailable` — used by the Offer Manager on successful accept
    /// (§9 open question, resolved: accept MUST mark the driver busy).
    pub async fn set_available(&self, driver_id: &str, available: bool) {
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.positions.get_mut(driver_id) {
            entry.record.is_available = available;
        }
    }

    async fn mark_dirty(&self, driver_id: &str) {
        self.dirty.write().await.active.insert(driver_id.to_owned());
    }

    /// 4.F step 1: atomically move Active into Processing (rename-and-reset).
    /// Updates landing during steps 2-5 go to the fresh, empty Active set.
    pub(crate) async fn snapshot_dirty(&self) -> HashSet<String> {
        let mut dirty = self.dirty.write().await;
        let moved = std::mem::take(&mut dirty.active);
        dirty.processing.extend(moved.iter().cloned());
        moved
    }

    pub(crate) async fn processing_snapshot(&self) -> HashSet<String> {
        self.dirty.read().await.processing.clone()
    }

    pub(crate) async fn active_snapshot(&self) -> HashSet<String> {
        self.dirty.read().await.active.clone()
    }

    /// 4.F step 4 (all-success path).
    pub(crate) async fn clear_processing(&self) {
        self.dirty.write().await.processing.clear();
    }

    /// 4.F step 4 (failure path): move failed ids back to Active — if a newer
    /// update already landed in Active, the `insert` is a no-op and the newer
    /// value wins; otherwise it restores the only copy there is. Processing
    /// is cleared unconditionally afterward: every id that isn't in `failed`
    /// either persisted successfully or was dropped in the gather step
    /// because its record expired, and in both cases it has no further
    /// business occupying Processing (§4.F invariant: Processing is empty
    /// once merge completes).
    pub(crate) async fn merge_processing_failures(&self, failed: impl IntoIterator<Item = String>) {
        let mut dirty = self.dirty.write().await;
        for id in failed {
            dirty.active.insert(id);
        }
        dirty.processing.clear();
    }

    /// 4.F step 5: merge the entire Processing set back into Active. Used at
    /// sync-worker startup to recover from a prior run that never reached the
    /// reconcile step (the worker task was cancelled or panicked mid-run).
    pub(crate) async fn recover_processing_into_active(&self) {
        let mut dirty = self.dirty.write().await;
        let stale: Vec<String> = dirty.processing.drain().collect();
        dirty.active.extend(stale);
    }

    pub async fn active_dirty_count(&self) -> usize {
        self.dirty.read().await.active.len()
    }

    /// Periodically sweeps TTL-expired entries out of both maps.
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = timer.tick() => {}
                }
                store.reap_expired().await;
            }
        });
    }

    async fn reap_expired(&self) {
        let mut inner = self.inner.write().await;
        let now = Instant::now();
        let expired: Vec<String> = inner
            .positions
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            if let Some(entry) = inner.positions.remove(id) {
                if let Some(members) = inner.cells.get_mut(&entry.record.cell_id) {
                    members.remove(id);
                    if members.is_empty() {
                        inner.cells.remove(&entry.record.cell_id);
                    }
                }
            }
        }
        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "reaped expired position records");
        }
    }
}

#[cfg(test)]
#[path = "position_tests.rs"]
mod tests;
