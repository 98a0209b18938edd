// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Location Sync Worker (4.F): periodic two-phase migration of position
//! updates from the ephemeral store to the durable store. Cadence and the
//! single-in-flight guard reuse this codebase's cadence-worker idiom: a
//! `tokio::time::interval` driven select loop against a `CancellationToken`,
//! snapshot the work list, then iterate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::store::durable::{cell_id_to_string, DurableStore, PositionUpdate};
use crate::store::position::InMemoryPositionStore;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SyncStatus {
    pub running: bool,
    #[serde(rename = "cadenceActive")]
    pub cadence_active: bool,
}

/// At most one run in flight; overlapping triggers (cadence tick racing a
/// manual `triggerNow`) are suppressed by a CAS on `running`, not queued.
pub struct LocationSyncWorker {
    position_store: Arc<InMemoryPositionStore>,
    durable_store: Arc<dyn DurableStore>,
    cadence: Duration,
    running: AtomicBool,
    cadence_active: AtomicBool,
}

impl LocationSyncWorker {
    pub fn new(
        position_store: Arc<InMemoryPositionStore>,
        durable_store: Arc<dyn DurableStore>,
        cadence: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            position_store,
            durable_store,
            cadence,
            running: AtomicBool::new(false),
            cadence_active: AtomicBool::new(false),
        })
    }

    /// `status() -> {running, cadenceActive}`.
    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            running: self.running.load(Ordering::Relaxed),
            cadence_active: self.cadence_active.load(Ordering::Relaxed),
        }
    }

    /// Admin-invoked `triggerNow()`: bypasses the cadence but honours the
    /// overlap guard — if a run is already in flight this returns `false`
    /// without enqueueing another. `running` doubles as the single-in-flight
    /// CAS and the status flag `run_once` reports through `status()`.
    pub async fn trigger_now(self: &Arc<Self>) -> bool {
        if self.running.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return false;
        }
        let worker = Arc::clone(self);
        tokio::spawn(async move { worker.run_once().await });
        true
    }

    /// §4.F step 5: on startup, merge any Processing-set survivors of a
    /// crashed prior run back into Active before the cadence begins.
    pub async fn recover(&self) {
        self.position_store.recover_processing_into_active().await;
    }

    pub fn spawn_cadence(self: &Arc<Self>, shutdown: CancellationToken) {
        let worker = Arc::clone(self);
        worker.cadence_active.store(true, Ordering::Relaxed);
        tokio::spawn(async move {
            worker.recover().await;
            let mut timer = tokio::time::interval(worker.cadence);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = timer.tick() => {}
                }
                let _ = worker.trigger_now().await;
            }
            worker.cadence_active.store(false, Ordering::Relaxed);
        });
    }

    async fn run_once(&self) {
        self.running.store(true, Ordering::Relaxed);

        // Step 1: snapshot. Atomic rename-and-reset (Active -> Processing).
        let dirty = self.position_store.snapshot_dirty().await;
        if dirty.is_empty() {
            self.running.store(false, Ordering::Relaxed);
            return;
        }

        // Step 2: gather. Drop entries that expired between snapshot and read.
        let mut gathered = Vec::with_capacity(dirty.len());
        for driver_id in &dirty {
            if let Some(record) = self.position_store.get(driver_id).await {
                gathered.push(record);
            }
        }

        // Step 3: persist. Independent per-driver updates, run concurrently.
        let durable = Arc::clone(&self.durable_store);
        let results = futures_util::future::join_all(gathered.into_iter().map(|record| {
            let durable = Arc::clone(&durable);
            async move {
                let update = PositionUpdate {
                    driver_id: record.driver_id.clone(),
                    lng: record.lng,
                    lat: record.lat,
                    cell_id: cell_id_to_string(record.cell_id),
                    is_online: record.is_online,
                    is_available: record.is_available,
                    last_seen_at_ms: record.last_seen_at_ms,
                };
                let driver_id = record.driver_id.clone();
                let outcome = durable.update_driver_position(&update).await;
                (driver_id, outcome)
            }
        }))
        .await;

        // Step 4: reconcile.
        let failed: Vec<String> = results
            .into_iter()
            .filter_map(|(driver_id, outcome)| match outcome {
                Ok(()) => None,
                Err(err) => {
                    tracing::warn!(driver_id = %driver_id, ?err, "durable position sync failed, merging back to active");
                    Some(driver_id)
                }
            })
            .collect();

        if failed.is_empty() {
            self.position_store.clear_processing().await;
        } else {
            self.position_store.merge_processing_failures(failed).await;
        }

        self.running.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
