// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared application state (§9 "cycle-free construction"): the Geospatial
//! Cell Codec has no dependencies, the Position Store depends on nothing but
//! its own TTL, the Nearby Query depends on the Position Store, the Durable
//! Store and (optionally) the Routing Collaborator, the Offer Manager
//! depends on the Connection Registry and the Position Store, and the Sync
//! Worker depends on the Position Store and the Durable Store. No component
//! holds a handle back to `AppState` itself.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::offer::OfferManager;
use crate::query::NearbyQuery;
use crate::registry::ConnectionRegistry;
use crate::routing::{HttpRoutingProvider, RoutingProvider};
use crate::store::durable::{DurableStore, HttpDurableStore};
use crate::store::position::InMemoryPositionStore;
use crate::sync::LocationSyncWorker;

/// Cadence for the Position Store's TTL reaper. Fixed rather than
/// configurable: it only bounds memory for drivers that stopped reporting,
/// it does not affect read-path correctness (liveness is always re-checked
/// lazily on every read, per `store::position`).
const REAPER_INTERVAL: Duration = Duration::from_secs(30);

/// Everything a request handler or WS session needs, assembled once at
/// startup and shared behind `Arc<AppState>`.
pub struct AppState {
    pub config: AppConfig,
    pub registry: Arc<ConnectionRegistry>,
    pub position_store: Arc<InMemoryPositionStore>,
    pub durable_store: Arc<dyn DurableStore>,
    pub routing: Option<Arc<dyn RoutingProvider>>,
    pub nearby_query: Arc<NearbyQuery>,
    pub offers: Arc<OfferManager>,
    pub sync_worker: Arc<LocationSyncWorker>,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: AppConfig, shutdown: CancellationToken) -> Self {
        let registry = ConnectionRegistry::new();
        let position_store = InMemoryPositionStore::new(config.position_ttl());
        let durable_store: Arc<dyn DurableStore> = Arc::new(HttpDurableStore::new(
            config.durable_store_dsn.clone().unwrap_or_default(),
            config.store_timeout(),
        ));
        let routing: Option<Arc<dyn RoutingProvider>> = config
            .routing_url
            .clone()
            .map(|url| Arc::new(HttpRoutingProvider::new(url, config.routing_timeout())) as Arc<dyn RoutingProvider>);

        let nearby_query = NearbyQuery::new(
            Arc::clone(&position_store),
            Arc::clone(&durable_store),
            routing.clone(),
            config.assumed_speed_kmh,
        );
        let offers = OfferManager::new(Arc::clone(&registry), Arc::clone(&position_store), config.offer_ttl());
        let sync_worker =
            LocationSyncWorker::new(Arc::clone(&position_store), Arc::clone(&durable_store), config.sync_cadence());

        Self {
            config,
            registry,
            position_store,
            durable_store,
            routing,
            nearby_query: Arc::new(nearby_query),
            offers,
            sync_worker,
            shutdown,
        }
    }

    /// Spawn every background worker this service owns. Callers must invoke
    /// this exactly once per process, after routes are wired but before
    /// serving traffic.
    pub fn spawn_background_workers(&self) {
        self.position_store.spawn_reaper(REAPER_INTERVAL, self.shutdown.clone());
        self.offers.spawn_expiry_sweeper(self.shutdown.clone());
        self.sync_worker.spawn_cadence(self.shutdown.clone());
    }
}
