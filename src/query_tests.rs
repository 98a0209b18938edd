use std::time::Duration;

use async_trait::async_trait;

use super::*;
use crate::error::DispatchError;
use crate::store::durable::{DurableDriverRecord, PositionUpdate};
use crate::store::position::PositionRecord;

struct AllowAllDurableStore;

#[async_trait]
impl DurableStore for AllowAllDurableStore {
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

fn record_at(driver_id: &str, lat: f64, lng: f64) -> PositionRecord {
    PositionRecord {
        driver_id: driver_id.to_owned(),
        user_id: format!("user-{driver_id}"),
        lng,
        lat,
        cell_id: cell_of(lat, lng).expect("valid coordinates"),
        last_seen_at_ms: 0,
        is_online: true,
        is_available: true,
        connection_handle: None,
    }
}

#[tokio::test]
async fn finds_closest_driver_first_across_expanding_rings() {
    // Scenario 3: drivers at increasing distance from pickup P.
    let position_store = InMemoryPositionStore::new(Duration::from_secs(300));
    let durable_store: Arc<dyn DurableStore> = Arc::new(AllowAllDurableStore);

    let pickup_lat = 37.7749;
    let pickup_lng = -122.4194;

    // ~0.3km north, ~0.9km north, ~4km north.
    position_store.upsert("near", record_at("near", pickup_lat + 0.0027, pickup_lng)).await;
    position_store.upsert("mid", record_at("mid", pickup_lat + 0.0081, pickup_lng)).await;
    position_store.upsert("far", record_at("far", pickup_lat + 0.036, pickup_lng)).await;

    let query = NearbyQuery::new(position_store, durable_store, None, 30);
    let constraints = QueryConstraints { max_rings: 5, min_count: 1, ..Default::default() };
    let result = query.find_nearby(pickup_lat, pickup_lng, &constraints).await.expect("query succeeds");

    assert!(!result.candidates.is_empty());
    assert_eq!(result.candidates[0].driver_id, "near");
}

#[tokio::test]
async fn expired_driver_is_never_returned() {
    // P3: no dispatch to stale drivers.
    let position_store = InMemoryPositionStore::new(Duration::from_millis(10));
    let durable_store: Arc<dyn DurableStore> = Arc::new(AllowAllDurableStore);

    let lat = 37.7749;
    let lng = -122.4194;
    position_store.upsert("d1", record_at("d1", lat, lng)).await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    let query = NearbyQuery::new(position_store, durable_store, None, 30);
    let constraints = QueryConstraints::default();
    let result = query.find_nearby(lat, lng, &constraints).await.expect("query succeeds");

    assert!(result.candidates.is_empty());
    assert_eq!(result.search_radius, constraints.max_rings);
}

#[tokio::test]
async fn returns_empty_with_full_radius_when_no_ring_has_enough_candidates() {
    let position_store = InMemoryPositionStore::new(Duration::from_secs(300));
    let durable_store: Arc<dyn DurableStore> = Arc::new(AllowAllDurableStore);

    let query = NearbyQuery::new(position_store, durable_store, None, 30);
    let constraints = QueryConstraints { max_rings: 2, ..Default::default() };
    let result = query.find_nearby(37.7749, -122.4194, &constraints).await.expect("query succeeds");

    assert!(result.candidates.is_empty());
    assert_eq!(result.search_radius, 2);
}
