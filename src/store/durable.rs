// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable store collaborator (§6): the long-lived driver entity store. The
//! Sync Worker uses it only for position writes; non-ephemeral mutations
//! (verification, blocking) are exposed for the parts of §6 that name them,
//! though only the position path is exercised by this service's hot path.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;
use crate::geo::CellId;

/// Position fields the Sync Worker pushes on every successful gather.
#[derive(Debug, Clone, Serialize)]
pub struct PositionUpdate {
    pub driver_id: String,
    pub lng: f64,
    pub lat: f64,
    pub cell_id: String,
    pub is_online: bool,
    pub is_available: bool,
    pub last_seen_at_ms: u64,
}

/// A durable driver record as returned by `getDriverById`/`findDriverByUser`.
#[derive(Debug, Clone, Deserialize)]
pub struct DurableDriverRecord {
    pub driver_id: String,
    pub user_id: String,
    pub name: String,
    pub is_verified: bool,
    pub is_blocked: bool,
}

/// §6 "Durable store API (abstract)": `getDriverById`, `updateDriverPosition`,
/// `findDriverByUser`, `listPendingVerifications`, `setVerified`, `setBlocked`.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get_driver_by_id(&self, driver_id: &str) -> Result<DurableDriverRecord, DispatchError>;

    async fn find_driver_by_user(&self, user_id: &str) -> Result<DurableDriverRecord, DispatchError>;

    /// Idempotent — the Sync Worker may retry the same update safely.
    async fn update_driver_position(&self, update: &PositionUpdate) -> Result<(), DispatchError>;

    async fn list_pending_verifications(&self) -> Result<Vec<DurableDriverRecord>, DispatchError>;

    async fn set_verified(&self, driver_id: &str, verified: bool) -> Result<(), DispatchError>;

    async fn set_blocked(&self, driver_id: &str, blocked: bool) -> Result<(), DispatchError>;
}

/// HTTP-backed `DurableStore` client, one instance per configured durable
/// store base URL.
pub struct HttpDurableStore {
    base_url: String,
    client: Client,
}

impl HttpDurableStore {
    pub fn new(base_url: String, timeout: std::time::Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { base_url, client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn classify(err: &reqwest::Error) -> DispatchError {
        if err.is_timeout() {
            DispatchError::Timeout
        } else if err.is_connect() {
            DispatchError::TransientStore
        } else {
            DispatchError::PermanentStore
        }
    }
}

#[async_trait]
impl DurableStore for HttpDurableStore {
    async fn get_driver_by_id(&self, driver_id: &str) -> Result<DurableDriverRecord, DispatchError> {
        let resp = self
            .client
            .get(self.url(&format!("/api/v1/drivers/{driver_id}")))
            .send()
            .await
            .map_err(|e| Self::classify(&e))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DispatchError::NotFound);
        }
        resp.error_for_status()
            .map_err(|e| Self::classify(&e))?
            .json()
            .await
            .map_err(|_| DispatchError::PermanentStore)
    }

    async fn find_driver_by_user(&self, user_id: &str) -> Result<DurableDriverRecord, DispatchError> {
        let resp = self
            .client
            .get(self.url(&format!("/api/v1/drivers/by-user/{user_id}")))
            .send()
            .await
            .map_err(|e| Self::classify(&e))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DispatchError::NotFound);
        }
        resp.error_for_status()
            .map_err(|e| Self::classify(&e))?
            .json()
            .await
            .map_err(|_| DispatchError::PermanentStore)
    }

    async fn update_driver_position(&self, update: &PositionUpdate) -> Result<(), DispatchError> {
        self.client
            .put(self.url(&format!("/api/v1/drivers/{}/position", update.driver_id)))
            .json(update)
            .send()
            .await
            .map_err(|e| Self::classify(&e))?
            .error_for_status()
            .map_err(|e| Self::classify(&e))?;
        Ok(())
    }

    async fn list_pending_verifications(&self) -> Result<Vec<DurableDriverRecord>, DispatchError> {
        self.client
            .get(self.url("/api/v1/drivers/pending-verification"))
            .send()
            .await
            .map_err(|e| Self::classify(&e))?
            .error_for_status()
            .map_err(|e| Self::classify(&e))?
            .json()
            .await
            .map_err(|_| DispatchError::PermanentStore)
    }

    async fn set_verified(&self, driver_id: &str, verified: bool) -> Result<(), DispatchError> {
        self.client
            .post(self.url(&format!("/api/v1/drivers/{driver_id}/verify")))
            .json(&serde_json::json!({ "verified": verified }))
            .send()
            .await
            .map_err(|e| Self::classify(&e))?
            .error_for_status()
            .map_err(|e| Self::classify(&e))?;
        Ok(())
    }

    async fn set_blocked(&self, driver_id: &str, blocked: bool) -> Result<(), DispatchError> {
        self.client
            .post(self.url(&format!("/api/v1/drivers/{driver_id}/block")))
            .json(&serde_json::json!({ "blocked": blocked }))
            .send()
            .await
            .map_err(|e| Self::classify(&e))?
            .error_for_status()
            .map_err(|e| Self::classify(&e))?;
        Ok(())
    }
}

/// Helper to stringify a [`CellId`] for the JSON wire format.
pub fn cell_id_to_string(cell: CellId) -> String {
    cell.to_string()
}
