// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the dispatch core, one field per documented config key.
#[derive(Debug, Clone, clap::Args)]
pub struct AppConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "DISPATCH_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8080, env = "DISPATCH_PORT")]
    pub port: u16,

    /// Bearer token for channel/API auth. If unset, auth is disabled (dev only).
    #[arg(long, env = "DISPATCH_AUTH_TOKEN")]
    pub access_token_secret: Option<String>,

    /// Secret used to validate refresh tokens issued by the external auth collaborator.
    #[arg(long, env = "DISPATCH_REFRESH_SECRET")]
    pub refresh_token_secret: Option<String>,

    /// Position record TTL, in seconds.
    #[arg(long, default_value_t = 300, env = "DISPATCH_POSITION_TTL_SECONDS")]
    pub position_ttl_seconds: u64,

    /// Offer TTL, in seconds.
    #[arg(long, default_value_t = 15, env = "DISPATCH_OFFER_TTL_SECONDS")]
    pub offer_ttl_seconds: u64,

    /// Location sync cadence, in milliseconds.
    #[arg(long, default_value_t = 300_000, env = "DISPATCH_SYNC_CADENCE_MS")]
    pub sync_cadence_ms: u64,

    /// Max expanding-ring radius for nearby-driver queries.
    #[arg(long, default_value_t = 5, env = "DISPATCH_MAX_RINGS")]
    pub max_rings: u32,

    /// Per-call timeout for the routing collaborator, in milliseconds.
    #[arg(long, default_value_t = 5000, env = "DISPATCH_ROUTING_TIMEOUT_MS")]
    pub routing_timeout_ms: u64,

    /// Per-call timeout for ephemeral/durable store calls, in milliseconds.
    #[arg(long, default_value_t = 2000, env = "DISPATCH_STORE_TIMEOUT_MS")]
    pub store_timeout_ms: u64,

    /// Assumed average speed for the ETA fallback, in km/h.
    #[arg(long, default_value_t = 30, env = "DISPATCH_ASSUMED_SPEED_KMH")]
    pub assumed_speed_kmh: u32,

    /// Base URL of the durable store's HTTP API.
    #[arg(long, env = "DISPATCH_DURABLE_STORE_DSN")]
    pub durable_store_dsn: Option<String>,

    /// Base URL of the ephemeral store, if a networked backend is configured.
    /// Unused by the default in-memory `PositionStore` (see `store::position`).
    #[arg(long, env = "DISPATCH_EPHEMERAL_STORE_DSN")]
    pub ephemeral_store_dsn: Option<String>,

    /// Base URL of the routing provider's HTTP API.
    #[arg(long, env = "DISPATCH_ROUTING_URL")]
    pub routing_url: Option<String>,
}

impl AppConfig {
    pub fn position_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.position_ttl_seconds)
    }

    pub fn offer_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.offer_ttl_seconds)
    }

    pub fn sync_cadence(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.sync_cadence_ms)
    }

    pub fn routing_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.routing_timeout_ms)
    }

    pub fn store_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.store_timeout_ms)
    }
}
