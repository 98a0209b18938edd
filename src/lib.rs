// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch-core: the real-time driver-dispatch core of a ride-hailing
//! backend (§1) — spatial driver index, two-phase location sync, and a
//! first-accept-wins offer state machine over bidirectional channels.

pub mod config;
pub mod error;
pub mod events;
pub mod geo;
pub mod offer;
pub mod query;
pub mod registry;
pub mod routing;
pub mod state;
pub mod store;
pub mod sync;
pub mod transport;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::state::AppState;
use crate::transport::build_router;

/// Run the dispatch core until shutdown. `anyhow::Result` is used only at
/// this outermost boundary for error context during startup (§4A); library
/// code below returns `Result<T, DispatchError>`.
pub async fn run(config: AppConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);

    let state = std::sync::Arc::new(AppState::new(config, shutdown.clone()));
    state.spawn_background_workers();

    tracing::info!(%addr, "dispatch-core listening");
    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
