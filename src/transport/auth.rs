// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer-token auth (§6 "connection-time credential"): identity is
//! extracted once, at connect time, and never revalidated per message.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::DispatchError;
use crate::state::AppState;

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Validate a Bearer token from HTTP headers. `None` for `expected` disables
/// auth entirely (dev only).
pub fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), DispatchError> {
    let Some(expected) = expected else { return Ok(()) };

    let header = headers.get("authorization").and_then(|v| v.to_str().ok()).ok_or(DispatchError::AuthFailed)?;
    let token = header.strip_prefix("Bearer ").ok_or(DispatchError::AuthFailed)?;
    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(DispatchError::AuthFailed)
    }
}

/// Validate the `token` query parameter carried on a WebSocket upgrade
/// (`?token=...`), since the upgrade request cannot carry a bearer header.
/// Takes the already-decoded value straight from the `Query` extractor
/// rather than a raw query string, so a token containing `&` or `=` is
/// compared byte-for-byte instead of being re-split.
pub fn validate_ws_query(token: Option<&str>, expected: Option<&str>) -> Result<(), DispatchError> {
    let Some(expected) = expected else { return Ok(()) };
    let Some(token) = token else { return Err(DispatchError::AuthFailed) };

    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(DispatchError::AuthFailed)
    }
}

/// Axum middleware enforcing bearer auth on every HTTP route except health
/// and the WS upgrade (which authenticates via query string instead).
pub async fn auth_layer(state: State<Arc<AppState>>, req: Request<axum::body::Body>, next: Next) -> Response {
    let path = req.uri().path();
    if path == "/api/v1/health" || path.starts_with("/ws") {
        return next.run(req).await;
    }

    if let Err(err) = validate_bearer(req.headers(), state.config.access_token_secret.as_deref()) {
        let (status, body) = err.to_http_response("unauthorized");
        return (status, body).into_response();
    }

    next.run(req).await
}
