// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

/// Error kinds for the dispatch core, per the documented error handling
/// design: auth, lookup, conflict, precondition, and the store/routing
/// failure categories that drive fallback vs. propagation decisions upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchError {
    AuthFailed,
    NotFound,
    Conflict,
    PreconditionFailed,
    TransientStore,
    PermanentStore,
    RoutingUnavailable,
    Timeout,
}

impl DispatchError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::AuthFailed => 401,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::PreconditionFailed => 412,
            Self::TransientStore => 503,
            Self::PermanentStore => 500,
            Self::RoutingUnavailable => 502,
            Self::Timeout => 504,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthFailed => "auth_failed",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::PreconditionFailed => "precondition_failed",
            Self::TransientStore => "transient_store",
            Self::PermanentStore => "permanent_store",
            Self::RoutingUnavailable => "routing_unavailable",
            Self::Timeout => "timeout",
        }
    }

    /// Whether the caller should retry the operation as-is; purely transient
    /// store/network failures are, persistent ones are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStore | Self::Timeout)
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for DispatchError {}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds_match_propagation_rules() {
        assert!(DispatchError::TransientStore.is_retryable());
        assert!(DispatchError::Timeout.is_retryable());
        assert!(!DispatchError::PermanentStore.is_retryable());
        assert!(!DispatchError::Conflict.is_retryable());
    }

    #[test]
    fn status_codes_match_documented_kinds() {
        assert_eq!(DispatchError::AuthFailed.http_status(), 401);
        assert_eq!(DispatchError::NotFound.http_status(), 404);
        assert_eq!(DispatchError::Conflict.http_status(), 409);
        assert_eq!(DispatchError::RoutingUnavailable.http_status(), 502);
    }
}
