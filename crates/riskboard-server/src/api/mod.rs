//! HTTP API handlers for the Riskboard web UI.
//!
//! - Rule table loading and replacement
//! - Decision categories
//! - Automatic decision assignment

pub mod categories;
pub mod packages;
pub mod rules;

use axum::Router;
use serde::Serialize;

use crate::AppState;

/// Create the main API router with all endpoints mounted.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/rules", rules::router())
        .nest("/categories", categories::router())
        .nest("/packages", packages::router())
}

/// Error response for API errors.
#[derive(Debug, Serialize)]
pub(crate) struct ApiError {
    pub error: String,
    pub message: String,
}

impl ApiError {
    fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self::new("bad_request", message)
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}
