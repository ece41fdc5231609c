//! Automatic decision endpoints.
//!
//! - POST /api/packages/auto-decision - Assign every undecided package
//! - POST /api/packages/{name}/auto-decision - Assign one package

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use riskboard_core::{AssignError, AssignmentView, BatchAssignmentView, packages::PackageError};

use super::ApiError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auto-decision", post(assign_undecided))
        .route("/{name}/auto-decision", post(assign_package))
}

async fn assign_package(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.assigner().assign_package(&name).await {
        Ok(assignment) => (StatusCode::OK, Json(AssignmentView::new(name, assignment))).into_response(),
        Err(AssignError::Package(PackageError::NotFound(_))) => (
            StatusCode::NOT_FOUND,
            Json(ApiError::not_found(format!("Package not found: {}", name))),
        )
            .into_response(),
        Err(e @ AssignError::UnknownDecision(_)) => {
            tracing::error!(package = %name, error = %e, "rule table references unknown decision");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ApiError::bad_request(e.to_string())),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!(package = %name, error = %e, "automatic decision failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::internal(format!(
                    "Failed to assign decision for {}: {}",
                    name, e
                ))),
            )
                .into_response()
        }
    }
}

async fn assign_undecided(State(state): State<AppState>) -> impl IntoResponse {
    match state.assigner().assign_undecided().await {
        Ok(summary) => (StatusCode::OK, Json(BatchAssignmentView::from(&summary))).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "batch automatic decision failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::internal(format!(
                    "Failed to assign decisions: {}",
                    e
                ))),
            )
                .into_response()
        }
    }
}
