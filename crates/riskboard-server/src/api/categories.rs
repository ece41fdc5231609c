//! Decision category endpoints.
//!
//! - GET /api/categories - List decision categories with display colors

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use riskboard_core::{CategoryView, DecisionCategoryRepository};

use super::ApiError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_categories))
}

async fn list_categories(State(state): State<AppState>) -> impl IntoResponse {
    let repo = DecisionCategoryRepository::new(state.db.clone());

    match repo.list_all().await {
        Ok(categories) => {
            let views: Vec<CategoryView> = categories.iter().map(CategoryView::from).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to list decision categories");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::internal(format!(
                    "Failed to list decision categories: {}",
                    e
                ))),
            )
                .into_response()
        }
    }
}
