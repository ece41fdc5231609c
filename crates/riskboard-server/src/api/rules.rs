//! Rule table endpoints.
//!
//! - GET /api/rules - Load the rule table in evaluation order with validation issues
//! - PUT /api/rules - Replace the whole rule table

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use riskboard_core::{
    Database, DecisionCategoryRepository, DecisionRuleRepository, RuleLoader, RuleTableView,
    api::RuleTableUpdate, decisions::AuditLogRepository, validate_rule_table,
};

use super::ApiError;
use crate::AppState;

const RULES_REPLACED_EVENT: &str = "rules_replaced";

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_rule_table).put(replace_rule_table))
}

async fn load_view(db: &Database) -> Result<RuleTableView, String> {
    let rules = RuleLoader::new(DecisionRuleRepository::new(db.clone()))
        .load_rules()
        .await
        .map_err(|e| e.to_string())?;
    let registry = DecisionCategoryRepository::new(db.clone())
        .load_registry()
        .await
        .map_err(|e| e.to_string())?;
    let issues = validate_rule_table(&rules, &registry);
    Ok(RuleTableView::new(&rules, &registry, &issues))
}

async fn get_rule_table(State(state): State<AppState>) -> impl IntoResponse {
    match load_view(&state.db).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to load rule table");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::internal(format!("Failed to load rule table: {}", e))),
            )
                .into_response()
        }
    }
}

async fn replace_rule_table(
    State(state): State<AppState>,
    Json(update): Json<RuleTableUpdate>,
) -> impl IntoResponse {
    if let Some(index) = update
        .rules
        .iter()
        .position(|rule| rule.decision.trim().is_empty())
    {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiError::bad_request(format!(
                "Rule {} has no decision",
                index + 1
            ))),
        )
            .into_response();
    }

    let repo = DecisionRuleRepository::new(state.db.clone());
    if let Err(e) = repo.replace_all(&update.rules).await {
        tracing::error!(error = %e, "failed to replace rule table");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError::internal(format!("Failed to save rule table: {}", e))),
        )
            .into_response();
    }

    let message = format!("Rule table replaced with {} rules", update.rules.len());
    if let Err(e) = AuditLogRepository::new(state.db.clone())
        .append(None, RULES_REPLACED_EVENT, &message)
        .await
    {
        tracing::warn!(error = %e, "failed to audit rule table replacement");
    }
    tracing::info!(rules = update.rules.len(), "rule table replaced");

    get_rule_table(State(state)).await.into_response()
}
