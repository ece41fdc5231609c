use std::{env, net::SocketAddr};

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use riskboard_core::{
    Config, Database, DecisionAssigner, DecisionCategoryRepository, DecisionRuleRepository,
    EngineConfig, RuleLoader, init_telemetry, run_migrations, validate_rule_table,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod api;

#[derive(Clone)]
pub(crate) struct AppState {
    db: Database,
    engine: EngineConfig,
}

impl AppState {
    pub(crate) fn assigner(&self) -> DecisionAssigner {
        DecisionAssigner::new(self.db.clone(), &self.engine)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let config = Config::load(&config_path)?;

    let _guard = init_telemetry(&config.app, &config.telemetry)?;

    let db = Database::new(&config.paths.database).await?;
    run_migrations(&db).await?;

    check_rule_table(&db).await?;

    let state = AppState {
        db: db.clone(),
        engine: config.engine.clone(),
    };

    if config.engine.auto_assign_on_startup {
        match state.assigner().assign_undecided().await {
            Ok(summary) => info!(
                examined = summary.examined,
                assigned = summary.assigned,
                failed = summary.failures.len(),
                "startup auto-decision pass finished"
            ),
            Err(err) => error!(error = %err, "startup auto-decision pass failed"),
        }
    }

    let shutdown = CancellationToken::new();
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.app.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Riskboard listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    Ok(())
}

/// Load the rule table once and report configuration problems. Rules that
/// fail to compile are kept and never match, so only storage errors abort.
async fn check_rule_table(db: &Database) -> Result<(), Box<dyn std::error::Error>> {
    let rules = RuleLoader::new(DecisionRuleRepository::new(db.clone()))
        .load_rules()
        .await?;
    let registry = DecisionCategoryRepository::new(db.clone())
        .load_registry()
        .await?;

    for issue in validate_rule_table(&rules, &registry) {
        if issue.is_error() {
            error!(issue = %issue, "rule table configuration error");
        } else {
            warn!(issue = %issue, "rule table configuration warning");
        }
    }
    info!(
        rules = rules.len(),
        categories = registry.categories().len(),
        "rule table loaded"
    );
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api", api::router())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    database: String,
}

async fn healthz(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let db_status = match state.db.health_check().await {
        Ok(_) => "ok",
        Err(_) => "unhealthy",
    };

    let status = if db_status == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if db_status == "ok" {
                "healthy".to_string()
            } else {
                "unhealthy".to_string()
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: db_status.to_string(),
        }),
    )
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("received ctrl+c, shutting down");
        }
        _ = terminate => {
            warn!("received terminate signal, shutting down");
        }
        _ = shutdown.cancelled() => {}
    }

    shutdown.cancel();
}
