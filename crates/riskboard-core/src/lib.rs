pub mod api;
pub mod categories;
pub mod config;
pub mod constants;
pub mod db;
pub mod decisions;
pub mod migrations;
pub mod packages;
pub mod rules;
pub mod telemetry;

pub use api::{AssignmentView, BatchAssignmentView, CategoryView, RuleTableView, RuleView};
pub use categories::{
    CategoryLabels, CategoryRegistry, DecisionCategory, DecisionCategoryRepository,
    NewDecisionCategory, contrast_text_color, normalize_label,
};
pub use config::{Config, EngineConfig};
pub use db::Database;
pub use decisions::{AssignError, Assignment, BatchSummary, DecisionAssigner};
pub use migrations::run_migrations;
pub use packages::{
    AssessmentBundle, MetricSource, MetricValue, NewPackage, PackageDecisionState,
    PackageRepository,
};
pub use rules::{
    BoundedEvaluator, ConfigIssue, DecisionRuleRepository, EvaluationFailure, NewDecisionRule,
    RuleDefinition, RuleEditSession, RuleKind, RuleLoader, validate_rule_table,
};
pub use telemetry::{TelemetryError, TelemetryGuard, init_logging, init_telemetry};
