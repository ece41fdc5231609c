pub mod evaluator;
pub mod expression;
pub mod loader;
pub mod repositories;
pub mod session;
pub mod types;
pub mod validation;

pub use evaluator::{BoundedEvaluator, Budget, EvaluationFailure};
pub use expression::{CompileError, CompiledCondition, compile};
pub use loader::{RuleLoader, RuleLoaderError, compile_rules, rule_key};
pub use repositories::{DecisionRuleRepository, RuleError};
pub use session::{RemovalListener, RuleEditSession, SessionError};
pub use types::{NewDecisionRule, Predicate, RuleDefinition, RuleKind, StoredRule};
pub use validation::{ConfigIssue, validate_rule_table};
