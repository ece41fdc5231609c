use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::expression::{CompileError, CompiledCondition};

/// How a rule picks its input and whether it can fail to match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum RuleKind {
    /// Condition is evaluated against the package's aggregate risk score.
    #[serde(rename = "overall_score")]
    Score,
    /// Condition is evaluated against one metric from the assessment bundle.
    Assessment,
    /// Always matches; the catch-all at the end of the table.
    #[serde(rename = "else")]
    Default,
    /// A persisted `rule_type` this build does not understand.
    Unrecognized(String),
}

impl RuleKind {
    pub fn as_str(&self) -> &str {
        match self {
            RuleKind::Score => "overall_score",
            RuleKind::Assessment => "assessment",
            RuleKind::Default => "else",
            RuleKind::Unrecognized(value) => value,
        }
    }

    pub fn from_str(value: &str) -> Self {
        match value {
            "overall_score" => Self::Score,
            "assessment" => Self::Assessment,
            "else" => Self::Default,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The executable form of a rule's condition text.
#[derive(Debug, Clone)]
pub enum Predicate {
    Compiled(Arc<CompiledCondition>),
    /// Compilation failed; the rule stays in the table but never matches.
    Invalid(CompileError),
    /// Default rules carry no condition.
    Always,
}

impl Predicate {
    pub fn compile_error(&self) -> Option<&CompileError> {
        match self {
            Predicate::Invalid(err) => Some(err),
            _ => None,
        }
    }
}

/// A rule row as persisted in `decision_rules`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StoredRule {
    #[ts(type = "number")]
    pub id: i64,
    #[ts(type = "number")]
    pub position: i64,
    pub kind: RuleKind,
    pub metric: Option<String>,
    pub condition: String,
    pub decision: String,
}

/// A rule to persist; position is implied by list order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewDecisionRule {
    pub kind: RuleKind,
    pub metric: Option<String>,
    pub condition: String,
    pub decision: String,
}

impl NewDecisionRule {
    pub fn score(condition: impl Into<String>, decision: impl Into<String>) -> Self {
        Self {
            kind: RuleKind::Score,
            metric: None,
            condition: condition.into(),
            decision: decision.into(),
        }
    }

    pub fn assessment(
        metric: impl Into<String>,
        condition: impl Into<String>,
        decision: impl Into<String>,
    ) -> Self {
        Self {
            kind: RuleKind::Assessment,
            metric: Some(metric.into()),
            condition: condition.into(),
            decision: decision.into(),
        }
    }

    pub fn default_rule(decision: impl Into<String>) -> Self {
        Self {
            kind: RuleKind::Default,
            metric: None,
            condition: String::new(),
            decision: decision.into(),
        }
    }
}

/// A loaded, compiled rule ready for evaluation.
#[derive(Debug, Clone)]
pub struct RuleDefinition {
    /// Display/storage key: `rule_<n>`, a category label, or `rule_else`.
    pub key: String,
    pub kind: RuleKind,
    pub target_metric: Option<String>,
    pub condition_text: String,
    pub decision: String,
    pub predicate: Predicate,
}

impl RuleDefinition {
    pub fn to_new_rule(&self) -> NewDecisionRule {
        NewDecisionRule {
            kind: self.kind.clone(),
            metric: self.target_metric.clone(),
            condition: self.condition_text.clone(),
            decision: self.decision.clone(),
        }
    }
}
