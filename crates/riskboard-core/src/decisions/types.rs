use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of one assignment attempt for a package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Decision the package holds afterwards, if any.
    pub decision: Option<String>,
    /// `Rule <n>` when this call made the decision; `None` when the package
    /// was already decided or nothing matched.
    pub matched_rule: Option<String>,
}

impl Assignment {
    pub fn undecided() -> Self {
        Self::default()
    }

    pub fn existing(decision: Option<String>) -> Self {
        Self {
            decision,
            matched_rule: None,
        }
    }

    pub fn matched(decision: impl Into<String>, position: usize) -> Self {
        Self {
            decision: Some(decision.into()),
            matched_rule: Some(rule_label(position)),
        }
    }

    pub fn was_assigned(&self) -> bool {
        self.matched_rule.is_some()
    }
}

/// Display name of the rule at 1-based `position`.
pub fn rule_label(position: usize) -> String {
    format!("Rule {position}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub package_name: String,
    pub user_name: String,
    pub user_role: String,
    pub comment: String,
    pub comment_type: String,
    pub added_on: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewComment {
    pub package_name: String,
    pub user_name: String,
    pub user_role: String,
    pub comment: String,
    pub comment_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: String,
    pub package_name: Option<String>,
    pub event: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Everything written when the engine decides a package.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoDecision {
    pub package_name: String,
    pub decision_id: i64,
    pub comment: String,
    pub audit_message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoDecisionOutcome {
    Recorded,
    /// Someone decided the package first; nothing was written.
    AlreadyDecided,
}
