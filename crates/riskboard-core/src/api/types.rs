//! API types for the web UI.
//!
//! Views flatten engine types into what the rule editor and the decision
//! badges render, with category colors already resolved.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::categories::{CategoryLabels, CategoryRegistry, DecisionCategory, contrast_text_color};
use crate::decisions::{Assignment, BatchSummary};
use crate::rules::{ConfigIssue, NewDecisionRule, RuleDefinition, RuleKind};

/// One row of the rule editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RuleView {
    /// 1-based evaluation position.
    pub position: usize,
    pub key: String,
    pub kind: RuleKind,
    pub metric: Option<String>,
    pub condition: String,
    pub decision: String,
    /// Set when the condition does not compile; the rule never matches.
    pub compile_error: Option<String>,
    pub decision_color: Option<String>,
    pub text_color: Option<String>,
}

impl RuleView {
    pub fn from_definition(
        position: usize,
        rule: &RuleDefinition,
        registry: &CategoryRegistry,
    ) -> Self {
        Self {
            position,
            key: rule.key.clone(),
            kind: rule.kind.clone(),
            metric: rule.target_metric.clone(),
            condition: rule.condition_text.clone(),
            decision: rule.decision.clone(),
            compile_error: rule.predicate.compile_error().map(ToString::to_string),
            decision_color: registry.color_for(&rule.decision).map(str::to_string),
            text_color: registry
                .text_color_for(&rule.decision)
                .and_then(Result::ok)
                .map(str::to_string),
        }
    }
}

/// The rule table as the editor loads it, with startup-style validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RuleTableView {
    pub rules: Vec<RuleView>,
    pub issues: Vec<String>,
}

impl RuleTableView {
    /// Keys that collide (two score rules for one decision) fall back to
    /// `rule_<n>`, matching [`crate::rules::RuleEditSession::from_rules`].
    pub fn new(rules: &[RuleDefinition], registry: &CategoryRegistry, issues: &[ConfigIssue]) -> Self {
        let mut seen = HashSet::new();
        let rules = rules
            .iter()
            .enumerate()
            .map(|(index, rule)| {
                let mut view = RuleView::from_definition(index + 1, rule, registry);
                if !seen.insert(view.key.clone()) {
                    view.key = format!("rule_{}", index + 1);
                    seen.insert(view.key.clone());
                }
                view
            })
            .collect();
        Self {
            rules,
            issues: issues.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Body of a rule table replacement, in evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RuleTableUpdate {
    pub rules: Vec<NewDecisionRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CategoryView {
    #[ts(type = "number")]
    pub id: i64,
    pub name: String,
    pub color: String,
    /// `None` when the stored color is not a valid hex triplet.
    pub text_color: Option<String>,
    pub lower_limit: Option<f64>,
    pub upper_limit: Option<f64>,
    pub labels: CategoryLabels,
}

impl From<&DecisionCategory> for CategoryView {
    fn from(category: &DecisionCategory) -> Self {
        Self {
            id: category.id,
            name: category.name.clone(),
            color: category.color.clone(),
            text_color: contrast_text_color(&category.color)
                .ok()
                .map(str::to_string),
            lower_limit: category.lower_limit,
            upper_limit: category.upper_limit,
            labels: CategoryLabels::for_name(&category.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AssignmentView {
    pub package: String,
    pub decision: Option<String>,
    pub matched_rule: Option<String>,
    /// True when this request made the decision.
    pub assigned: bool,
}

impl AssignmentView {
    pub fn new(package: impl Into<String>, assignment: Assignment) -> Self {
        Self {
            package: package.into(),
            assigned: assignment.was_assigned(),
            decision: assignment.decision,
            matched_rule: assignment.matched_rule,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AssignmentFailureView {
    pub package: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BatchAssignmentView {
    pub examined: usize,
    pub assigned: usize,
    pub failures: Vec<AssignmentFailureView>,
}

impl From<&BatchSummary> for BatchAssignmentView {
    fn from(summary: &BatchSummary) -> Self {
        Self {
            examined: summary.examined,
            assigned: summary.assigned,
            failures: summary
                .failures
                .iter()
                .map(|(package, err)| AssignmentFailureView {
                    package: package.clone(),
                    error: err.to_string(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{RuleEditSession, compile_rules};

    fn registry() -> CategoryRegistry {
        CategoryRegistry::new(vec![DecisionCategory {
            id: 1,
            name: "Reject".into(),
            color: "#B80000".into(),
            lower_limit: Some(0.8),
            upper_limit: Some(1.01),
        }])
    }

    #[test]
    fn rule_view_resolves_colors_and_errors() {
        let rules = compile_rules(vec![
            NewDecisionRule::score(">0.8", "Reject"),
            NewDecisionRule::score("> >", "Unknown"),
        ]);
        let table = RuleTableView::new(&rules, &registry(), &[]);

        assert_eq!(table.rules[0].position, 1);
        assert_eq!(table.rules[0].key, "cat_reject");
        assert_eq!(table.rules[0].decision_color.as_deref(), Some("#B80000"));
        assert_eq!(table.rules[0].text_color.as_deref(), Some("#ffffff"));
        assert!(table.rules[0].compile_error.is_none());

        assert!(table.rules[1].compile_error.is_some());
        assert!(table.rules[1].decision_color.is_none());
    }

    #[test]
    fn duplicate_score_rule_keys_fall_back_to_position() {
        let rules = compile_rules(vec![
            NewDecisionRule::score("> 0.9", "Reject"),
            NewDecisionRule::score("> 0.8", "Reject"),
            NewDecisionRule::default_rule("Reject"),
        ]);
        let table = RuleTableView::new(&rules, &registry(), &[]);
        let keys: Vec<_> = table.rules.iter().map(|rule| rule.key.as_str()).collect();
        assert_eq!(keys, vec!["cat_reject", "rule_2", "rule_else"]);

        let session = RuleEditSession::from_rules(&rules);
        let session_keys: Vec<_> = session.keys().iter().map(String::as_str).collect();
        assert_eq!(session_keys, keys);
    }

    #[test]
    fn category_view_carries_labels() {
        let view = CategoryView::from(&registry().categories()[0]);
        assert_eq!(view.labels.input, "cat_reject");
        assert_eq!(view.text_color.as_deref(), Some("#ffffff"));
    }

    #[test]
    fn assignment_view_flags_new_decisions() {
        let view = AssignmentView::new("dplyr", Assignment::matched("Reject", 2));
        assert!(view.assigned);
        assert_eq!(view.matched_rule.as_deref(), Some("Rule 2"));

        let view = AssignmentView::new("dplyr", Assignment::existing(Some("Reject".into())));
        assert!(!view.assigned);
    }
}
