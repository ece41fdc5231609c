use thiserror::Error;

use crate::categories::CategoryRegistry;

use super::expression::CompileError;
use super::types::{RuleDefinition, RuleKind};

/// A problem found in the rule table at startup. Positions are 1-based.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigIssue {
    #[error("no decision categories are configured")]
    EmptyRegistry,
    #[error("rule {position} assigns unknown decision '{decision}'")]
    UnknownDecision { position: usize, decision: String },
    #[error("default rule at position {position} is not the last rule")]
    DefaultRuleNotLast { position: usize },
    #[error("extra default rule at position {position}")]
    DuplicateDefaultRule { position: usize },
    #[error("assessment rule {position} names no metric")]
    MissingMetric { position: usize },
    #[error("rule {position} condition does not compile: {error}")]
    InvalidCondition {
        position: usize,
        error: CompileError,
    },
    #[error("rule {position} has unrecognised type '{kind}'")]
    UnrecognizedKind { position: usize, kind: String },
    #[error("score ranges of '{first}' and '{second}' overlap")]
    OverlappingRanges { first: String, second: String },
}

impl ConfigIssue {
    /// Errors make the configuration unusable; everything else only degrades
    /// individual rules.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            ConfigIssue::EmptyRegistry | ConfigIssue::UnknownDecision { .. }
        )
    }
}

pub fn validate_rule_table(
    rules: &[RuleDefinition],
    registry: &CategoryRegistry,
) -> Vec<ConfigIssue> {
    let mut issues = Vec::new();

    if registry.is_empty() && !rules.is_empty() {
        issues.push(ConfigIssue::EmptyRegistry);
    }

    let mut seen_default = false;
    for (index, rule) in rules.iter().enumerate() {
        let position = index + 1;

        if !registry.is_empty() && registry.get(&rule.decision).is_none() {
            issues.push(ConfigIssue::UnknownDecision {
                position,
                decision: rule.decision.clone(),
            });
        }

        match &rule.kind {
            RuleKind::Default => {
                if seen_default {
                    issues.push(ConfigIssue::DuplicateDefaultRule { position });
                } else if position != rules.len() {
                    issues.push(ConfigIssue::DefaultRuleNotLast { position });
                }
                seen_default = true;
            }
            RuleKind::Assessment if rule.target_metric.as_deref().is_none_or(str::is_empty) => {
                issues.push(ConfigIssue::MissingMetric { position });
            }
            RuleKind::Unrecognized(kind) => {
                issues.push(ConfigIssue::UnrecognizedKind {
                    position,
                    kind: kind.clone(),
                });
            }
            _ => {}
        }

        if let Some(error) = rule.predicate.compile_error() {
            issues.push(ConfigIssue::InvalidCondition {
                position,
                error: error.clone(),
            });
        }
    }

    issues.extend(
        registry
            .overlapping_ranges()
            .into_iter()
            .map(|(first, second)| ConfigIssue::OverlappingRanges { first, second }),
    );

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::DecisionCategory;
    use crate::rules::loader::compile_rules;
    use crate::rules::types::NewDecisionRule;

    fn category(id: i64, name: &str, range: Option<(f64, f64)>) -> DecisionCategory {
        DecisionCategory {
            id,
            name: name.into(),
            color: "#06B756".into(),
            lower_limit: range.map(|(lower, _)| lower),
            upper_limit: range.map(|(_, upper)| upper),
        }
    }

    fn registry() -> CategoryRegistry {
        CategoryRegistry::new(vec![
            category(1, "Approve", Some((0.0, 0.5))),
            category(2, "Reject", Some((0.5, 1.0))),
            category(3, "Review", None),
        ])
    }

    #[test]
    fn well_formed_table_has_no_issues() {
        let rules = compile_rules(vec![
            NewDecisionRule::score(">0.8", "Reject"),
            NewDecisionRule::assessment("license_ok", "== FALSE", "Review"),
            NewDecisionRule::default_rule("Approve"),
        ]);
        assert!(validate_rule_table(&rules, &registry()).is_empty());
    }

    #[test]
    fn unknown_decision_is_an_error() {
        let rules = compile_rules(vec![NewDecisionRule::score(">0.8", "Banned")]);
        let issues = validate_rule_table(&rules, &registry());
        assert_eq!(
            issues,
            vec![ConfigIssue::UnknownDecision {
                position: 1,
                decision: "Banned".into()
            }]
        );
        assert!(issues[0].is_error());
    }

    #[test]
    fn misplaced_and_duplicate_default_rules() {
        let rules = compile_rules(vec![
            NewDecisionRule::default_rule("Approve"),
            NewDecisionRule::score(">0.8", "Reject"),
            NewDecisionRule::default_rule("Review"),
        ]);
        let issues = validate_rule_table(&rules, &registry());
        assert_eq!(
            issues,
            vec![
                ConfigIssue::DefaultRuleNotLast { position: 1 },
                ConfigIssue::DuplicateDefaultRule { position: 3 },
            ]
        );
        assert!(issues.iter().all(|issue| !issue.is_error()));
    }

    #[test]
    fn rule_level_problems_are_reported() {
        let mut no_metric = NewDecisionRule::assessment("", "== FALSE", "Review");
        no_metric.metric = None;
        let mut unknown_kind = NewDecisionRule::score("> 1", "Review");
        unknown_kind.kind = RuleKind::Unrecognized("maintenance".into());

        let rules = compile_rules(vec![
            no_metric,
            unknown_kind,
            NewDecisionRule::score("x >", "Reject"),
        ]);
        let issues = validate_rule_table(&rules, &registry());

        assert!(issues.contains(&ConfigIssue::MissingMetric { position: 1 }));
        assert!(issues.contains(&ConfigIssue::UnrecognizedKind {
            position: 2,
            kind: "maintenance".into()
        }));
        assert!(
            issues
                .iter()
                .any(|issue| matches!(issue, ConfigIssue::InvalidCondition { position: 3, .. }))
        );
    }

    #[test]
    fn overlapping_ranges_are_warnings() {
        let registry = CategoryRegistry::new(vec![
            category(1, "Approve", Some((0.0, 0.6))),
            category(2, "Reject", Some((0.5, 1.0))),
        ]);
        let issues = validate_rule_table(&[], &registry);
        assert_eq!(
            issues,
            vec![ConfigIssue::OverlappingRanges {
                first: "Approve".into(),
                second: "Reject".into()
            }]
        );
        assert!(!issues[0].is_error());
    }

    #[test]
    fn empty_registry_is_an_error() {
        let rules = compile_rules(vec![NewDecisionRule::default_rule("Approve")]);
        let issues = validate_rule_table(&rules, &CategoryRegistry::new(Vec::new()));
        assert_eq!(issues, vec![ConfigIssue::EmptyRegistry]);
    }
}
