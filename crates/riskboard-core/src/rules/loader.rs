use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::categories::normalize_label;
use crate::constants::DEFAULT_RULE_KEY;

use super::expression::compile;
use super::repositories::{DecisionRuleRepository, RuleError};
use super::types::{NewDecisionRule, Predicate, RuleDefinition, RuleKind, StoredRule};

#[derive(Debug, Error)]
pub enum RuleLoaderError {
    #[error("failed to load rules: {0}")]
    Repository(#[from] RuleError),
}

#[derive(Clone)]
pub struct RuleLoader {
    repo: DecisionRuleRepository,
}

impl RuleLoader {
    pub fn new(repo: DecisionRuleRepository) -> Self {
        Self { repo }
    }

    /// Read the rule table in evaluation order and compile every rule.
    pub async fn load_rules(&self) -> Result<Vec<RuleDefinition>, RuleLoaderError> {
        let rows = self.repo.list_all().await?;
        Ok(compile_rules(rows))
    }
}

impl From<StoredRule> for NewDecisionRule {
    fn from(rule: StoredRule) -> Self {
        Self {
            kind: rule.kind,
            metric: rule.metric,
            condition: rule.condition,
            decision: rule.decision,
        }
    }
}

/// Compile rules that are already in evaluation order. A condition that does
/// not compile leaves its rule in place with an inert predicate.
pub fn compile_rules<I, R>(rows: I) -> Vec<RuleDefinition>
where
    I: IntoIterator<Item = R>,
    R: Into<NewDecisionRule>,
{
    rows.into_iter()
        .enumerate()
        .map(|(index, rule)| compile_rule(index + 1, rule.into()))
        .collect()
}

/// Storage key for the rule at 1-based `position`.
pub fn rule_key(position: usize, kind: &RuleKind, decision: &str) -> String {
    match kind {
        RuleKind::Score => normalize_label(decision),
        RuleKind::Default => DEFAULT_RULE_KEY.to_string(),
        RuleKind::Assessment | RuleKind::Unrecognized(_) => format!("rule_{position}"),
    }
}

pub(crate) fn compile_rule(position: usize, rule: NewDecisionRule) -> RuleDefinition {
    let predicate = match rule.kind {
        RuleKind::Default => Predicate::Always,
        _ => match compile(&rule.condition) {
            Ok(condition) => Predicate::Compiled(Arc::new(condition)),
            Err(err) => {
                warn!(
                    position,
                    kind = %rule.kind,
                    condition = %rule.condition,
                    error = %err,
                    "rule condition does not compile; rule will never match"
                );
                Predicate::Invalid(err)
            }
        },
    };

    RuleDefinition {
        key: rule_key(position, &rule.kind, &rule.decision),
        kind: rule.kind,
        target_metric: rule.metric,
        condition_text: rule.condition,
        decision: rule.decision,
        predicate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::migrations::run_migrations;
    use crate::rules::expression::CompileError;
    use tempfile::TempDir;

    #[test]
    fn keys_follow_rule_kind() {
        let rules = compile_rules(vec![
            NewDecisionRule::assessment("has_vignettes", "== FALSE", "High Risk"),
            NewDecisionRule::score("> 0.8", "High Risk"),
            NewDecisionRule::assessment("license_ok", "== FALSE", "Review"),
            NewDecisionRule::default_rule("Low Risk"),
        ]);

        let keys: Vec<_> = rules.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["rule_1", "cat_high_risk", "rule_3", "rule_else"]);
    }

    #[test]
    fn compile_failure_keeps_rule_inert() {
        let rules = compile_rules(vec![
            NewDecisionRule::score("> > 1", "High Risk"),
            NewDecisionRule::default_rule("Low Risk"),
        ]);

        assert_eq!(rules.len(), 2);
        assert!(matches!(
            rules[0].predicate.compile_error(),
            Some(CompileError::UnexpectedToken { .. })
        ));
        assert_eq!(rules[0].condition_text, "> > 1");
        assert!(matches!(rules[1].predicate, Predicate::Always));
    }

    #[test]
    fn default_rule_ignores_condition_text() {
        let mut rule = NewDecisionRule::default_rule("Approve");
        rule.condition = "not even a condition (".into();
        let rules = compile_rules([rule]);
        assert!(matches!(rules[0].predicate, Predicate::Always));
    }

    #[test]
    fn definitions_round_trip_to_new_rules() {
        let original = NewDecisionRule::assessment("license_ok", "== FALSE", "Review");
        let rules = compile_rules([original.clone()]);
        assert_eq!(rules[0].to_new_rule(), original);
    }

    #[tokio::test]
    async fn load_rules_reads_persisted_order() {
        let dir = TempDir::new().expect("temp dir");
        let db = Database::new(&dir.path().join("db.sqlite"))
            .await
            .expect("create db");
        run_migrations(&db).await.expect("migrations");

        let repo = DecisionRuleRepository::new(db);
        repo.replace_all(&[
            NewDecisionRule::score(">0.8", "Reject"),
            NewDecisionRule::assessment("license_ok", "== FALSE", "Review"),
            NewDecisionRule::default_rule("Approve"),
        ])
        .await
        .expect("seed rules");

        let rules = RuleLoader::new(repo).load_rules().await.expect("load");
        let kinds: Vec<_> = rules.iter().map(|r| r.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![RuleKind::Score, RuleKind::Assessment, RuleKind::Default]
        );
        assert_eq!(rules[0].key, "cat_reject");
        assert_eq!(rules[1].key, "rule_2");
        assert_eq!(rules[1].target_metric.as_deref(), Some("license_ok"));
        assert!(rules.iter().all(|r| r.predicate.compile_error().is_none()));
    }
}
