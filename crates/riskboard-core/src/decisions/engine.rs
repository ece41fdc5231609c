use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::categories::{CategoryError, DecisionCategoryRepository};
use crate::config::EngineConfig;
use crate::db::Database;
use crate::packages::{MetricSource, MetricValue, PackageError, PackageRepository};
use crate::rules::{
    BoundedEvaluator, DecisionRuleRepository, RuleDefinition, RuleKind, RuleLoader,
    RuleLoaderError,
};
use crate::telemetry::AUDIT_TARGET;

use super::repositories::{AuditError, AuditLogRepository};
use super::types::{Assignment, AutoDecision, AutoDecisionOutcome, rule_label};

#[derive(Debug, Error)]
pub enum AssignError {
    #[error("package error: {0}")]
    Package(#[from] PackageError),
    #[error("rule loading failed: {0}")]
    Rules(#[from] RuleLoaderError),
    #[error("category error: {0}")]
    Category(#[from] CategoryError),
    #[error("audit error: {0}")]
    Audit(#[from] AuditError),
    #[error("rule decision '{0}' is not a configured decision category")]
    UnknownDecision(String),
}

/// Outcome of a batch pass over undecided packages.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub examined: usize,
    pub assigned: usize,
    pub failures: Vec<(String, AssignError)>,
}

/// The rule that fired and the value it saw.
struct RuleMatch<'a> {
    position: usize,
    rule: &'a RuleDefinition,
    input: MetricValue,
}

/// Assigns decisions to undecided packages from the ordered rule table.
///
/// Rules and categories are read per invocation. Scores and assessment
/// bundles come from a [`MetricSource`], the package table by default.
#[derive(Clone)]
pub struct DecisionAssigner<M = PackageRepository> {
    packages: PackageRepository,
    metrics: M,
    rules: RuleLoader,
    categories: DecisionCategoryRepository,
    audit: AuditLogRepository,
    evaluator: BoundedEvaluator,
}

impl DecisionAssigner<PackageRepository> {
    pub fn new(db: Database, config: &EngineConfig) -> Self {
        Self::with_metrics(db.clone(), PackageRepository::new(db), config)
    }
}

impl<M: MetricSource> DecisionAssigner<M> {
    pub fn with_metrics(db: Database, metrics: M, config: &EngineConfig) -> Self {
        Self {
            packages: PackageRepository::new(db.clone()),
            metrics,
            rules: RuleLoader::new(DecisionRuleRepository::new(db.clone())),
            categories: DecisionCategoryRepository::new(db.clone()),
            audit: AuditLogRepository::new(db),
            evaluator: BoundedEvaluator::from_config(config),
        }
    }

    pub fn evaluator(&self) -> &BoundedEvaluator {
        &self.evaluator
    }

    /// Load the current rule table and assign `package`.
    pub async fn assign_package(&self, package: &str) -> Result<Assignment, AssignError> {
        let rules = self.rules.load_rules().await?;
        self.assign_decision(&rules, package).await
    }

    /// Run every undecided package through the current rule table. Packages
    /// are independent; a failure is recorded and the pass moves on.
    pub async fn assign_undecided(&self) -> Result<BatchSummary, AssignError> {
        let rules = self.rules.load_rules().await?;
        let pending = self.packages.list_undecided().await?;

        let mut summary = BatchSummary {
            examined: pending.len(),
            ..BatchSummary::default()
        };
        for package in pending {
            match self.assign_decision(&rules, &package).await {
                Ok(assignment) if assignment.was_assigned() => summary.assigned += 1,
                Ok(_) => {}
                Err(err) => {
                    error!(package = %package, error = %err, "automatic decision failed");
                    summary.failures.push((package, err));
                }
            }
        }

        info!(
            examined = summary.examined,
            assigned = summary.assigned,
            failed = summary.failures.len(),
            "automatic decision pass finished"
        );
        Ok(summary)
    }

    /// Apply `rules` to `package`. An existing decision is returned untouched;
    /// otherwise the first matching rule decides and the decision, a comment
    /// and an audit entry are written together.
    pub async fn assign_decision(
        &self,
        rules: &[RuleDefinition],
        package: &str,
    ) -> Result<Assignment, AssignError> {
        let state = self.packages.get_state(package).await?;
        if state.is_decided() {
            debug!(package, decision = ?state.decision, "package already decided; skipping");
            return Ok(Assignment::existing(state.decision));
        }

        let Some(found) = self.find_match(rules, package).await? else {
            debug!(package, "no decision rule matched");
            return Ok(Assignment::undecided());
        };

        let registry = self.categories.load_registry().await?;
        let decision = &found.rule.decision;
        let category = registry
            .get(decision)
            .ok_or_else(|| AssignError::UnknownDecision(decision.clone()))?;

        let detail = describe_match(&found);
        let record = AutoDecision {
            package_name: package.to_string(),
            decision_id: category.id,
            comment: format!(
                "Decision of '{decision}' was automatically assigned by {}: {detail}.",
                rule_label(found.position)
            ),
            audit_message: format!(
                "Package {package} auto-assigned '{decision}' by {}: {detail}",
                rule_label(found.position)
            ),
        };

        match self.audit.record_auto_decision(&record).await? {
            AutoDecisionOutcome::Recorded => {
                info!(
                    target: AUDIT_TARGET,
                    package,
                    decision = %decision,
                    rule = %rule_label(found.position),
                    rule_key = %found.rule.key,
                    message = %record.audit_message,
                    "decision auto-assigned"
                );
                Ok(Assignment::matched(decision.clone(), found.position))
            }
            AutoDecisionOutcome::AlreadyDecided => {
                let state = self.packages.get_state(package).await?;
                debug!(package, decision = ?state.decision, "package decided concurrently; keeping existing decision");
                Ok(Assignment::existing(state.decision))
            }
        }
    }

    async fn find_match<'a>(
        &self,
        rules: &'a [RuleDefinition],
        package: &str,
    ) -> Result<Option<RuleMatch<'a>>, AssignError> {
        let bundle = if rules.iter().any(|rule| rule.kind == RuleKind::Assessment) {
            Some(self.metrics.assessment_bundle(package).await?)
        } else {
            None
        };
        let score = if rules.iter().any(|rule| rule.kind == RuleKind::Score) {
            MetricValue::from(self.metrics.package_score(package).await?)
        } else {
            MetricValue::Missing
        };

        for (index, rule) in rules.iter().enumerate() {
            let position = index + 1;
            let input = match &rule.kind {
                RuleKind::Default => {
                    return Ok(Some(RuleMatch {
                        position,
                        rule,
                        input: MetricValue::Missing,
                    }));
                }
                RuleKind::Score => score.clone(),
                RuleKind::Assessment => {
                    match (rule.target_metric.as_deref(), bundle.as_ref()) {
                        (Some(metric), Some(bundle)) if !metric.is_empty() => bundle.get(metric),
                        _ => {
                            warn!(package, position, "assessment rule names no metric; skipping");
                            continue;
                        }
                    }
                }
                RuleKind::Unrecognized(kind) => {
                    warn!(package, position, kind = %kind, "unknown rule type; skipping");
                    continue;
                }
            };

            if let Some(err) = rule.predicate.compile_error() {
                warn!(
                    package,
                    position,
                    condition = %rule.condition_text,
                    error = %err,
                    "rule condition does not compile; skipping"
                );
                continue;
            }

            if self.evaluator.matches(&rule.predicate, &input) {
                return Ok(Some(RuleMatch {
                    position,
                    rule,
                    input,
                }));
            }
        }

        Ok(None)
    }
}

fn describe_match(found: &RuleMatch<'_>) -> String {
    let condition = &found.rule.condition_text;
    match &found.rule.kind {
        RuleKind::Score => format!(
            "overall risk score {} met condition `{condition}`",
            found.input
        ),
        RuleKind::Assessment => format!(
            "assessment '{}' = {} met condition `{condition}`",
            found.rule.target_metric.as_deref().unwrap_or_default(),
            found.input
        ),
        _ => "no earlier rule matched, so the default rule applied".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::NewDecisionCategory;
    use crate::constants::AUTO_ASSIGNED;
    use crate::decisions::repositories::CommentRepository;
    use crate::migrations::run_migrations;
    use crate::packages::{AssessmentBundle, NewPackage};
    use crate::rules::{NewDecisionRule, compile_rules};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Fixture {
        db: Database,
        packages: PackageRepository,
        _dir: TempDir,
    }

    async fn setup() -> Fixture {
        let dir = TempDir::new().expect("temp dir");
        let db = Database::new(&dir.path().join("db.sqlite"))
            .await
            .expect("create db");
        run_migrations(&db).await.expect("migrations");

        let categories = DecisionCategoryRepository::new(db.clone());
        for (name, color) in [
            ("Approve", "#06B756"),
            ("Review", "#A99D04"),
            ("Reject", "#B80000"),
        ] {
            categories
                .create(NewDecisionCategory {
                    name: name.into(),
                    color: color.into(),
                    lower_limit: None,
                    upper_limit: None,
                })
                .await
                .expect("category");
        }

        Fixture {
            packages: PackageRepository::new(db.clone()),
            db,
            _dir: dir,
        }
    }

    impl Fixture {
        async fn package(&self, name: &str, score: f64, license_ok: Option<bool>) {
            self.packages
                .upsert(NewPackage {
                    name: name.into(),
                    version: Some("1.0.0".into()),
                    score: Some(score),
                })
                .await
                .expect("package");
            if let Some(ok) = license_ok {
                self.packages
                    .set_metric(name, "license_ok", &json!(ok))
                    .await
                    .expect("metric");
            }
        }

        fn assigner(&self) -> DecisionAssigner {
            DecisionAssigner::new(self.db.clone(), &EngineConfig::default())
        }

        async fn comment_count(&self, package: &str) -> usize {
            CommentRepository::new(self.db.clone())
                .list_for_package(package)
                .await
                .expect("comments")
                .len()
        }
    }

    fn scenario_rules() -> Vec<RuleDefinition> {
        compile_rules(vec![
            NewDecisionRule::score(">0.8", "Reject"),
            NewDecisionRule::assessment("license_ok", "== FALSE", "Review"),
            NewDecisionRule::default_rule("Approve"),
        ])
    }

    #[tokio::test]
    async fn scenario_assigns_by_first_matching_rule() {
        let fx = setup().await;
        fx.package("risky", 0.9, Some(true)).await;
        fx.package("unlicensed", 0.2, Some(false)).await;
        fx.package("clean", 0.1, Some(true)).await;

        let assigner = fx.assigner();
        let rules = scenario_rules();

        let risky = assigner.assign_decision(&rules, "risky").await.expect("risky");
        assert_eq!(risky, Assignment::matched("Reject", 1));

        let unlicensed = assigner
            .assign_decision(&rules, "unlicensed")
            .await
            .expect("unlicensed");
        assert_eq!(unlicensed.decision.as_deref(), Some("Review"));
        assert_eq!(unlicensed.matched_rule.as_deref(), Some("Rule 2"));

        let clean = assigner.assign_decision(&rules, "clean").await.expect("clean");
        assert_eq!(clean, Assignment::matched("Approve", 3));

        let state = fx.packages.get_state("clean").await.expect("state");
        assert_eq!(state.decision.as_deref(), Some("Approve"));
        assert_eq!(state.decision_by.as_deref(), Some(AUTO_ASSIGNED));
    }

    #[tokio::test]
    async fn earlier_rule_wins_when_both_match() {
        let fx = setup().await;
        fx.package("pkg", 0.95, Some(false)).await;
        let rules = compile_rules(vec![
            NewDecisionRule::assessment("license_ok", "== FALSE", "Review"),
            NewDecisionRule::score(">0.8", "Reject"),
        ]);

        let assignment = fx.assigner().assign_decision(&rules, "pkg").await.expect("assign");
        assert_eq!(assignment, Assignment::matched("Review", 1));
    }

    #[tokio::test]
    async fn decided_packages_are_left_alone() {
        let fx = setup().await;
        fx.package("pkg", 0.9, None).await;
        let assigner = fx.assigner();
        let rules = scenario_rules();

        let first = assigner.assign_decision(&rules, "pkg").await.expect("first");
        assert!(first.was_assigned());
        for _ in 0..3 {
            let again = assigner.assign_decision(&rules, "pkg").await.expect("again");
            assert_eq!(again, Assignment::existing(Some("Reject".into())));
        }
        assert_eq!(fx.comment_count("pkg").await, 1);
    }

    #[tokio::test]
    async fn manual_decision_is_never_overwritten() {
        let fx = setup().await;
        fx.package("pkg", 0.9, None).await;
        let approve = DecisionCategoryRepository::new(fx.db.clone())
            .get_by_name("Approve")
            .await
            .expect("category");
        fx.packages
            .set_manual_decision("pkg", Some(approve.id), "reviewer")
            .await
            .expect("manual");

        let assignment = fx
            .assigner()
            .assign_decision(&scenario_rules(), "pkg")
            .await
            .expect("assign");
        assert_eq!(assignment, Assignment::existing(Some("Approve".into())));
        assert_eq!(fx.comment_count("pkg").await, 0);
    }

    #[tokio::test]
    async fn no_match_leaves_package_undecided() {
        let fx = setup().await;
        fx.package("pkg", 0.5, Some(true)).await;
        let rules = compile_rules(vec![
            NewDecisionRule::score(">0.8", "Reject"),
            NewDecisionRule::assessment("license_ok", "== FALSE", "Review"),
        ]);

        let assignment = fx.assigner().assign_decision(&rules, "pkg").await.expect("assign");
        assert_eq!(assignment, Assignment::undecided());
        assert!(!fx.packages.get_state("pkg").await.expect("state").is_decided());
        assert_eq!(fx.comment_count("pkg").await, 0);
    }

    #[tokio::test]
    async fn broken_rules_are_skipped() {
        let fx = setup().await;
        fx.package("pkg", 0.9, None).await;
        let mut unknown = NewDecisionRule::score(">0", "Reject");
        unknown.kind = RuleKind::Unrecognized("maintenance".into());
        let mut no_metric = NewDecisionRule::assessment("", "== FALSE", "Reject");
        no_metric.metric = None;

        let rules = compile_rules(vec![
            unknown,
            no_metric,
            NewDecisionRule::score("> > 0", "Reject"),
            NewDecisionRule::score("x / 0 > 1", "Reject"),
            NewDecisionRule::assessment("missing_metric", "> 1", "Reject"),
            NewDecisionRule::score(">= 0.9", "Review"),
        ]);

        let assignment = fx.assigner().assign_decision(&rules, "pkg").await.expect("assign");
        assert_eq!(assignment, Assignment::matched("Review", 6));
    }

    #[tokio::test]
    async fn unknown_decision_is_an_error() {
        let fx = setup().await;
        fx.package("pkg", 0.9, None).await;
        let rules = compile_rules(vec![NewDecisionRule::score(">0.8", "Banned")]);

        let err = fx
            .assigner()
            .assign_decision(&rules, "pkg")
            .await
            .expect_err("unknown category");
        assert!(matches!(err, AssignError::UnknownDecision(name) if name == "Banned"));
        assert!(!fx.packages.get_state("pkg").await.expect("state").is_decided());
    }

    #[tokio::test]
    async fn missing_package_is_an_error() {
        let fx = setup().await;
        let err = fx
            .assigner()
            .assign_decision(&scenario_rules(), "ghost")
            .await
            .expect_err("missing package");
        assert!(matches!(err, AssignError::Package(PackageError::NotFound(_))));
    }

    struct CountingMetrics {
        inner: PackageRepository,
        bundle_calls: Arc<AtomicUsize>,
        score_calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MetricSource for CountingMetrics {
        async fn package_score(&self, package: &str) -> Result<Option<f64>, PackageError> {
            self.score_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.package_score(package).await
        }

        async fn assessment_bundle(&self, package: &str) -> Result<AssessmentBundle, PackageError> {
            self.bundle_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.assessment_bundle(package).await
        }
    }

    #[tokio::test]
    async fn bundle_is_fetched_once_per_pass() {
        let fx = setup().await;
        fx.package("pkg", 0.1, Some(true)).await;
        let bundle_calls = Arc::new(AtomicUsize::new(0));
        let score_calls = Arc::new(AtomicUsize::new(0));
        let assigner = DecisionAssigner::with_metrics(
            fx.db.clone(),
            CountingMetrics {
                inner: fx.packages.clone(),
                bundle_calls: bundle_calls.clone(),
                score_calls: score_calls.clone(),
            },
            &EngineConfig::default(),
        );

        let rules = compile_rules(vec![
            NewDecisionRule::assessment("license_ok", "== FALSE", "Review"),
            NewDecisionRule::assessment("has_news", "== TRUE", "Review"),
            NewDecisionRule::assessment("license_ok", "is_na(x)", "Review"),
            NewDecisionRule::default_rule("Approve"),
        ]);
        let assignment = assigner.assign_decision(&rules, "pkg").await.expect("assign");

        assert_eq!(assignment, Assignment::matched("Approve", 4));
        assert_eq!(bundle_calls.load(Ordering::SeqCst), 1);
        assert_eq!(score_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_budget_makes_every_condition_fail() {
        let fx = setup().await;
        fx.package("pkg", 0.9, None).await;
        let config = EngineConfig {
            evaluation_budget_ms: 0,
            ..EngineConfig::default()
        };
        let assigner = DecisionAssigner::new(fx.db.clone(), &config);

        let assignment = assigner
            .assign_decision(&scenario_rules(), "pkg")
            .await
            .expect("assign");
        assert_eq!(assignment, Assignment::matched("Approve", 3));
    }

    #[tokio::test]
    async fn batch_pass_decides_every_undecided_package() {
        let fx = setup().await;
        fx.package("risky", 0.9, Some(true)).await;
        fx.package("unlicensed", 0.2, Some(false)).await;
        fx.package("clean", 0.1, Some(true)).await;
        DecisionRuleRepository::new(fx.db.clone())
            .replace_all(&scenario_rules().iter().map(RuleDefinition::to_new_rule).collect::<Vec<_>>())
            .await
            .expect("rules");

        let summary = fx.assigner().assign_undecided().await.expect("batch");
        assert_eq!(summary.examined, 3);
        assert_eq!(summary.assigned, 3);
        assert!(summary.failures.is_empty());
        assert!(fx.packages.list_undecided().await.expect("undecided").is_empty());

        let again = fx.assigner().assign_undecided().await.expect("second batch");
        assert_eq!(again.examined, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_passes_decide_once() {
        let fx = setup().await;
        fx.package("pkg", 0.9, None).await;
        let rules = Arc::new(scenario_rules());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let assigner = fx.assigner();
                let rules = rules.clone();
                tokio::spawn(async move { assigner.assign_decision(&rules, "pkg").await })
            })
            .collect();

        let mut assigned = 0;
        for handle in handles {
            let assignment = handle.await.expect("join").expect("assign");
            assert_eq!(assignment.decision.as_deref(), Some("Reject"));
            if assignment.was_assigned() {
                assigned += 1;
            }
        }
        assert_eq!(assigned, 1);
        assert_eq!(fx.comment_count("pkg").await, 1);
    }
}
