use futures::future::join_all;
use riskboard_core::constants::{AUTO_ASSIGNED, AUTOMATION_ROLE};
use riskboard_core::decisions::{AUTO_DECISION_EVENT, AuditLogRepository, CommentRepository};
use riskboard_core::migrations::run_migrations;
use riskboard_core::rules::compile_rules;
use riskboard_core::{
    Assignment, Database, DecisionAssigner, DecisionCategoryRepository, DecisionRuleRepository,
    EngineConfig, NewDecisionCategory, NewDecisionRule, NewPackage, PackageRepository,
    RuleEditSession, RuleLoader, validate_rule_table,
};
use serde_json::json;
use tempfile::TempDir;

struct Harness {
    db: Database,
    packages: PackageRepository,
    rules: DecisionRuleRepository,
    _dir: TempDir,
}

async fn harness() -> Harness {
    let dir = TempDir::new().expect("temp dir");
    let db = Database::new(&dir.path().join("riskboard.sqlite"))
        .await
        .expect("create db");
    run_migrations(&db).await.expect("migrations");

    let categories = DecisionCategoryRepository::new(db.clone());
    for (name, color, range) in [
        ("Approve", "#06B756", Some((0.0, 0.5))),
        ("Review", "#A99D04", None),
        ("Reject", "#B80000", Some((0.5, 1.01))),
    ] {
        categories
            .create(NewDecisionCategory {
                name: name.into(),
                color: color.into(),
                lower_limit: range.map(|(lower, _)| lower),
                upper_limit: range.map(|(_, upper)| upper),
            })
            .await
            .expect("category");
    }

    let rules = DecisionRuleRepository::new(db.clone());
    rules
        .replace_all(&[
            NewDecisionRule::score(">0.8", "Reject"),
            NewDecisionRule::assessment("license_ok", "== FALSE", "Review"),
            NewDecisionRule::default_rule("Approve"),
        ])
        .await
        .expect("rules");

    Harness {
        packages: PackageRepository::new(db.clone()),
        rules,
        db,
        _dir: dir,
    }
}

impl Harness {
    async fn add_package(&self, name: &str, score: f64, license_ok: bool) {
        self.packages
            .upsert(NewPackage {
                name: name.into(),
                version: Some("0.1.0".into()),
                score: Some(score),
            })
            .await
            .expect("package");
        self.packages
            .set_metric(name, "license_ok", &json!(license_ok))
            .await
            .expect("metric");
    }
}

#[tokio::test]
async fn packages_receive_first_matching_decision_with_audit_trail() {
    let h = harness().await;
    h.add_package("risky", 0.9, true).await;
    h.add_package("unlicensed", 0.2, false).await;
    h.add_package("clean", 0.1, true).await;

    let assigner = DecisionAssigner::new(h.db.clone(), &EngineConfig::default());

    assert_eq!(
        assigner.assign_package("risky").await.expect("risky"),
        Assignment::matched("Reject", 1)
    );
    assert_eq!(
        assigner.assign_package("unlicensed").await.expect("unlicensed"),
        Assignment::matched("Review", 2)
    );
    assert_eq!(
        assigner.assign_package("clean").await.expect("clean"),
        Assignment::matched("Approve", 3)
    );

    let comments = CommentRepository::new(h.db.clone())
        .list_for_package("unlicensed")
        .await
        .expect("comments");
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].user_name, AUTO_ASSIGNED);
    assert_eq!(comments[0].user_role, AUTOMATION_ROLE);
    assert!(comments[0].comment.contains("Review"));
    assert!(comments[0].comment.contains("license_ok"));
    assert!(comments[0].comment.contains("== FALSE"));

    let audit = AuditLogRepository::new(h.db.clone())
        .list_for_package("risky")
        .await
        .expect("audit");
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].event, AUTO_DECISION_EVENT);
    assert!(audit[0].message.contains("risky"));
    assert!(audit[0].message.contains(">0.8"));
    assert!(audit[0].message.contains("0.9"));

    // Second pass is a no-op.
    let again = assigner.assign_package("risky").await.expect("again");
    assert_eq!(again, Assignment::existing(Some("Reject".into())));
    let audit = AuditLogRepository::new(h.db.clone())
        .list_for_package("risky")
        .await
        .expect("audit");
    assert_eq!(audit.len(), 1);
}

#[tokio::test]
async fn independent_packages_can_be_assigned_concurrently() {
    let h = harness().await;
    let names: Vec<String> = (0..8).map(|i| format!("pkg{i}")).collect();
    for (i, name) in names.iter().enumerate() {
        h.add_package(name, i as f64 / 8.0 + 0.05, i % 2 == 0).await;
    }

    let assigner = DecisionAssigner::new(h.db.clone(), &EngineConfig::default());
    let results = join_all(names.iter().map(|name| assigner.assign_package(name))).await;

    for (name, result) in names.iter().zip(results) {
        let assignment = result.expect("assignment");
        assert!(assignment.was_assigned(), "{name} should be decided");
    }
    assert!(h.packages.list_undecided().await.expect("undecided").is_empty());
}

#[tokio::test]
async fn edit_session_round_trips_through_rule_table() {
    let h = harness().await;
    let loader = RuleLoader::new(h.rules.clone());
    let loaded = loader.load_rules().await.expect("load");

    let registry = DecisionCategoryRepository::new(h.db.clone())
        .load_registry()
        .await
        .expect("registry");
    assert!(validate_rule_table(&loaded, &registry).is_empty());

    let mut session = RuleEditSession::from_rules(&loaded);
    session.insert(
        "rule_new",
        NewDecisionRule::assessment("has_news", "== FALSE", "Review"),
    );
    session
        .reorder(&["rule_new", "cat_reject", "rule_2", "rule_else"])
        .expect("reorder");
    assert!(session.mark_removed("rule_2"));

    h.rules
        .replace_all(&session.to_new_rules())
        .await
        .expect("save");

    let reloaded = loader.load_rules().await.expect("reload");
    let keys: Vec<_> = reloaded.iter().map(|rule| rule.key.as_str()).collect();
    assert_eq!(keys, vec!["rule_1", "cat_reject", "rule_else"]);
    assert_eq!(reloaded[0].target_metric.as_deref(), Some("has_news"));

    h.add_package("quiet", 0.2, false).await;
    h.packages
        .set_metric("quiet", "has_news", &json!(false))
        .await
        .expect("metric");
    let assignment = DecisionAssigner::new(h.db.clone(), &EngineConfig::default())
        .assign_package("quiet")
        .await
        .expect("assign");
    assert_eq!(assignment, Assignment::matched("Review", 1));
}

#[tokio::test]
async fn compiled_rules_match_loaded_rules() {
    let h = harness().await;
    let loaded = RuleLoader::new(h.rules.clone())
        .load_rules()
        .await
        .expect("load");
    let compiled = compile_rules(h.rules.list_all().await.expect("rows"));
    let loaded_keys: Vec<_> = loaded.iter().map(|rule| rule.key.clone()).collect();
    let compiled_keys: Vec<_> = compiled.iter().map(|rule| rule.key.clone()).collect();
    assert_eq!(loaded_keys, compiled_keys);
}
