//! Test that exports all TypeScript types when run.
//!
//! Run with: cargo test --test export_ts_types -- --ignored
//!
//! This test is ignored by default so it doesn't run during normal CI.

use ts_rs::TS;

#[test]
#[ignore = "Run manually to generate TypeScript types: cargo test --test export_ts_types -- --ignored"]
fn export_typescript_types() {
    // Rule types
    riskboard_core::RuleKind::export_all().expect("RuleKind");
    riskboard_core::rules::StoredRule::export_all().expect("StoredRule");
    riskboard_core::NewDecisionRule::export_all().expect("NewDecisionRule");

    // Category types
    riskboard_core::CategoryLabels::export_all().expect("CategoryLabels");

    // API types
    riskboard_core::RuleView::export_all().expect("RuleView");
    riskboard_core::RuleTableView::export_all().expect("RuleTableView");
    riskboard_core::api::RuleTableUpdate::export_all().expect("RuleTableUpdate");
    riskboard_core::CategoryView::export_all().expect("CategoryView");
    riskboard_core::AssignmentView::export_all().expect("AssignmentView");
    riskboard_core::BatchAssignmentView::export_all().expect("BatchAssignmentView");
    riskboard_core::api::AssignmentFailureView::export_all().expect("AssignmentFailureView");

    println!("TypeScript types exported successfully!");
}
