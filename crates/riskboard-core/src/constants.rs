/// Attribution used for decisions, comments and audit rows written by the engine.
pub const AUTO_ASSIGNED: &str = "Auto Assigned";
/// Role recorded on comments written by the engine.
pub const AUTOMATION_ROLE: &str = "admin";
/// Comment type for overall package comments.
pub const OVERALL_COMMENT_TYPE: &str = "o";
/// Session/display key of the catch-all rule.
pub const DEFAULT_RULE_KEY: &str = "rule_else";
