pub mod engine;
pub mod repositories;
pub mod types;

pub use engine::{AssignError, BatchSummary, DecisionAssigner};
pub use repositories::{
    AUTO_DECISION_EVENT, AuditError, AuditLogRepository, CommentError, CommentRepository,
};
pub use types::{
    Assignment, AuditLogEntry, AutoDecision, AutoDecisionOutcome, Comment, NewComment, rule_label,
};
