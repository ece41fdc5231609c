//! API types for web UI communication.

pub mod types;

pub use types::{
    AssignmentFailureView, AssignmentView, BatchAssignmentView, CategoryView, RuleTableUpdate,
    RuleTableView, RuleView,
};
