pub mod repository;
pub mod types;

pub use repository::{MetricSource, PackageError, PackageRepository};
pub use types::{AssessmentBundle, MetricValue, NewPackage, PackageDecisionState};
