pub mod colors;
pub mod labels;
pub mod repository;
pub mod types;

pub use colors::{ColorError, Rgb, contrast_text_color, luminance};
pub use labels::{CategoryLabels, normalize_label};
pub use repository::{CategoryError, DecisionCategoryRepository};
pub use types::{CategoryRegistry, DecisionCategory, NewDecisionCategory};
