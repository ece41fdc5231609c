use serde::{Deserialize, Serialize};

use super::colors::{ColorError, contrast_text_color};
use super::labels::CategoryLabels;

/// A named decision outcome with its display color and optional score band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionCategory {
    pub id: i64,
    pub name: String,
    pub color: String,
    pub lower_limit: Option<f64>,
    pub upper_limit: Option<f64>,
}

impl DecisionCategory {
    /// Score band `[lower, upper)`, present only when both limits are set.
    pub fn score_range(&self) -> Option<(f64, f64)> {
        self.lower_limit.zip(self.upper_limit)
    }

    pub fn contains_score(&self, score: f64) -> bool {
        self.score_range()
            .is_some_and(|(lower, upper)| lower <= score && score < upper)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDecisionCategory {
    pub name: String,
    pub color: String,
    pub lower_limit: Option<f64>,
    pub upper_limit: Option<f64>,
}

/// The decision categories loaded for one engine invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryRegistry {
    categories: Vec<DecisionCategory>,
}

impl CategoryRegistry {
    pub fn new(categories: Vec<DecisionCategory>) -> Self {
        Self { categories }
    }

    pub fn categories(&self) -> &[DecisionCategory] {
        &self.categories
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&DecisionCategory> {
        self.categories.iter().find(|category| category.name == name)
    }

    pub fn get_by_id(&self, id: i64) -> Option<&DecisionCategory> {
        self.categories.iter().find(|category| category.id == id)
    }

    pub fn color_for(&self, name: &str) -> Option<&str> {
        self.get(name).map(|category| category.color.as_str())
    }

    /// Readable text color for the category's background, `None` if the
    /// category is unknown.
    pub fn text_color_for(&self, name: &str) -> Option<Result<&'static str, ColorError>> {
        self.color_for(name).map(contrast_text_color)
    }

    pub fn labels_for(&self, name: &str) -> Option<CategoryLabels> {
        self.get(name)
            .map(|category| CategoryLabels::for_name(&category.name))
    }

    /// First category (in table order) whose band contains `score`.
    pub fn category_for_score(&self, score: f64) -> Option<&DecisionCategory> {
        self.categories
            .iter()
            .find(|category| category.contains_score(score))
    }

    /// Pairs of category names whose score bands intersect. Overlaps are
    /// reported, never rejected: lookups resolve them by table order.
    pub fn overlapping_ranges(&self) -> Vec<(String, String)> {
        let banded: Vec<(&DecisionCategory, (f64, f64))> = self
            .categories
            .iter()
            .filter_map(|category| category.score_range().map(|range| (category, range)))
            .collect();

        let mut overlaps = Vec::new();
        for (index, (first, (first_lower, first_upper))) in banded.iter().enumerate() {
            for (second, (second_lower, second_upper)) in &banded[index + 1..] {
                if first_lower < second_upper && second_lower < first_upper {
                    overlaps.push((first.name.clone(), second.name.clone()));
                }
            }
        }
        overlaps
    }
}
