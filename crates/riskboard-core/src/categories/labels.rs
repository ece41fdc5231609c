use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));
static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_-]").expect("identifier pattern is valid"));

/// Turn a decision name into a stable UI identifier: prefix `cat`, lower-case,
/// whitespace runs become `_`, anything outside `[a-zA-Z0-9_-]` is dropped.
///
/// `"High Risk!"` becomes `"cat_high_risk"`.
pub fn normalize_label(name: &str) -> String {
    let prefixed = format!("cat {}", name.to_lowercase());
    let collapsed = WHITESPACE.replace_all(&prefixed, "_");
    DISALLOWED.replace_all(&collapsed, "").into_owned()
}

/// The identifiers the UI derives from one category name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CategoryLabels {
    pub input: String,
    pub attribute: String,
    pub module: String,
}

impl CategoryLabels {
    pub fn for_name(name: &str) -> Self {
        let input = normalize_label(name);
        Self {
            attribute: format!("{input}_attr"),
            module: format!("{input}_mod"),
            input,
        }
    }
}
