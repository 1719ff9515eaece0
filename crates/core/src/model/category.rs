use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed navigation buckets shown in the question palette.
///
/// Matching is by label only. Questions whose category is not one of these
/// labels do not appear in the bucketed view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Aptitude,
    Reasoning,
    Verbal,
    Technical,
}

impl Category {
    /// All buckets in palette order.
    pub const ALL: [Category; 4] = [
        Category::Aptitude,
        Category::Reasoning,
        Category::Verbal,
        Category::Technical,
    ];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Category::Aptitude => "Aptitude",
            Category::Reasoning => "Reasoning",
            Category::Verbal => "Verbal",
            Category::Technical => "Technical",
        }
    }

    /// Resolve a free-form category label, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn from_label(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(raw))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
