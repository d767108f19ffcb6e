//! Book recommendation
//!
//! A user's recent, rating-weighted reading history becomes one query vector.
//! The index is searched with an over-fetched pool, then already-read and
//! "not interested" books are removed and children's categories are held
//! back unless the user has read one before. Users without history get a
//! random sample from their preferred categories or the whole catalog.

mod engine;
mod filters;
mod query;
mod service;

pub use engine::Recommender;
pub use filters::{exclude_seen, gatekeep, MISSING_ID};
pub use query::{rating_weight, weighted_query_vector};
pub use service::{ModelLoader, RecommendationService, ScoredItem, ServiceStatus};

use crate::models::Item;
use serde::Serialize;
use std::fmt;

/// Why a list of books was chosen, shown to the reader
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Explanation {
    /// Nearest neighbours of the user's reading history
    Personalized { username: String },
    /// Cold start: random books from the user's preferred categories
    PreferredCategories,
    /// Cold start or fallback: random books from the whole catalog
    CatalogSample,
    /// History exists but none of it has a vector yet
    StillAnalyzing,
    /// Model or index could not be loaded
    Preparing,
}

impl Explanation {
    /// Whether the list came from the user's own reading history
    pub fn is_personalized(&self) -> bool {
        matches!(self, Explanation::Personalized { .. })
    }
}

impl fmt::Display for Explanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Explanation::Personalized { username } => {
                write!(f, "Recommended for {} based on their reading history.", username)
            }
            Explanation::PreferredCategories => {
                write!(f, "Popular books from your preferred genres.")
            }
            Explanation::CatalogSample => write!(f, "Popular picks from the Cheereading catalog."),
            Explanation::StillAnalyzing => write!(
                f,
                "Still analyzing your reading history. Here are some popular books for now."
            ),
            Explanation::Preparing => write!(f, "The recommendation system is being prepared."),
        }
    }
}

/// An ordered list of books plus the label explaining it
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub items: Vec<Item>,
    pub explanation: Explanation,
}

impl Recommendation {
    pub fn new(items: Vec<Item>, explanation: Explanation) -> Self {
        Self { items, explanation }
    }

    /// Nothing to show; the index or model is not available
    pub fn preparing() -> Self {
        Self::new(Vec::new(), Explanation::Preparing)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item_ids(&self) -> Vec<i64> {
        self.items.iter().map(|item| item.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_distinguish_fallbacks() {
        let labels = [
            Explanation::PreferredCategories.to_string(),
            Explanation::CatalogSample.to_string(),
            Explanation::StillAnalyzing.to_string(),
            Explanation::Preparing.to_string(),
        ];
        for (i, a) in labels.iter().enumerate() {
            for b in &labels[i + 1..] {
                assert_ne!(a, b);
            }
        }

        let personal = Explanation::Personalized {
            username: "minji".to_string(),
        };
        assert!(personal.to_string().contains("minji"));
        assert!(personal.is_personalized());
        assert!(!Explanation::CatalogSample.is_personalized());
    }

    #[test]
    fn test_explanation_json() {
        let json = serde_json::to_value(Explanation::StillAnalyzing).unwrap();
        assert_eq!(json["kind"], "still_analyzing");
    }
}
