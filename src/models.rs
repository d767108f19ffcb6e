//! Catalog and reader-activity records

use crate::embedding::Keyword;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A catalog book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    /// Category (genre) names, sorted
    pub categories: Vec<String>,
    /// Decoded keyword data; empty when absent or malformed
    pub keywords: Vec<Keyword>,
    /// Embedding vector, `None` until the batch job has produced one
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

impl Item {
    /// Whether the item carries any of the given category names
    pub fn has_any_category<'a, I>(&self, names: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .any(|name| self.categories.iter().any(|c| c == name))
    }
}

/// Input for adding a book to the catalog
#[derive(Debug, Clone, Default)]
pub struct NewItem {
    /// Explicit catalog id; assigned by the database when `None`
    pub id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub categories: Vec<String>,
    /// Keyword data exactly as the host application stores it
    pub keywords: Option<String>,
}

/// A user's reading record for one book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub user_id: i64,
    pub item_id: i64,
    /// 1..=5 when set; anything else weighs as "no rating"
    pub rating: Option<i64>,
    pub read_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// A reader and their cold-start preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    /// Preferred category names, most preferred first
    pub preferred_categories: Vec<String>,
}
