//! Shared fixtures for integration tests
#![allow(dead_code)]

use cheereading::config::RecommendationConfig;
use cheereading::embedding::{EmbeddingError, EmbeddingProvider, IndexBuildReport, IndexBuilder};
use cheereading::models::NewItem;
use cheereading::recommend::{ModelLoader, RecommendationService};
use cheereading::storage::{Database, StorageManager};
use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Embeds text as the count of each tracked letter
///
/// `LetterCountProvider::new(&['a', 'b'])` turns "abba" into `[2.0, 2.0]`.
pub struct LetterCountProvider {
    letters: Vec<char>,
}

impl LetterCountProvider {
    pub fn new(letters: &[char]) -> Self {
        Self {
            letters: letters.to_vec(),
        }
    }
}

impl EmbeddingProvider for LetterCountProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self
            .letters
            .iter()
            .map(|letter| text.chars().filter(|c| c == letter).count() as f32)
            .collect())
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    fn dimension(&self) -> usize {
        self.letters.len()
    }

    fn model_name(&self) -> &str {
        "letter-count"
    }
}

pub struct Fixture {
    _temp: TempDir,
    pub database: Arc<Database>,
    pub index_path: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let storage = StorageManager::new(temp.path().to_path_buf()).unwrap();
        let (database, index_path) = storage.into_parts("items.index");

        Self {
            _temp: temp,
            database: Arc::new(database),
            index_path,
        }
    }

    /// Add a book with a precomputed vector
    pub fn book(&self, title: &str, categories: &[&str], vector: &[f32]) -> i64 {
        let id = self.bare_book(title, categories);
        self.database.store_embedding(id, vector, "fixture").unwrap();
        id
    }

    /// Add a book the batch job has not embedded yet
    pub fn bare_book(&self, title: &str, categories: &[&str]) -> i64 {
        self.database
            .insert_item(&NewItem {
                title: title.to_string(),
                categories: categories.iter().map(|c| c.to_string()).collect(),
                ..Default::default()
            })
            .unwrap()
    }

    pub fn reader(&self, name: &str, preferred: &[&str]) -> i64 {
        let preferred: Vec<String> = preferred.iter().map(|c| c.to_string()).collect();
        self.database.create_user(name, &preferred).unwrap()
    }

    pub fn read(&self, user: i64, item: i64, rating: Option<i64>, on: &str) {
        self.database
            .record_interaction(user, item, rating, date(on))
            .unwrap();
    }

    pub fn build_index(&self, dimension: usize) -> IndexBuildReport {
        IndexBuilder::new(
            Arc::clone(&self.database),
            self.index_path.clone(),
            Some(dimension),
        )
        .rebuild()
        .unwrap()
    }

    /// Service whose model embeds with `letters`
    pub fn service(&self, letters: &[char]) -> RecommendationService {
        self.service_with(RecommendationConfig::default(), letters)
    }

    pub fn service_with(
        &self,
        config: RecommendationConfig,
        letters: &[char],
    ) -> RecommendationService {
        let letters = letters.to_vec();
        let loader: ModelLoader = Box::new(move || {
            Ok(Arc::new(LetterCountProvider::new(&letters)) as Arc<dyn EmbeddingProvider>)
        });

        RecommendationService::new(
            Arc::clone(&self.database),
            config,
            self.index_path.clone(),
            loader,
        )
    }
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}
