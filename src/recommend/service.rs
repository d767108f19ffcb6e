//! Process-wide recommendation service
//!
//! Owns the embedding model and the similarity index. Both are loaded on
//! first use; a failed load is remembered and reported as `Preparing` until
//! `reload()` is called.

use super::{Recommendation, Recommender};
use crate::config::{Config, RecommendationConfig};
use crate::embedding::{EmbeddingError, EmbeddingProvider, FastEmbedProvider, VectorIndex};
use crate::error::Result;
use crate::models::Item;
use crate::storage::Database;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// Constructs the embedding model on first use
pub type ModelLoader =
    Box<dyn Fn() -> std::result::Result<Arc<dyn EmbeddingProvider>, EmbeddingError> + Send + Sync>;

struct Resources {
    provider: Arc<dyn EmbeddingProvider>,
    index: VectorIndex,
}

enum LoadState {
    Ready(Arc<Resources>),
    Unavailable(String),
}

/// Snapshot of what the service has loaded
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ServiceStatus {
    NotLoaded,
    Ready {
        model: String,
        dimension: usize,
        items: usize,
        built_at: DateTime<Utc>,
    },
    Unavailable {
        reason: String,
    },
}

/// A catalog item with its distance from a free-text query
#[derive(Debug, Clone, Serialize)]
pub struct ScoredItem {
    pub item: Item,
    pub distance: f32,
}

pub struct RecommendationService {
    database: Arc<Database>,
    config: RecommendationConfig,
    index_path: PathBuf,
    loader: ModelLoader,
    state: RwLock<Option<LoadState>>,
}

impl RecommendationService {
    pub fn new(
        database: Arc<Database>,
        config: RecommendationConfig,
        index_path: PathBuf,
        loader: ModelLoader,
    ) -> Self {
        Self {
            database,
            config,
            index_path,
            loader,
            state: RwLock::new(None),
        }
    }

    /// Service backed by the configured FastEmbed model
    pub fn from_config(config: &Config, database: Arc<Database>) -> Result<Self> {
        let index_path = config
            .data_dir()?
            .join("store")
            .join("vectors")
            .join(&config.indexing.index_file);
        let model = config.embedding.model.clone();

        let loader: ModelLoader = Box::new(move || {
            FastEmbedProvider::new(&model)
                .map(|provider| Arc::new(provider) as Arc<dyn EmbeddingProvider>)
        });

        Ok(Self::new(
            database,
            config.recommendation.clone(),
            index_path,
            loader,
        ))
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    pub fn config(&self) -> &RecommendationConfig {
        &self.config
    }

    /// Recommend up to `k` books; `Preparing` with no items when the model
    /// or index is unavailable
    pub fn recommend(&self, user_id: i64, k: usize) -> Result<Recommendation> {
        let Some(resources) = self.resources() else {
            return Ok(Recommendation::preparing());
        };

        Recommender::new(&self.database, &resources.index, &self.config).recommend(user_id, k)
    }

    /// Recommend with the configured default size
    pub fn recommend_default(&self, user_id: i64) -> Result<Recommendation> {
        self.recommend(user_id, self.config.default_k)
    }

    /// Nearest catalog items to free text, nearest first
    ///
    /// Empty when the model or index is unavailable.
    pub fn similar_to_text(&self, text: &str, k: usize) -> Result<Vec<ScoredItem>> {
        let Some(resources) = self.resources() else {
            return Ok(Vec::new());
        };

        let query = resources.provider.embed(text)?;
        let hits = resources.index.search(&query, k)?;

        let ids: Vec<i64> = hits.iter().map(|hit| hit.id).collect();
        let mut items: ahash::AHashMap<i64, Item> = self
            .database
            .get_items(&ids)?
            .into_iter()
            .map(|item| (item.id, item))
            .collect();

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                items.remove(&hit.id).map(|item| ScoredItem {
                    item,
                    distance: hit.distance,
                })
            })
            .collect())
    }

    /// Record "not interested"; see [`Database::record_feedback`]
    pub fn record_feedback(&self, user_id: i64, item_id: i64) -> Result<bool> {
        self.database.record_feedback(user_id, item_id)
    }

    pub fn status(&self) -> ServiceStatus {
        match &*self.read_state() {
            None => ServiceStatus::NotLoaded,
            Some(LoadState::Unavailable(reason)) => ServiceStatus::Unavailable {
                reason: reason.clone(),
            },
            Some(LoadState::Ready(resources)) => ServiceStatus::Ready {
                model: resources.provider.model_name().to_string(),
                dimension: resources.index.dimension(),
                items: resources.index.len(),
                built_at: resources.index.built_at(),
            },
        }
    }

    /// Load now instead of on the first request
    pub fn warm_up(&self) -> ServiceStatus {
        self.resources();
        self.status()
    }

    /// Drop whatever is loaded and load again, e.g. after the index was rebuilt
    pub fn reload(&self) -> ServiceStatus {
        let state = Self::load(&self.loader, &self.index_path);
        *self.write_state() = Some(state);
        self.status()
    }

    /// Release the model and index; the next request loads them again
    pub fn shutdown(&self) {
        if self.write_state().take().is_some() {
            info!("Recommendation resources released");
        }
    }

    fn resources(&self) -> Option<Arc<Resources>> {
        if let Some(state) = &*self.read_state() {
            return Self::ready(state);
        }

        // Load without holding the lock; if another caller finished first
        // their result is kept.
        let loaded = Self::load(&self.loader, &self.index_path);
        let mut guard = self.write_state();
        let state = guard.get_or_insert(loaded);
        Self::ready(state)
    }

    fn ready(state: &LoadState) -> Option<Arc<Resources>> {
        match state {
            LoadState::Ready(resources) => Some(Arc::clone(resources)),
            LoadState::Unavailable(reason) => {
                debug!("Recommendations unavailable: {}", reason);
                None
            }
        }
    }

    fn load(loader: &ModelLoader, index_path: &Path) -> LoadState {
        let index = match VectorIndex::load(index_path) {
            Ok(index) => index,
            Err(e) => {
                warn!("Similarity index unavailable: {}", e);
                return LoadState::Unavailable(e.to_string());
            }
        };

        let provider = match loader() {
            Ok(provider) => provider,
            Err(e) => {
                warn!("Embedding model unavailable: {}", e);
                return LoadState::Unavailable(e.to_string());
            }
        };

        if provider.dimension() != index.dimension() {
            let reason = format!(
                "Model {} produces {}D vectors but the index holds {}D vectors",
                provider.model_name(),
                provider.dimension(),
                index.dimension()
            );
            warn!("{}", reason);
            return LoadState::Unavailable(reason);
        }

        info!(
            "Loaded {} and index with {} vectors ({}D)",
            provider.model_name(),
            index.len(),
            index.dimension()
        );
        LoadState::Ready(Arc::new(Resources { provider, index }))
    }

    fn read_state(&self) -> RwLockReadGuard<'_, Option<LoadState>> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, Option<LoadState>> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
