//! Per-request recommendation pipeline

use super::filters::{exclude_seen, gatekeep};
use super::query::weighted_query_vector;
use super::{Explanation, Recommendation};
use crate::config::RecommendationConfig;
use crate::embedding::VectorIndex;
use crate::error::{CheerError, Result};
use crate::models::{Item, UserProfile};
use crate::storage::Database;
use ahash::{AHashMap, AHashSet};
use tracing::debug;

/// Computes recommendations for one user against a loaded index
///
/// Stateless apart from the borrowed database and index; build one per
/// request or keep one around, it makes no difference.
pub struct Recommender<'a> {
    database: &'a Database,
    index: &'a VectorIndex,
    config: &'a RecommendationConfig,
}

impl<'a> Recommender<'a> {
    pub fn new(
        database: &'a Database,
        index: &'a VectorIndex,
        config: &'a RecommendationConfig,
    ) -> Self {
        Self {
            database,
            index,
            config,
        }
    }

    /// Recommend up to `k` unread books for `user_id`
    pub fn recommend(&self, user_id: i64, k: usize) -> Result<Recommendation> {
        let user = self
            .database
            .get_user(user_id)?
            .ok_or(CheerError::UserNotFound { id: user_id })?;

        if !self.database.has_interactions(user_id)? {
            return self.cold_start(&user, k);
        }

        let history = self
            .database
            .recent_interactions(user_id, self.config.history_window)?;
        let history_ids: Vec<i64> = history.iter().map(|i| i.item_id).collect();
        let vectors = self.database.item_vectors(&history_ids)?;

        let rated = history.iter().filter_map(|interaction| {
            vectors
                .get(&interaction.item_id)
                .map(|vector| (vector.as_slice(), interaction.rating))
        });

        let Some(query) = weighted_query_vector(rated, self.index.dimension()) else {
            debug!("User {} has history but no usable vectors", user_id);
            return Ok(Recommendation::new(
                self.database.random_items(k)?,
                Explanation::StillAnalyzing,
            ));
        };

        let pool_size = k.saturating_mul(self.config.overfetch_factor);
        let candidates = self.index.search(&query, pool_size)?;

        let excluded: AHashSet<i64> = self
            .database
            .interacted_item_ids(user_id)?
            .into_iter()
            .chain(self.database.not_interested_item_ids(user_id)?)
            .collect();
        let ranked_ids = exclude_seen(&candidates, &excluded);

        let mut items = self.hydrate_in_order(&ranked_ids)?;

        if !self
            .database
            .has_interacted_with_categories(user_id, &self.config.gatekeeper_categories)?
        {
            let gated: AHashSet<&str> = self
                .config
                .gatekeeper_categories
                .iter()
                .map(String::as_str)
                .collect();
            items = gatekeep(items, &gated);
        }

        debug!(
            "User {}: {} candidates, {} after exclusion, {} after gatekeeper",
            user_id,
            candidates.len(),
            ranked_ids.len(),
            items.len()
        );

        // no backfill when filters leave fewer than k
        items.truncate(k);

        Ok(Recommendation::new(
            items,
            Explanation::Personalized {
                username: user.username,
            },
        ))
    }

    fn cold_start(&self, user: &UserProfile, k: usize) -> Result<Recommendation> {
        if !user.preferred_categories.is_empty() {
            let items = self
                .database
                .random_items_in_categories(&user.preferred_categories, k)?;
            if !items.is_empty() {
                return Ok(Recommendation::new(
                    items,
                    Explanation::PreferredCategories,
                ));
            }
        }

        Ok(Recommendation::new(
            self.database.random_items(k)?,
            Explanation::CatalogSample,
        ))
    }

    /// Load items for `ids` and return them in the same order
    ///
    /// Ids that are no longer in the catalog are dropped.
    fn hydrate_in_order(&self, ids: &[i64]) -> Result<Vec<Item>> {
        let mut by_id: AHashMap<i64, Item> = self
            .database
            .get_items(ids)?
            .into_iter()
            .map(|item| (item.id, item))
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}
