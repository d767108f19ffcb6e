//! Post-search candidate filters

use crate::embedding::SearchResult;
use crate::models::Item;
use ahash::AHashSet;

/// Id some nearest-neighbour backends use for "no result in this slot"
pub const MISSING_ID: i64 = -1;

/// Drop excluded, missing and repeated ids, keeping search order
pub fn exclude_seen(candidates: &[SearchResult], excluded: &AHashSet<i64>) -> Vec<i64> {
    let mut emitted = AHashSet::with_capacity(candidates.len());
    candidates
        .iter()
        .map(|candidate| candidate.id)
        .filter(|id| *id != MISSING_ID && !excluded.contains(id))
        .filter(|id| emitted.insert(*id))
        .collect()
}

/// Drop items tagged with any gated category
pub fn gatekeep(items: Vec<Item>, gated: &AHashSet<&str>) -> Vec<Item> {
    items
        .into_iter()
        .filter(|item| !item.has_any_category(gated.iter().copied()))
        .collect()
}
