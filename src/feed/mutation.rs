//! Applies resolved write results (like/collect toggles) to cached items.
//!
//! The propagator patches the matching item in place across all cached
//! pages instead of invalidating the cache, so a toggle never causes a
//! refetch or visible flicker. It is handed an already-resolved
//! [`ToggleOutcome`] and never fails: an id that is no longer cached is a
//! silent no-op.

use crate::feed::store::SharedPageStore;
use crate::model::{FeedCacheKey, FeedItem, ToggleOutcome};

/// Update an item's like state from an authoritative toggle result.
///
/// Two-tier count policy: when the server returns a post-mutation count it
/// wins; when it is silent (`new_count: None`) the count is derived from the
/// previous state by ±1, floored at zero. A server that only acknowledges
/// success must not regress a previously-correct count.
pub fn apply_like(item: &mut FeedItem, outcome: &ToggleOutcome) {
    item.likes_count = match outcome.new_count {
        Some(count) => count,
        None if outcome.new_state => item.likes_count.saturating_add(1),
        None => item.likes_count.saturating_sub(1),
    };
    item.is_liked = outcome.new_state;
    item.like_action_id = if outcome.new_state {
        outcome.action_id.or(item.like_action_id)
    } else {
        None
    };
}

/// Update an item's collect state from an authoritative toggle result.
/// Same two-tier policy as [`apply_like`].
pub fn apply_collect(item: &mut FeedItem, outcome: &ToggleOutcome) {
    item.collects_count = match outcome.new_count {
        Some(count) => count,
        None if outcome.new_state => item.collects_count.saturating_add(1),
        None => item.collects_count.saturating_sub(1),
    };
    item.is_collected = outcome.new_state;
    item.collect_action_id = if outcome.new_state {
        outcome.action_id.or(item.collect_action_id)
    } else {
        None
    };
}

/// Propagates toggle results into the shared page cache.
///
/// Rollback on a failed write is the caller's job: invoke the same apply
/// with the pre-mutation state. The propagator itself never retries.
#[derive(Clone)]
pub struct MutationPropagator {
    store: SharedPageStore,
}

impl MutationPropagator {
    pub fn new(store: SharedPageStore) -> Self {
        Self { store }
    }

    pub async fn apply_like_toggle(
        &self,
        key: &FeedCacheKey,
        action_id: i64,
        outcome: &ToggleOutcome,
    ) {
        let mut store = self.store.lock().await;
        store.patch_item(key, action_id, |item| apply_like(item, outcome));
    }

    pub async fn apply_collect_toggle(
        &self,
        key: &FeedCacheKey,
        action_id: i64,
        outcome: &ToggleOutcome,
    ) {
        let mut store = self.store.lock().await;
        store.patch_item(key, action_id, |item| apply_collect(item, outcome));
    }
}
