//! Ordered page cache, keyed by `(variant, identity)`.
//!
//! The store is the only mutable shared resource in the engine. Every
//! mutation (`append`, `patch_item`, `invalidate`) is atomic with respect to
//! a single key: readers never observe a partially-applied page.

use crate::model::{FeedCacheKey, FeedItem, Page};
use std::collections::HashMap;
use std::sync::Arc;

/// Handle shared between the synchronizer (append/invalidate) and the
/// mutation propagator (patch). The lock is never held across I/O.
pub type SharedPageStore = Arc<tokio::sync::Mutex<PageStore>>;

/// Ordered collection of fetched pages per cache key.
///
/// Pages are kept sorted by `page_number` ascending. Appending a page whose
/// number is already present replaces it in place, which is how `refresh`
/// swaps out page 1 without dropping the deeper pages.
#[derive(Debug, Default)]
pub struct PageStore {
    pages: HashMap<FeedCacheKey, Vec<Page>>,
}

impl PageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a page for `key`, replacing any existing page with the same
    /// number and otherwise inserting in `page_number` order.
    pub fn append(&mut self, key: &FeedCacheKey, page: Page) {
        let pages = self.pages.entry(key.clone()).or_default();
        match pages.binary_search_by_key(&page.page_number, |p| p.page_number) {
            Ok(idx) => pages[idx] = page,
            Err(idx) => pages.insert(idx, page),
        }
    }

    /// Apply `updater` to the first cached item with `action_id` under
    /// `key`. Silently does nothing if the id is not cached — the item may
    /// simply have scrolled out of the fetched pages.
    pub fn patch_item<F>(&mut self, key: &FeedCacheKey, action_id: i64, updater: F)
    where
        F: FnOnce(&mut FeedItem),
    {
        let Some(pages) = self.pages.get_mut(key) else {
            return;
        };
        for page in pages.iter_mut() {
            if let Some(item) = page.items.iter_mut().find(|i| i.action_id == action_id) {
                updater(item);
                return;
            }
        }
    }

    /// Concatenate all cached pages' items in page order.
    ///
    /// Does not deduplicate ids: the fetch contract guarantees no repeats
    /// across pages under normal operation.
    pub fn flatten(&self, key: &FeedCacheKey) -> Vec<FeedItem> {
        self.pages
            .get(key)
            .map(|pages| {
                pages
                    .iter()
                    .flat_map(|p| p.items.iter().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop all pages for `key`.
    pub fn invalidate(&mut self, key: &FeedCacheKey) {
        self.pages.remove(key);
    }

    /// The `next_page` of the highest-numbered cached page, or `Some(1)`
    /// when nothing is cached yet.
    pub fn next_page_number(&self, key: &FeedCacheKey) -> Option<u32> {
        match self.pages.get(key).and_then(|pages| pages.last()) {
            Some(page) => page.next_page,
            None => Some(1),
        }
    }

    /// Id of the newest cached item (first item of page 1), used as the
    /// candidate last-seen cursor when the user views the feed.
    pub fn head_item_id(&self, key: &FeedCacheKey) -> Option<i64> {
        self.pages
            .get(key)?
            .first()?
            .items
            .first()
            .map(|i| i.action_id)
    }

    pub fn page_count(&self, key: &FeedCacheKey) -> usize {
        self.pages.get(key).map(Vec::len).unwrap_or(0)
    }
}
