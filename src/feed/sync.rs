//! Feed synchronization: demand-driven page fetching over the page cache.
//!
//! One synchronizer serves both feed variants; each cache key progresses
//! through its own load phases. The two correctness properties everything
//! else leans on:
//!
//! - at most one outstanding page fetch per key (the in-flight guard), so
//!   no page is ever fetched twice concurrently and appends stay in
//!   strictly increasing page order;
//! - a per-key generation counter, bumped by refresh/invalidate, so a
//!   response that raced an invalidation is discarded instead of
//!   resurrecting stale pages.

use crate::error::FeedError;
use crate::feed::fetcher::PageFetcher;
use crate::feed::store::{PageStore, SharedPageStore};
use crate::model::{FeedCacheKey, FeedItem, FeedVariant, Page};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Load phase of one cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPhase {
    #[default]
    Idle,
    /// Initial page 1 fetch in flight.
    Loading,
    Ready,
    /// "Load next page" fetch in flight.
    LoadingMore,
    /// User-triggered page 1 re-fetch in flight.
    Refreshing,
}

impl LoadPhase {
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            LoadPhase::Loading | LoadPhase::LoadingMore | LoadPhase::Refreshing
        )
    }
}

/// What a load call did. Duplicate and superseded calls are outcomes, not
/// errors: the UI treats them as "nothing to do".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A page was fetched and cached.
    Loaded { new_items: usize },
    /// A fetch for this key was already in flight; nothing was started.
    AlreadyInFlight,
    /// No next page exists; nothing was started.
    EndOfFeed,
    /// The fetch completed but the key was refreshed or invalidated in the
    /// interim; the response was discarded.
    Stale,
}

#[derive(Debug, Default)]
struct KeyTracking {
    phase: LoadPhase,
    generation: u64,
}

/// Orchestrates page fetching for all cache keys over a shared [`PageStore`].
///
/// Lock order is always tracking before store; neither lock is held across
/// a fetch await.
pub struct FeedSynchronizer<F> {
    fetcher: F,
    store: SharedPageStore,
    tracking: Mutex<HashMap<FeedCacheKey, KeyTracking>>,
}

impl<F: PageFetcher> FeedSynchronizer<F> {
    pub fn new(fetcher: F) -> Self {
        Self::with_store(fetcher, Arc::new(Mutex::new(PageStore::new())))
    }

    pub fn with_store(fetcher: F, store: SharedPageStore) -> Self {
        Self {
            fetcher,
            store,
            tracking: Mutex::new(HashMap::new()),
        }
    }

    /// Shared handle to the page cache, for the mutation propagator.
    pub fn store(&self) -> SharedPageStore {
        Arc::clone(&self.store)
    }

    /// The "following" feed is identity-scoped and cannot be fetched
    /// anonymously; fail before any I/O.
    fn require_identity(key: &FeedCacheKey) -> Result<(), FeedError> {
        if key.variant == FeedVariant::Following && key.identity.is_none() {
            return Err(FeedError::AuthRequired);
        }
        Ok(())
    }

    pub async fn phase(&self, key: &FeedCacheKey) -> LoadPhase {
        self.tracking
            .lock()
            .await
            .get(key)
            .map(|t| t.phase)
            .unwrap_or_default()
    }

    /// Fetch page 1, replacing any cached pages for `key`.
    ///
    /// On failure the key returns to `Idle` with the cache untouched, so
    /// the caller may simply retry.
    pub async fn load_initial(&self, key: &FeedCacheKey) -> Result<LoadOutcome, FeedError> {
        Self::require_identity(key)?;

        let generation = {
            let mut tracking = self.tracking.lock().await;
            let entry = tracking.entry(key.clone()).or_default();
            if entry.phase.is_in_flight() {
                return Ok(LoadOutcome::AlreadyInFlight);
            }
            entry.phase = LoadPhase::Loading;
            entry.generation
        };

        match self
            .fetcher
            .fetch_page(key.variant, key.identity.as_ref(), 1)
            .await
        {
            Ok(raw) => {
                let page = Page::from_raw(raw);
                let mut tracking = self.tracking.lock().await;
                let entry = tracking.entry(key.clone()).or_default();
                if entry.generation != generation {
                    return Ok(LoadOutcome::Stale);
                }
                entry.phase = LoadPhase::Ready;

                let mut store = self.store.lock().await;
                store.invalidate(key);
                let new_items = page.items.len();
                store.append(key, page);
                Ok(LoadOutcome::Loaded { new_items })
            }
            Err(e) => {
                self.settle_after_failure(key, generation, LoadPhase::Idle)
                    .await;
                tracing::warn!(variant = %key.variant, error = %e, "Initial feed load failed");
                Err(e)
            }
        }
    }

    /// Fetch the next page, if one exists and no fetch is in flight.
    ///
    /// The in-flight check and the next-page computation happen under one
    /// tracking lock, which is what makes concurrent duplicate fetches
    /// impossible rather than merely unlikely.
    pub async fn load_more(&self, key: &FeedCacheKey) -> Result<LoadOutcome, FeedError> {
        Self::require_identity(key)?;

        let (generation, next_page) = {
            let mut tracking = self.tracking.lock().await;
            let entry = tracking.entry(key.clone()).or_default();
            if entry.phase.is_in_flight() {
                return Ok(LoadOutcome::AlreadyInFlight);
            }
            let next_page = match self.store.lock().await.next_page_number(key) {
                Some(n) => n,
                None => return Ok(LoadOutcome::EndOfFeed),
            };
            entry.phase = LoadPhase::LoadingMore;
            (entry.generation, next_page)
        };

        match self
            .fetcher
            .fetch_page(key.variant, key.identity.as_ref(), next_page)
            .await
        {
            Ok(raw) => {
                let page = Page::from_raw(raw);
                let mut tracking = self.tracking.lock().await;
                let entry = tracking.entry(key.clone()).or_default();
                if entry.generation != generation {
                    tracing::debug!(
                        variant = %key.variant,
                        page = next_page,
                        "Discarding superseded page response"
                    );
                    return Ok(LoadOutcome::Stale);
                }
                entry.phase = LoadPhase::Ready;

                let mut store = self.store.lock().await;
                let new_items = page.items.len();
                store.append(key, page);
                Ok(LoadOutcome::Loaded { new_items })
            }
            Err(e) => {
                // Previously loaded pages stay visible; retry is safe.
                self.settle_after_failure(key, generation, LoadPhase::Ready)
                    .await;
                tracing::warn!(variant = %key.variant, page = next_page, error = %e, "Load more failed");
                Err(e)
            }
        }
    }

    /// Re-fetch page 1, replacing page 1 only. Deeper cached pages are
    /// retained (logically stale, but `flatten` always starts from the
    /// replaced page 1 so scrolling never exposes a gap).
    ///
    /// Supersedes an in-flight `load_more` by bumping the generation: its
    /// response will be discarded as [`LoadOutcome::Stale`].
    pub async fn refresh(&self, key: &FeedCacheKey) -> Result<LoadOutcome, FeedError> {
        Self::require_identity(key)?;

        let generation = {
            let mut tracking = self.tracking.lock().await;
            let entry = tracking.entry(key.clone()).or_default();
            if matches!(entry.phase, LoadPhase::Loading | LoadPhase::Refreshing) {
                return Ok(LoadOutcome::AlreadyInFlight);
            }
            entry.generation += 1;
            entry.phase = LoadPhase::Refreshing;
            entry.generation
        };

        match self
            .fetcher
            .fetch_page(key.variant, key.identity.as_ref(), 1)
            .await
        {
            Ok(raw) => {
                let page = Page::from_raw(raw);
                let mut tracking = self.tracking.lock().await;
                let entry = tracking.entry(key.clone()).or_default();
                if entry.generation != generation {
                    return Ok(LoadOutcome::Stale);
                }
                entry.phase = LoadPhase::Ready;

                let mut store = self.store.lock().await;
                let new_items = page.items.len();
                store.append(key, page);
                Ok(LoadOutcome::Loaded { new_items })
            }
            Err(e) => {
                self.settle_after_failure(key, generation, LoadPhase::Ready)
                    .await;
                tracing::warn!(variant = %key.variant, error = %e, "Feed refresh failed");
                Err(e)
            }
        }
    }

    /// Drop all cached pages for `key` and supersede any in-flight fetch.
    /// Used on logout and full-state clears.
    pub async fn invalidate(&self, key: &FeedCacheKey) {
        let mut tracking = self.tracking.lock().await;
        let entry = tracking.entry(key.clone()).or_default();
        entry.generation += 1;
        entry.phase = LoadPhase::Idle;
        self.store.lock().await.invalidate(key);
    }

    /// Flattened, already-filtered item list across all cached pages.
    pub async fn visible_items(&self, key: &FeedCacheKey) -> Vec<FeedItem> {
        self.store.lock().await.flatten(key)
    }

    pub async fn has_next_page(&self, key: &FeedCacheKey) -> bool {
        self.store.lock().await.next_page_number(key).is_some()
    }

    /// Newest cached item id, the candidate mark-seen cursor.
    pub async fn head_item_id(&self, key: &FeedCacheKey) -> Option<i64> {
        self.store.lock().await.head_item_id(key)
    }

    /// A failed fetch settles the phase back to `settled` unless the key
    /// was invalidated while the fetch was in flight.
    async fn settle_after_failure(
        &self,
        key: &FeedCacheKey,
        generation: u64,
        settled: LoadPhase,
    ) {
        let mut tracking = self.tracking.lock().await;
        let entry = tracking.entry(key.clone()).or_default();
        if entry.generation == generation {
            entry.phase = settled;
        }
    }
}
