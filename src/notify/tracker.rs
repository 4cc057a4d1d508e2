//! Unread tracking: per-variant last-seen cursor and new-item badge count.
//!
//! One tracker instance per process owns both variants' state, rehydrated
//! from persistence at startup. The cursor only ever moves forward (the
//! monotonic-max rule in [`advance_cursor`]), which makes `mark_seen` and
//! the background poll order-independent: a stale poll response can never
//! push the cursor backward.

use crate::error::FeedError;
use crate::feed::fetcher::UnreadStatusFetcher;
use crate::model::{FeedVariant, IdentityToken};
use crate::storage::{Persistence, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Per-variant notification state.
///
/// `last_seen_id` is `None` when the user has never seen anything (or after
/// a full-state clear); it is otherwise monotonically non-decreasing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationState {
    pub last_seen_id: Option<i64>,
    pub new_count: u32,
}

/// Monotonic-max cursor merge: the reducer behind both `mark_seen` and the
/// rehydration path. Returns the merged cursor and whether it advanced.
pub fn advance_cursor(current: Option<i64>, candidate: Option<i64>) -> (Option<i64>, bool) {
    match (current, candidate) {
        (cur, None) => (cur, false),
        (None, Some(id)) => (Some(id), true),
        (Some(cur), Some(id)) if id > cur => (Some(id), true),
        (cur, Some(_)) => (cur, false),
    }
}

/// Tracks unread counts for both feed variants.
pub struct NotificationTracker<S, P> {
    status: S,
    persistence: P,
    states: Mutex<HashMap<FeedVariant, NotificationState>>,
}

impl<S: UnreadStatusFetcher, P: Persistence> NotificationTracker<S, P> {
    /// Build a tracker, rehydrating persisted cursors for both variants.
    ///
    /// A missing or corrupt persisted value is treated as "never seen"
    /// rather than failing: losing a badge count is recoverable, refusing
    /// to start is not.
    pub async fn load(status: S, persistence: P) -> Self {
        let (latest, following) = futures::future::join(
            Self::rehydrate(&persistence, FeedVariant::Latest),
            Self::rehydrate(&persistence, FeedVariant::Following),
        )
        .await;

        let mut states = HashMap::new();
        for (variant, last_seen_id) in [
            (FeedVariant::Latest, latest),
            (FeedVariant::Following, following),
        ] {
            states.insert(
                variant,
                NotificationState {
                    last_seen_id,
                    new_count: 0,
                },
            );
        }

        Self {
            status,
            persistence,
            states: Mutex::new(states),
        }
    }

    async fn rehydrate(persistence: &P, variant: FeedVariant) -> Option<i64> {
        match persistence.get(variant.cursor_key()).await {
            Ok(Some(raw)) => match raw.parse::<i64>() {
                Ok(id) => Some(id),
                Err(_) => {
                    tracing::debug!(
                        variant = %variant,
                        value = %raw,
                        "Corrupt persisted cursor, treating as never-seen"
                    );
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(variant = %variant, error = %e, "Failed to read persisted cursor");
                None
            }
        }
    }

    pub async fn new_count(&self, variant: FeedVariant) -> u32 {
        self.states
            .lock()
            .await
            .get(&variant)
            .map(|s| s.new_count)
            .unwrap_or(0)
    }

    pub async fn last_seen(&self, variant: FeedVariant) -> Option<i64> {
        self.states
            .lock()
            .await
            .get(&variant)
            .and_then(|s| s.last_seen_id)
    }

    /// Record that the user has looked at the feed.
    ///
    /// Advances the persisted cursor if `latest_id_in_view` is newer;
    /// regardless, zeroes the badge — viewing an empty feed still clears
    /// it, even though no id can be determined.
    pub async fn mark_seen(
        &self,
        variant: FeedVariant,
        latest_id_in_view: Option<i64>,
    ) -> Result<(), StoreError> {
        let advanced_to = {
            let mut states = self.states.lock().await;
            let state = states.entry(variant).or_default();
            let (merged, advanced) = advance_cursor(state.last_seen_id, latest_id_in_view);
            state.last_seen_id = merged;
            state.new_count = 0;
            advanced.then_some(merged).flatten()
        };

        if let Some(id) = advanced_to {
            self.persistence
                .set(variant.cursor_key(), &id.to_string())
                .await?;
        }
        Ok(())
    }

    /// Ask the status endpoint how many items are newer than the cursor and
    /// set the badge from the answer.
    ///
    /// On failure the last known count is silently retained; background
    /// polling never surfaces errors to the user.
    pub async fn poll_status(
        &self,
        variant: FeedVariant,
        identity: Option<&IdentityToken>,
    ) -> Result<u32, FeedError> {
        let since_id = self.last_seen(variant).await;
        let count = self
            .status
            .fetch_unread_count(variant, identity, since_id)
            .await?;

        let mut states = self.states.lock().await;
        states.entry(variant).or_default().new_count = count;
        Ok(count)
    }

    /// Optimistically zero the badge, then reconcile with the server.
    pub async fn force_refresh(
        &self,
        variant: FeedVariant,
        identity: Option<&IdentityToken>,
    ) -> Result<u32, FeedError> {
        self.states.lock().await.entry(variant).or_default().new_count = 0;
        self.poll_status(variant, identity).await
    }

    /// Full-state clear (logout): drop persisted cursors and reset both
    /// variants to never-seen. The only sanctioned way to move a cursor
    /// backward.
    pub async fn clear(&self) -> Result<(), StoreError> {
        for variant in [FeedVariant::Latest, FeedVariant::Following] {
            self.persistence.remove(variant.cursor_key()).await?;
        }
        let mut states = self.states.lock().await;
        for state in states.values_mut() {
            *state = NotificationState::default();
        }
        Ok(())
    }
}

impl<S, P> NotificationTracker<S, P>
where
    S: UnreadStatusFetcher + 'static,
    P: Persistence + 'static,
{
    /// Spawn the background poll loop for `variant`.
    ///
    /// Ticks immediately, then every `interval`. Poll failures are logged
    /// at debug and otherwise ignored. Abort the returned handle to stop.
    pub fn spawn_poller(
        self: &Arc<Self>,
        variant: FeedVariant,
        identity: Option<IdentityToken>,
        interval: Duration,
    ) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = tracker.poll_status(variant, identity.as_ref()).await {
                    tracing::debug!(
                        variant = %variant,
                        error = %e,
                        "Unread poll failed, keeping last known count"
                    );
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    /// Status fetcher returning a scripted count and recording the cursor
    /// it was called with.
    #[derive(Default)]
    struct FakeStatus {
        count: AtomicU32,
        fail: AtomicBool,
        last_since: Mutex<Option<Option<i64>>>,
    }

    impl UnreadStatusFetcher for FakeStatus {
        async fn fetch_unread_count(
            &self,
            _variant: FeedVariant,
            _identity: Option<&IdentityToken>,
            since_id: Option<i64>,
        ) -> Result<u32, FeedError> {
            *self.last_since.lock().await = Some(since_id);
            if self.fail.load(Ordering::SeqCst) {
                return Err(FeedError::Timeout);
            }
            Ok(self.count.load(Ordering::SeqCst))
        }
    }

    async fn tracker() -> NotificationTracker<FakeStatus, MemoryStore> {
        NotificationTracker::load(FakeStatus::default(), MemoryStore::new()).await
    }

    #[test]
    fn test_advance_cursor_monotonic() {
        assert_eq!(advance_cursor(None, Some(5)), (Some(5), true));
        assert_eq!(advance_cursor(Some(5), Some(7)), (Some(7), true));
        assert_eq!(advance_cursor(Some(5), Some(3)), (Some(5), false));
        assert_eq!(advance_cursor(Some(5), None), (Some(5), false));
        assert_eq!(advance_cursor(None, None), (None, false));
    }

    proptest! {
        #[test]
        fn prop_cursor_never_moves_backward(
            current in proptest::option::of(any::<i64>()),
            candidate in proptest::option::of(any::<i64>()),
        ) {
            let (merged, _) = advance_cursor(current, candidate);
            if let (Some(cur), Some(m)) = (current, merged) {
                prop_assert!(m >= cur);
            }
        }

        #[test]
        fn prop_cursor_merge_is_idempotent(
            current in proptest::option::of(any::<i64>()),
            candidate in proptest::option::of(any::<i64>()),
        ) {
            let (once, _) = advance_cursor(current, candidate);
            let (twice, advanced) = advance_cursor(once, candidate);
            prop_assert_eq!(once, twice);
            prop_assert!(!advanced);
        }
    }

    #[tokio::test]
    async fn test_mark_seen_is_monotonic_and_idempotent() {
        let t = tracker().await;
        t.mark_seen(FeedVariant::Latest, Some(5)).await.unwrap();
        t.mark_seen(FeedVariant::Latest, Some(5)).await.unwrap();
        t.mark_seen(FeedVariant::Latest, Some(3)).await.unwrap();
        assert_eq!(t.last_seen(FeedVariant::Latest).await, Some(5));
    }

    #[tokio::test]
    async fn test_mark_seen_clears_badge_even_without_id() {
        let t = tracker().await;
        t.status.count.store(9, Ordering::SeqCst);
        t.poll_status(FeedVariant::Latest, None).await.unwrap();
        assert_eq!(t.new_count(FeedVariant::Latest).await, 9);

        // Empty feed in view: no id to advance to, badge still clears.
        t.mark_seen(FeedVariant::Latest, None).await.unwrap();
        assert_eq!(t.new_count(FeedVariant::Latest).await, 0);
        assert_eq!(t.last_seen(FeedVariant::Latest).await, None);
    }

    #[tokio::test]
    async fn test_poll_passes_cursor_and_sets_count() {
        let t = tracker().await;
        t.mark_seen(FeedVariant::Latest, Some(41)).await.unwrap();
        t.status.count.store(3, Ordering::SeqCst);

        let count = t.poll_status(FeedVariant::Latest, None).await.unwrap();
        assert_eq!(count, 3);
        assert_eq!(t.new_count(FeedVariant::Latest).await, 3);
        assert_eq!(*t.status.last_since.lock().await, Some(Some(41)));
    }

    #[tokio::test]
    async fn test_poll_failure_retains_last_count() {
        let t = tracker().await;
        t.status.count.store(4, Ordering::SeqCst);
        t.poll_status(FeedVariant::Latest, None).await.unwrap();

        t.status.fail.store(true, Ordering::SeqCst);
        assert!(t.poll_status(FeedVariant::Latest, None).await.is_err());
        assert_eq!(t.new_count(FeedVariant::Latest).await, 4);
    }

    #[tokio::test]
    async fn test_force_refresh_zeroes_then_reconciles() {
        let t = tracker().await;
        t.status.count.store(6, Ordering::SeqCst);
        t.poll_status(FeedVariant::Latest, None).await.unwrap();

        t.status.count.store(2, Ordering::SeqCst);
        let count = t.force_refresh(FeedVariant::Latest, None).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(t.new_count(FeedVariant::Latest).await, 2);
    }

    #[tokio::test]
    async fn test_cursor_persists_across_restart() {
        let persistence = MemoryStore::new();
        {
            let t = NotificationTracker::load(FakeStatus::default(), &persistence).await;
            t.mark_seen(FeedVariant::Following, Some(88)).await.unwrap();
        }
        let t = NotificationTracker::load(FakeStatus::default(), &persistence).await;
        assert_eq!(t.last_seen(FeedVariant::Following).await, Some(88));
        // Badge count is session state, not persisted.
        assert_eq!(t.new_count(FeedVariant::Following).await, 0);
    }

    #[tokio::test]
    async fn test_corrupt_cursor_rehydrates_as_never_seen() {
        let persistence = MemoryStore::new();
        persistence
            .set(FeedVariant::Latest.cursor_key(), "not-a-number")
            .await
            .unwrap();

        let t = NotificationTracker::load(FakeStatus::default(), &persistence).await;
        assert_eq!(t.last_seen(FeedVariant::Latest).await, None);
    }

    #[tokio::test]
    async fn test_clear_resets_both_variants() {
        let persistence = MemoryStore::new();
        let t = NotificationTracker::load(FakeStatus::default(), &persistence).await;
        t.mark_seen(FeedVariant::Latest, Some(10)).await.unwrap();
        t.mark_seen(FeedVariant::Following, Some(20)).await.unwrap();

        t.clear().await.unwrap();
        assert_eq!(t.last_seen(FeedVariant::Latest).await, None);
        assert_eq!(t.last_seen(FeedVariant::Following).await, None);
        assert_eq!(
            persistence.get(FeedVariant::Latest.cursor_key()).await.unwrap(),
            None
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_ticks_on_interval() {
        let t = Arc::new(tracker().await);
        t.status.count.store(5, Ordering::SeqCst);

        let handle = t.spawn_poller(FeedVariant::Latest, None, Duration::from_secs(30));

        // First tick fires immediately.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(t.new_count(FeedVariant::Latest).await, 5);

        t.status.count.store(8, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(t.new_count(FeedVariant::Latest).await, 8);

        handle.abort();
    }
}
