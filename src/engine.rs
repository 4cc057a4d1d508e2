//! `FeedEngine`: the assembled core, wiring the synchronizer, notification
//! tracker, and mutation propagator over one set of collaborators.
//!
//! The UI layer talks to this facade; the component types remain public for
//! callers that want to compose them differently.

use crate::config::Config;
use crate::error::FeedError;
use crate::feed::chain::{self, ChainNodeRole};
use crate::feed::fetcher::{HttpClient, MutationExecutor, PageFetcher, UnreadStatusFetcher};
use crate::feed::mutation::MutationPropagator;
use crate::feed::sync::{FeedSynchronizer, LoadOutcome};
use crate::model::{FeedCacheKey, FeedItem, FeedVariant, IdentityToken, ToggleOutcome};
use crate::notify::tracker::NotificationTracker;
use crate::storage::{Persistence, SqliteStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Aborts the background poll tasks when dropped.
pub struct PollerGuard {
    handles: Vec<JoinHandle<()>>,
}

impl Drop for PollerGuard {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// The assembled feed-sync core for one session.
pub struct FeedEngine<F, S, M, P> {
    synchronizer: FeedSynchronizer<F>,
    tracker: Arc<NotificationTracker<S, P>>,
    executor: M,
    propagator: MutationPropagator,
    identity: Option<IdentityToken>,
    poll_interval: Duration,
}

/// Engine over the bundled HTTP collaborators and SQLite persistence.
pub type HttpFeedEngine = FeedEngine<HttpClient, HttpClient, HttpClient, SqliteStore>;

impl HttpFeedEngine {
    /// Assemble the production engine from configuration.
    pub async fn connect(
        config: &Config,
        identity: Option<IdentityToken>,
    ) -> anyhow::Result<Self> {
        let client = HttpClient::new(config)?;
        let persistence = SqliteStore::open(&config.persistence_path).await?;
        Ok(Self::assemble(
            client.clone(),
            client.clone(),
            client,
            persistence,
            identity,
            Duration::from_secs(config.poll_interval_secs),
        )
        .await)
    }
}

impl<F, S, M, P> FeedEngine<F, S, M, P>
where
    F: PageFetcher,
    S: UnreadStatusFetcher,
    M: MutationExecutor,
    P: Persistence,
{
    pub async fn assemble(
        fetcher: F,
        status: S,
        executor: M,
        persistence: P,
        identity: Option<IdentityToken>,
        poll_interval: Duration,
    ) -> Self {
        let synchronizer = FeedSynchronizer::new(fetcher);
        let propagator = MutationPropagator::new(synchronizer.store());
        let tracker = Arc::new(NotificationTracker::load(status, persistence).await);
        Self {
            synchronizer,
            tracker,
            executor,
            propagator,
            identity,
            poll_interval,
        }
    }

    /// Cache key for `variant` under the session identity. The "following"
    /// variant is unavailable without one.
    pub fn key_for(&self, variant: FeedVariant) -> Result<FeedCacheKey, FeedError> {
        match variant {
            FeedVariant::Latest => Ok(FeedCacheKey::latest()),
            FeedVariant::Following => match &self.identity {
                Some(token) => Ok(FeedCacheKey::following(token.clone())),
                None => Err(FeedError::AuthRequired),
            },
        }
    }

    // ------------------------------------------------------------------
    // Feed surface
    // ------------------------------------------------------------------

    pub async fn visible_items(&self, variant: FeedVariant) -> Result<Vec<FeedItem>, FeedError> {
        let key = self.key_for(variant)?;
        Ok(self.synchronizer.visible_items(&key).await)
    }

    /// Open a feed: load page 1 if nothing is cached yet, then clear the
    /// badge against whatever is now at the head.
    pub async fn open_feed(&self, variant: FeedVariant) -> Result<LoadOutcome, FeedError> {
        let key = self.key_for(variant)?;
        let outcome = if self.synchronizer.visible_items(&key).await.is_empty() {
            self.synchronizer.load_initial(&key).await?
        } else {
            LoadOutcome::Loaded { new_items: 0 }
        };
        self.mark_seen(variant).await;
        Ok(outcome)
    }

    pub async fn load_more(&self, variant: FeedVariant) -> Result<LoadOutcome, FeedError> {
        let key = self.key_for(variant)?;
        self.synchronizer.load_more(&key).await
    }

    /// User-triggered refresh: re-fetch page 1 and clear the badge against
    /// the fresh head item.
    pub async fn refresh(&self, variant: FeedVariant) -> Result<LoadOutcome, FeedError> {
        let key = self.key_for(variant)?;
        let outcome = self.synchronizer.refresh(&key).await?;
        self.mark_seen(variant).await;
        Ok(outcome)
    }

    pub async fn has_next_page(&self, variant: FeedVariant) -> Result<bool, FeedError> {
        let key = self.key_for(variant)?;
        Ok(self.synchronizer.has_next_page(&key).await)
    }

    // ------------------------------------------------------------------
    // Repost chains
    // ------------------------------------------------------------------

    pub fn chain_for_item(&self, item: &FeedItem) -> Vec<FeedItem> {
        chain::build_chain(item)
    }

    pub fn owned_images(
        &self,
        chain_items: &[FeedItem],
        level: usize,
    ) -> Vec<std::sync::Arc<str>> {
        chain::owned_images(chain_items, level)
    }

    pub fn node_role(&self, node: &FeedItem) -> ChainNodeRole {
        chain::node_role(node)
    }

    // ------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------

    pub async fn new_count(&self, variant: FeedVariant) -> u32 {
        self.tracker.new_count(variant).await
    }

    /// Clear the badge for `variant`, advancing the cursor to the newest
    /// cached item when there is one. Persistence failures only cost the
    /// cursor durability, so they are logged rather than surfaced.
    pub async fn mark_seen(&self, variant: FeedVariant) {
        let head = match self.key_for(variant) {
            Ok(key) => self.synchronizer.head_item_id(&key).await,
            Err(_) => None,
        };
        if let Err(e) = self.tracker.mark_seen(variant, head).await {
            tracing::warn!(variant = %variant, error = %e, "Failed to persist last-seen cursor");
        }
    }

    pub async fn force_refresh_count(&self, variant: FeedVariant) -> Result<u32, FeedError> {
        self.tracker
            .force_refresh(variant, self.identity.as_ref())
            .await
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Execute a like toggle for `item` and patch the result into the
    /// cache. The cache is only touched after the authoritative outcome
    /// arrives, so a failed write needs no rollback.
    pub async fn toggle_like(
        &self,
        variant: FeedVariant,
        item: &FeedItem,
    ) -> Result<ToggleOutcome, FeedError> {
        let key = self.key_for(variant)?;
        let outcome = self
            .executor
            .toggle_like(self.identity.as_ref(), item)
            .await?;
        self.propagator
            .apply_like_toggle(&key, item.action_id, &outcome)
            .await;
        Ok(outcome)
    }

    pub async fn toggle_collect(
        &self,
        variant: FeedVariant,
        item: &FeedItem,
    ) -> Result<ToggleOutcome, FeedError> {
        let key = self.key_for(variant)?;
        let outcome = self
            .executor
            .toggle_collect(self.identity.as_ref(), item)
            .await?;
        self.propagator
            .apply_collect_toggle(&key, item.action_id, &outcome)
            .await;
        Ok(outcome)
    }

    /// Apply an externally-resolved toggle result (e.g. a compensating
    /// rollback after a failed optimistic write upstream).
    pub async fn apply_like_toggle(
        &self,
        variant: FeedVariant,
        action_id: i64,
        outcome: &ToggleOutcome,
    ) -> Result<(), FeedError> {
        let key = self.key_for(variant)?;
        self.propagator
            .apply_like_toggle(&key, action_id, outcome)
            .await;
        Ok(())
    }

    pub async fn apply_collect_toggle(
        &self,
        variant: FeedVariant,
        action_id: i64,
        outcome: &ToggleOutcome,
    ) -> Result<(), FeedError> {
        let key = self.key_for(variant)?;
        self.propagator
            .apply_collect_toggle(&key, action_id, outcome)
            .await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Tear down session state on logout: clear persisted cursors and drop
    /// both variants' cached pages.
    pub async fn logout(&mut self) -> Result<(), FeedError> {
        if let Err(e) = self.tracker.clear().await {
            tracing::warn!(error = %e, "Failed to clear persisted cursors on logout");
        }
        if let Ok(key) = self.key_for(FeedVariant::Following) {
            self.synchronizer.invalidate(&key).await;
        }
        self.synchronizer
            .invalidate(&FeedCacheKey::latest())
            .await;
        self.identity = None;
        Ok(())
    }
}

impl<F, S, M, P> FeedEngine<F, S, M, P>
where
    F: PageFetcher,
    S: UnreadStatusFetcher + 'static,
    M: MutationExecutor,
    P: Persistence + 'static,
{
    /// Start background unread polling for both variants (the "following"
    /// poller only when an identity is present). Polling stops when the
    /// returned guard is dropped.
    pub fn start_polling(&self) -> PollerGuard {
        let mut handles = vec![self.tracker.spawn_poller(
            FeedVariant::Latest,
            self.identity.clone(),
            self.poll_interval,
        )];
        if let Some(token) = &self.identity {
            handles.push(self.tracker.spawn_poller(
                FeedVariant::Following,
                Some(token.clone()),
                self.poll_interval,
            ));
        }
        PollerGuard { handles }
    }
}
