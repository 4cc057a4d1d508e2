//! Feed synchronization and repost-chain engine for the Ripple content
//! platform client.
//!
//! This crate is the stateful core behind the client's infinitely-scrolling
//! social feeds. It owns the things the UI layer must never get wrong:
//!
//! - a consistent page cache across the "latest" and "following" feed
//!   variants, patched in place after write actions instead of refetched;
//! - at most one outstanding page fetch per feed, with stale responses
//!   discarded after a refresh;
//! - per-variant unread badges backed by a persisted, monotonically
//!   advancing last-seen cursor;
//! - bounded reconstruction of repost chains from collaborator-supplied
//!   backlinks, with images deduplicated to the first chain level they
//!   appear at.
//!
//! Routing, rendering, comments, and auth flows live in the surrounding
//! client and consume this crate through [`engine::FeedEngine`] or the
//! individual components.

pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod model;
pub mod notify;
pub mod storage;

pub use config::Config;
pub use engine::{FeedEngine, HttpFeedEngine, PollerGuard};
pub use error::FeedError;
pub use feed::{
    build_chain, node_role, owned_images, ChainNodeRole, FeedSynchronizer, HttpClient,
    LoadOutcome, LoadPhase, MutationExecutor, MutationPropagator, PageFetcher, PageStore,
    UnreadStatusFetcher, MAX_CHAIN_DEPTH,
};
pub use model::{
    FeedCacheKey, FeedItem, FeedVariant, IdentityToken, Page, TargetType, ToggleOutcome,
};
pub use notify::{NotificationState, NotificationTracker};
pub use storage::{MemoryStore, Persistence, SqliteStore, StoreError};
