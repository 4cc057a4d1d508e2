//! Core data model: feed items, pages, cache keys, and the wire DTOs they
//! are decoded from.
//!
//! `FeedItem` is the normalized in-memory shape. String fields use `Arc<str>`
//! so items can be cloned cheaply out of the page cache into view lists.
//! The raw `Raw*` types mirror the server's JSON and are converted exactly
//! once, at page-ingest time, where malformed items are also filtered out.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

// ============================================================================
// Identity
// ============================================================================

/// An opaque identity token scoping the "following" feed to a user.
///
/// Wraps `SecretString` so the token never leaks through `Debug` output or
/// log fields. Equality and hashing are defined over the token value because
/// the token participates in [`FeedCacheKey`]: two sessions with different
/// tokens must not share cached pages.
#[derive(Clone)]
pub struct IdentityToken(Arc<SecretString>);

impl IdentityToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(Arc::new(SecretString::from(raw.into())))
    }

    /// Expose the raw token for constructing an `Authorization` header.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl PartialEq for IdentityToken {
    fn eq(&self, other: &Self) -> bool {
        self.0.expose_secret() == other.0.expose_secret()
    }
}

impl Eq for IdentityToken {}

impl Hash for IdentityToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.expose_secret().hash(state);
    }
}

impl std::fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("IdentityToken([REDACTED])")
    }
}

// ============================================================================
// Feed variants and cache keys
// ============================================================================

/// One of the two feed streams the client can display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedVariant {
    /// Global recommendation stream, fetchable anonymously.
    Latest,
    /// Identity-scoped stream; requires a token to fetch at all.
    Following,
}

impl FeedVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedVariant::Latest => "latest",
            FeedVariant::Following => "following",
        }
    }

    /// Dotted persistence key for this variant's last-seen cursor.
    pub fn cursor_key(&self) -> &'static str {
        match self {
            FeedVariant::Latest => "feed.last_seen.latest",
            FeedVariant::Following => "feed.last_seen.following",
        }
    }
}

impl std::fmt::Display for FeedVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache key for one independently-cached feed: variant plus the identity it
/// was fetched under. Both variants persist in cache across tab switches;
/// only an explicit refresh or invalidation drops pages.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedCacheKey {
    pub variant: FeedVariant,
    pub identity: Option<IdentityToken>,
}

impl FeedCacheKey {
    pub fn new(variant: FeedVariant, identity: Option<IdentityToken>) -> Self {
        Self { variant, identity }
    }

    pub fn latest() -> Self {
        Self::new(FeedVariant::Latest, None)
    }

    pub fn following(identity: IdentityToken) -> Self {
        Self::new(FeedVariant::Following, Some(identity))
    }
}

// ============================================================================
// Target classification
// ============================================================================

/// What a feed item points at.
///
/// Uses an `Other` catch-all for forward compatibility: the server adds
/// target types over time and an unknown string must not fail page decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetType {
    Article,
    Post,
    Action,
    Tool,
    User,
    Deleted,
    Other(Arc<str>),
}

impl TargetType {
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "article" => TargetType::Article,
            "post" => TargetType::Post,
            "action" => TargetType::Action,
            "tool" => TargetType::Tool,
            "user" => TargetType::User,
            "deleted" => TargetType::Deleted,
            other => TargetType::Other(Arc::from(other)),
        }
    }
}

// ============================================================================
// Feed items
// ============================================================================

/// One shareable unit in a feed.
///
/// Immutable after ingest except for the viewer-relative fields
/// (`is_liked`, `is_collected`, the two `*_action_id`s) and the counters,
/// which the mutation propagator updates in place inside the owning page.
///
/// `original_action` forms a singly-linked backward chain of reposts. The
/// links are server-supplied data and are not guaranteed acyclic; only the
/// bounded walk in [`crate::feed::chain`] may traverse them.
#[derive(Debug, Clone)]
pub struct FeedItem {
    /// Unique id, monotonically increasing at creation time. Doubles as the
    /// ordering key and the unread cursor.
    pub action_id: i64,
    pub sharer_id: Option<i64>,
    pub sharer_username: Arc<str>,
    pub is_repost: bool,
    pub original_action: Option<Box<FeedItem>>,
    pub target_type: TargetType,
    pub target_id: Option<i64>,
    pub target_title: Option<Arc<str>>,
    pub target_slug: Option<Arc<str>>,
    /// Ordered image references; order is meaningful for deduplication.
    pub images: Vec<Arc<str>>,
    pub likes_count: u32,
    pub collects_count: u32,
    pub reposts_count: u32,
    pub comment_count: u32,
    pub is_liked: bool,
    pub is_collected: bool,
    /// Id of the viewer's own like action, used to address the undo endpoint.
    pub like_action_id: Option<i64>,
    pub collect_action_id: Option<i64>,
    pub is_deleted: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl FeedItem {
    /// A terminal tombstone: the content is gone and there is nothing behind
    /// it. Rendered as a "content removed" notice.
    ///
    /// A deleted item that still carries an `original_action` is an
    /// intermediate repost of now-deleted content and is NOT a tombstone for
    /// display purposes; the tombstone appears at its own deeper chain level.
    pub fn is_terminal_tombstone(&self) -> bool {
        (self.is_deleted || self.target_type == TargetType::Deleted)
            && self.original_action.is_none()
    }

    /// Malformed items are dropped at page ingest: deleted with no sharer
    /// username means the server sent us a husk we cannot attribute.
    pub fn is_malformed(&self) -> bool {
        self.is_deleted && self.sharer_username.is_empty()
    }
}

// ============================================================================
// Pages
// ============================================================================

/// One fetched page of a feed.
#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<FeedItem>,
    pub page_number: u32,
    /// Absent means end-of-feed.
    pub next_page: Option<u32>,
    pub total_pages: u32,
}

impl Page {
    /// Convert a decoded wire page, dropping malformed items.
    ///
    /// Deleted reposts are retained so their chain context still renders;
    /// only deleted items with no sharer username are filtered.
    pub fn from_raw(raw: RawPage) -> Self {
        let total = raw.items.len();
        let items: Vec<FeedItem> = raw
            .items
            .into_iter()
            .map(RawFeedItem::into_item)
            .filter(|item| !item.is_malformed())
            .collect();

        let dropped = total - items.len();
        if dropped > 0 {
            tracing::warn!(
                page = raw.current_page,
                dropped = dropped,
                "Dropped malformed items from fetched page"
            );
        }

        let next_page = if raw.current_page < raw.total_pages {
            Some(raw.current_page + 1)
        } else {
            None
        };

        Page {
            items,
            page_number: raw.current_page,
            next_page,
            total_pages: raw.total_pages,
        }
    }
}

// ============================================================================
// Wire DTOs
// ============================================================================

/// Feed item as the server sends it. Every field except `action_id` is
/// defaulted so a sparse or partially-deleted item still decodes; the
/// malformed-item filter runs after conversion, not during decode.
#[derive(Debug, Deserialize)]
pub struct RawFeedItem {
    pub action_id: i64,
    #[serde(default)]
    pub sharer_id: Option<i64>,
    #[serde(default)]
    pub sharer_username: String,
    #[serde(default)]
    pub is_repost: bool,
    #[serde(default)]
    pub original_action: Option<Box<RawFeedItem>>,
    #[serde(default)]
    pub target_type: Option<String>,
    #[serde(default)]
    pub target_id: Option<i64>,
    #[serde(default)]
    pub target_title: Option<String>,
    #[serde(default)]
    pub target_slug: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub likes_count: i64,
    #[serde(default)]
    pub collects_count: i64,
    #[serde(default)]
    pub reposts_count: i64,
    #[serde(default)]
    pub comment_count: i64,
    #[serde(default)]
    pub is_liked: bool,
    #[serde(default)]
    pub is_collected: bool,
    #[serde(default)]
    pub like_action_id: Option<i64>,
    #[serde(default)]
    pub collect_action_id: Option<i64>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl RawFeedItem {
    /// Normalize into the in-memory shape: clamp negative counters to zero,
    /// map the target type string, recurse into the repost backlink.
    pub fn into_item(self) -> FeedItem {
        FeedItem {
            action_id: self.action_id,
            sharer_id: self.sharer_id,
            sharer_username: Arc::from(self.sharer_username),
            is_repost: self.is_repost,
            original_action: self
                .original_action
                .map(|raw| Box::new(raw.into_item())),
            target_type: self
                .target_type
                .as_deref()
                .map(TargetType::from_wire)
                .unwrap_or(TargetType::Post),
            target_id: self.target_id,
            target_title: self.target_title.map(Arc::from),
            target_slug: self.target_slug.map(Arc::from),
            images: self.images.into_iter().map(Arc::from).collect(),
            likes_count: self.likes_count.max(0) as u32,
            collects_count: self.collects_count.max(0) as u32,
            reposts_count: self.reposts_count.max(0) as u32,
            comment_count: self.comment_count.max(0) as u32,
            is_liked: self.is_liked,
            is_collected: self.is_collected,
            like_action_id: self.like_action_id,
            collect_action_id: self.collect_action_id,
            is_deleted: self.is_deleted,
            created_at: self.created_at,
        }
    }
}

/// One page of feed items as the server sends it.
#[derive(Debug, Deserialize)]
pub struct RawPage {
    #[serde(default)]
    pub items: Vec<RawFeedItem>,
    pub current_page: u32,
    pub total_pages: u32,
}

/// Response of the lightweight unread-status endpoint.
#[derive(Debug, Deserialize)]
pub struct RawUnreadStatus {
    pub unread_count: u32,
}

/// Authoritative result of a like/collect toggle mutation.
///
/// `new_count` is optional because some backends only acknowledge success;
/// the propagator derives the count locally when it is absent.
#[derive(Debug, Clone, Deserialize)]
pub struct ToggleOutcome {
    pub new_state: bool,
    #[serde(default)]
    pub new_count: Option<u32>,
    /// Id of the write action just created (present when `new_state` is
    /// true), needed later to address the undo endpoint.
    #[serde(default)]
    pub action_id: Option<i64>,
}

/// Test fixtures shared across the crate's unit tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub(crate) fn bare_item(action_id: i64) -> FeedItem {
        FeedItem {
            action_id,
            sharer_id: Some(1),
            sharer_username: Arc::from("alice"),
            is_repost: false,
            original_action: None,
            target_type: TargetType::Post,
            target_id: Some(100),
            target_title: None,
            target_slug: None,
            images: Vec::new(),
            likes_count: 0,
            collects_count: 0,
            reposts_count: 0,
            comment_count: 0,
            is_liked: false,
            is_collected: false,
            like_action_id: None,
            collect_action_id: None,
            is_deleted: false,
            created_at: None,
        }
    }

    pub(crate) fn page(page_number: u32, total_pages: u32, ids: &[i64]) -> Page {
        Page {
            items: ids.iter().copied().map(bare_item).collect(),
            page_number,
            next_page: if page_number < total_pages {
                Some(page_number + 1)
            } else {
                None
            },
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::bare_item;
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_identity_token_debug_is_redacted() {
        let token = IdentityToken::new("super-secret");
        assert_eq!(format!("{:?}", token), "IdentityToken([REDACTED])");
    }

    #[test]
    fn test_identity_token_equality() {
        let a = IdentityToken::new("t1");
        let b = IdentityToken::new("t1");
        let c = IdentityToken::new("t2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_target_type_unknown_string_roundtrips_as_other() {
        match TargetType::from_wire("poll") {
            TargetType::Other(s) => assert_eq!(&*s, "poll"),
            other => panic!("expected Other, got {:?}", other),
        }
    }

    #[test]
    fn test_raw_item_clamps_negative_counters() {
        let raw: RawFeedItem = serde_json::from_value(serde_json::json!({
            "action_id": 7,
            "sharer_username": "bob",
            "likes_count": -3
        }))
        .unwrap();
        let item = raw.into_item();
        assert_eq!(item.likes_count, 0);
    }

    #[test]
    fn test_page_from_raw_filters_malformed_items() {
        let raw: RawPage = serde_json::from_value(serde_json::json!({
            "items": [
                { "action_id": 1, "sharer_username": "alice" },
                { "action_id": 2, "sharer_username": "", "is_deleted": true },
                { "action_id": 3, "sharer_username": "carol", "is_deleted": true }
            ],
            "current_page": 1,
            "total_pages": 3
        }))
        .unwrap();

        let page = Page::from_raw(raw);
        let ids: Vec<i64> = page.items.iter().map(|i| i.action_id).collect();
        // The deleted item with a sharer survives; the husk does not.
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(page.next_page, Some(2));
    }

    #[test]
    fn test_page_from_raw_last_page_has_no_next() {
        let raw: RawPage = serde_json::from_value(serde_json::json!({
            "items": [],
            "current_page": 3,
            "total_pages": 3
        }))
        .unwrap();
        assert_eq!(Page::from_raw(raw).next_page, None);
    }

    #[test]
    fn test_terminal_tombstone_classification() {
        let mut tombstone = bare_item(1);
        tombstone.target_type = TargetType::Deleted;
        tombstone.is_deleted = true;
        assert!(tombstone.is_terminal_tombstone());

        let mut intermediate = bare_item(2);
        intermediate.target_type = TargetType::Deleted;
        intermediate.original_action = Some(Box::new(bare_item(1)));
        assert!(!intermediate.is_terminal_tombstone());
    }

    #[test]
    fn test_nested_original_action_decodes() {
        let raw: RawFeedItem = serde_json::from_value(serde_json::json!({
            "action_id": 10,
            "sharer_username": "alice",
            "is_repost": true,
            "original_action": {
                "action_id": 5,
                "sharer_username": "bob"
            }
        }))
        .unwrap();
        let item = raw.into_item();
        assert_eq!(item.original_action.unwrap().action_id, 5);
    }
}
