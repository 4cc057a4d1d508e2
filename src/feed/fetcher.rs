//! Collaborator contracts for feed I/O, plus their HTTP implementations.
//!
//! The engine only ever talks to the outside world through these traits:
//! page retrieval, unread-status polling, and write mutations. Concrete
//! transport lives in [`HttpClient`]; tests substitute scripted fakes.

use crate::config::Config;
use crate::error::FeedError;
use crate::model::{FeedItem, FeedVariant, IdentityToken, RawPage, RawUnreadStatus, ToggleOutcome};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use url::Url;

/// Retrieves one page of a feed.
pub trait PageFetcher: Send + Sync {
    fn fetch_page(
        &self,
        variant: FeedVariant,
        identity: Option<&IdentityToken>,
        page: u32,
    ) -> impl Future<Output = Result<RawPage, FeedError>> + Send;
}

/// Reports how many items are newer than a cursor, without fetching them.
pub trait UnreadStatusFetcher: Send + Sync {
    fn fetch_unread_count(
        &self,
        variant: FeedVariant,
        identity: Option<&IdentityToken>,
        since_id: Option<i64>,
    ) -> impl Future<Output = Result<u32, FeedError>> + Send;
}

/// Performs like/collect write mutations against the backend.
///
/// Implementations decide between the "create" and "undo" endpoints based on
/// the item's current viewer-relative state and stored action ids.
pub trait MutationExecutor: Send + Sync {
    fn toggle_like(
        &self,
        identity: Option<&IdentityToken>,
        item: &FeedItem,
    ) -> impl Future<Output = Result<ToggleOutcome, FeedError>> + Send;

    fn toggle_collect(
        &self,
        identity: Option<&IdentityToken>,
        item: &FeedItem,
    ) -> impl Future<Output = Result<ToggleOutcome, FeedError>> + Send;
}

// ============================================================================
// HTTP implementation
// ============================================================================

/// HTTP client for the platform's feed API, implementing all three
/// collaborator traits.
///
/// Requests carry a bearer identity header when a token is present, are
/// bounded by the configured timeout, and map 401/403 responses to
/// [`FeedError::AuthRequired`] so callers can prompt re-authentication.
/// No retry loop lives here: transient errors are surfaced and the caller
/// decides whether to retry (a failed `load_more` keeps cached items
/// visible, so retry is always safe).
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(config: &Config) -> Result<Self, url::ParseError> {
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: Url::parse(&config.api_base_url)?,
            timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, FeedError> {
        // Base URL is validated at construction; a join failure means the
        // path itself is malformed. Surface it in the decode bucket rather
        // than masking it as a network error.
        self.base_url
            .join(path)
            .map_err(|e| FeedError::Decode(serde::de::Error::custom(e.to_string())))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        identity: Option<&IdentityToken>,
    ) -> Result<T, FeedError> {
        let request = match identity {
            Some(token) => request.bearer_auth(token.expose()),
            None => request,
        };

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| FeedError::Timeout)?
            .map_err(FeedError::Network)?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(FeedError::AuthRequired);
        }
        if !status.is_success() {
            return Err(FeedError::HttpStatus(status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(FeedError::Network)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl PageFetcher for HttpClient {
    async fn fetch_page(
        &self,
        variant: FeedVariant,
        identity: Option<&IdentityToken>,
        page: u32,
    ) -> Result<RawPage, FeedError> {
        let mut url = self.endpoint(&format!("feeds/{}", variant.as_str()))?;
        url.query_pairs_mut().append_pair("page", &page.to_string());

        tracing::debug!(variant = %variant, page = page, "Fetching feed page");
        self.send_json(self.client.get(url), identity).await
    }
}

impl UnreadStatusFetcher for HttpClient {
    async fn fetch_unread_count(
        &self,
        variant: FeedVariant,
        identity: Option<&IdentityToken>,
        since_id: Option<i64>,
    ) -> Result<u32, FeedError> {
        let mut url = self.endpoint(&format!("feeds/{}/unread", variant.as_str()))?;
        if let Some(since) = since_id {
            url.query_pairs_mut()
                .append_pair("since_id", &since.to_string());
        }

        let status: RawUnreadStatus = self.send_json(self.client.get(url), identity).await?;
        Ok(status.unread_count)
    }
}

impl MutationExecutor for HttpClient {
    async fn toggle_like(
        &self,
        identity: Option<&IdentityToken>,
        item: &FeedItem,
    ) -> Result<ToggleOutcome, FeedError> {
        if item.is_liked {
            // Undo addresses the viewer's own like action, falling back to
            // the target when the action id never made it into the cache.
            let url = match item.like_action_id {
                Some(id) => self.endpoint(&format!("actions/{}", id))?,
                None => self.endpoint(&format!("targets/{}/like", item.action_id))?,
            };
            self.send_json(self.client.delete(url), identity).await
        } else {
            let url = self.endpoint("actions/like")?;
            let body = serde_json::json!({ "action_id": item.action_id });
            self.send_json(self.client.post(url).json(&body), identity)
                .await
        }
    }

    async fn toggle_collect(
        &self,
        identity: Option<&IdentityToken>,
        item: &FeedItem,
    ) -> Result<ToggleOutcome, FeedError> {
        if item.is_collected {
            let url = match item.collect_action_id {
                Some(id) => self.endpoint(&format!("actions/{}", id))?,
                None => self.endpoint(&format!("targets/{}/collect", item.action_id))?,
            };
            self.send_json(self.client.delete(url), identity).await
        } else {
            let url = self.endpoint("actions/collect")?;
            let body = serde_json::json!({ "action_id": item.action_id });
            self.send_json(self.client.post(url).json(&body), identity)
                .await
        }
    }
}
