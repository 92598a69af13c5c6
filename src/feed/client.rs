//! HTTP collaborator used by the extraction pipeline.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use serde::Deserialize;
use tracing::{debug, warn};

use super::error::FetchError;
use crate::constants::BROWSER_USER_AGENT;

/// Href fragment of a mobile video page.
pub const VIDEO_PAGE_PATTERN: &str = "m.weibo.cn/s/video/show?object_id=";

/// Authenticated access to the feed site.
///
/// Implementations apply their own timeouts; callers never retry.
#[async_trait]
pub trait FeedClient: Send + Sync {
    /// GET a page with the session cookie and return its HTML.
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError>;

    /// Exchange a mobile video page URL for a direct stream URL.
    ///
    /// `Ok(None)` means the video exists but has no downloadable stream
    /// (live broadcasts) or the account may not view it.
    async fn resolve_video_stream(&self, video_page_url: &str)
        -> Result<Option<String>, FetchError>;
}

/// URLs of the feed and its detail pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: String,
}

impl Endpoints {
    #[must_use]
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// The home timeline.
    #[must_use]
    pub fn home(&self) -> String {
        format!("{}/", self.base)
    }

    /// Detail page of a post, used for full text and video lookups.
    #[must_use]
    pub fn comment(&self, post_id: &str) -> String {
        format!("{}/comment/{post_id}", self.base)
    }

    /// Gallery page listing every picture of a post.
    #[must_use]
    pub fn gallery(&self, post_id: &str) -> String {
        format!("{}/mblog/picAll/{post_id}?rl=1", self.base)
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(crate::constants::WEIBO_BASE_URL)
    }
}

/// `reqwest` implementation of [`FeedClient`].
#[derive(Debug, Clone)]
pub struct HttpFeedClient {
    client: reqwest::Client,
}

impl HttpFeedClient {
    /// Build a client that sends `cookie` with every request.
    ///
    /// # Errors
    ///
    /// Returns an error if the cookie is not a valid header value or the client
    /// cannot be built.
    pub fn new(cookie: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut cookie = HeaderValue::from_str(cookie).context("Cookie is not a valid header value")?;
        cookie.set_sensitive(true);
        headers.insert(COOKIE, cookie);

        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client })
    }

    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })
    }
}

#[derive(Debug, Deserialize)]
struct VideoObjectResponse {
    data: VideoObjectData,
}

#[derive(Debug, Deserialize)]
struct VideoObjectData {
    object: VideoObject,
}

#[derive(Debug, Deserialize)]
struct VideoObject {
    stream: VideoStream,
}

#[derive(Debug, Deserialize)]
struct VideoStream {
    hd_url: Option<String>,
    url: Option<String>,
}

/// JSON endpoint describing the video behind a mobile video page.
#[must_use]
pub fn video_object_url(video_page_url: &str) -> String {
    video_page_url.replace("/s/video/show", "/s/video/object")
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        debug!(url = %url, "Fetching page");
        self.get_text(url).await
    }

    async fn resolve_video_stream(
        &self,
        video_page_url: &str,
    ) -> Result<Option<String>, FetchError> {
        let object_url = video_object_url(video_page_url);
        let body = self.get_text(&object_url).await?;

        let Ok(parsed) = serde_json::from_str::<VideoObjectResponse>(&body) else {
            warn!(url = %video_page_url, "Account has no permission to view this video");
            return Ok(None);
        };

        let stream = parsed.data.object.stream;
        let url = stream
            .hd_url
            .filter(|u| !u.is_empty())
            .or_else(|| stream.url.filter(|u| !u.is_empty()));
        if url.is_none() {
            debug!(url = %video_page_url, "Video has no stream URL, probably a live broadcast");
        }
        Ok(url)
    }
}
