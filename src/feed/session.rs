//! Feed page fetching and the per-poll walk over its posts.

use std::sync::LazyLock;

use chrono::{Duration, Local, NaiveDateTime};
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use super::assemble::{PostAssembler, PostDraft};
use super::client::{Endpoints, FeedClient};
use super::continuation::ContinuationResolver;
use super::error::FeedError;
use super::markup::PostNode;
use super::post::Post;
use super::time::TIME_FORMAT;

#[allow(clippy::expect_used)]
static CONTAINER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.c").expect("valid selector"));

/// Fetch attempts per load before the page counts as empty.
pub const LOAD_ATTEMPTS: usize = 3;
/// Consecutive empty loads tolerated before polling should stop.
pub const MAX_EMPTY_POLLS: u32 = 2;
/// Posts up to this much older than the watermark are still taken.
pub const SINCE_GRACE_MINUTES: i64 = 1;

/// A fetched feed page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSnapshot {
    html: String,
    valid: bool,
}

impl PageSnapshot {
    #[must_use]
    pub fn new(html: String) -> Self {
        let valid = is_structurally_valid(&html);
        Self { html, valid }
    }

    #[must_use]
    pub fn html(&self) -> &str {
        &self.html
    }

    /// Whether the first container carries post content.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Whether the page's first `div.c` holds a content span.
#[must_use]
pub fn is_structurally_valid(html: &str) -> bool {
    let document = Html::parse_document(html);
    document
        .select(&CONTAINER)
        .next()
        .is_some_and(|container| PostNode::new(container).has_content())
}

/// Result of one poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedPage {
    pub posts: Vec<Post>,
    pub seen_ids: Vec<String>,
    pub to_continue: bool,
}

/// Drafts picked from a snapshot, and whether the watermark was crossed.
struct Selection {
    drafts: Vec<PostDraft>,
    reached_watermark: bool,
}

/// Fetches the home feed and turns it into posts.
pub struct PageSession<C> {
    client: C,
    endpoints: Endpoints,
    assembler: PostAssembler,
    snapshot: Option<PageSnapshot>,
    empty_polls: u32,
    to_continue: bool,
}

impl<C: FeedClient> PageSession<C> {
    #[must_use]
    pub fn new(client: C, endpoints: Endpoints, filter_reposts: bool) -> Self {
        Self {
            client,
            endpoints,
            assembler: PostAssembler::new(filter_reposts),
            snapshot: None,
            empty_polls: 0,
            to_continue: true,
        }
    }

    #[must_use]
    pub fn client(&self) -> &C {
        &self.client
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<&PageSnapshot> {
        self.snapshot.as_ref()
    }

    #[must_use]
    pub fn empty_polls(&self) -> u32 {
        self.empty_polls
    }

    #[must_use]
    pub fn to_continue(&self) -> bool {
        self.to_continue
    }

    /// Fetch the feed page, retrying until a structurally valid one arrives.
    pub async fn load(&mut self) {
        self.to_continue = true;
        let url = self.endpoints.home();
        let mut snapshot = None;

        for attempt in 1..=LOAD_ATTEMPTS {
            match self.client.fetch_page(&url).await {
                Ok(html) => {
                    let fetched = PageSnapshot::new(html);
                    let valid = fetched.is_valid();
                    snapshot = Some(fetched);
                    if valid {
                        break;
                    }
                    debug!(attempt, "Feed page has no post content");
                }
                Err(e) => warn!(attempt, "Failed to fetch feed page: {e}"),
            }
        }

        if snapshot.as_ref().is_some_and(PageSnapshot::is_valid) {
            self.empty_polls = 0;
        } else {
            self.empty_polls += 1;
            warn!(empty_polls = self.empty_polls, "Feed page came back empty");
        }
        if self.empty_polls > MAX_EMPTY_POLLS {
            info!("Feed stayed empty, signalling the caller to stop");
            self.to_continue = false;
            self.empty_polls = 0;
        }
        self.snapshot = snapshot;
    }

    /// Load the feed and collect the posts newer than `since`.
    ///
    /// # Errors
    ///
    /// Returns the fatal [`FeedError`]s of the extraction pipeline.
    pub async fn poll(
        &mut self,
        seen_ids: Vec<String>,
        since: NaiveDateTime,
    ) -> Result<FeedPage, FeedError> {
        self.load().await;
        self.get_one_page(seen_ids, since, Local::now().naive_local())
            .await
    }

    /// Walk the loaded page and assemble every unseen post.
    ///
    /// The last container is the pagination footer and is never read. The walk
    /// stops with `to_continue = false` at the first post published before
    /// `since` minus the grace window.
    ///
    /// # Errors
    ///
    /// Returns the fatal [`FeedError`]s of the extraction pipeline.
    pub async fn get_one_page(
        &self,
        mut seen_ids: Vec<String>,
        since: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Result<FeedPage, FeedError> {
        let Some(snapshot) = self.snapshot.as_ref().filter(|s| s.is_valid()) else {
            info!("fetched 0 posts");
            return Ok(FeedPage {
                posts: Vec::new(),
                seen_ids,
                to_continue: self.to_continue,
            });
        };

        let cutoff = since - Duration::minutes(SINCE_GRACE_MINUTES);
        let selection = self.select(snapshot.html(), &mut seen_ids, cutoff, now)?;

        let resolver = ContinuationResolver::new(&self.client, &self.endpoints);
        let mut posts = Vec::with_capacity(selection.drafts.len());
        for draft in selection.drafts {
            let post = self.assembler.resolve(draft, &resolver).await;
            debug!(post_id = %post.id, user_id = %post.user_id, "Assembled post\n{post}");
            posts.push(post);
        }

        info!(count = posts.len(), "fetched {} posts", posts.len());
        let to_continue = if selection.reached_watermark {
            false
        } else {
            self.to_continue
        };
        Ok(FeedPage {
            posts,
            seen_ids,
            to_continue,
        })
    }

    /// Scan containers in page order, applying the seen-id and watermark rules.
    fn select(
        &self,
        html: &str,
        seen_ids: &mut Vec<String>,
        cutoff: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Result<Selection, FeedError> {
        let document = Html::parse_document(html);
        let containers: Vec<_> = document.select(&CONTAINER).collect();
        let post_containers = containers.len().saturating_sub(1);

        let mut drafts = Vec::new();
        for container in containers.into_iter().take(post_containers) {
            let Some(draft) = self.assembler.scan(&PostNode::new(container), now)? else {
                continue;
            };
            if seen_ids.iter().any(|id| id == draft.id()) {
                continue;
            }

            if let Some(published) = draft.publish_time() {
                debug!(
                    post_id = %draft.id(),
                    publish_time = %published.format(TIME_FORMAT),
                    cutoff = %cutoff.format(TIME_FORMAT),
                    "Checking post against watermark"
                );
                if published < cutoff {
                    info!(post_id = %draft.id(), "Post published before the watermark, stopping");
                    return Ok(Selection {
                        drafts,
                        reached_watermark: true,
                    });
                }
            }

            seen_ids.push(draft.id().to_string());
            drafts.push(draft);
        }

        Ok(Selection {
            drafts,
            reached_watermark: false,
        })
    }
}
