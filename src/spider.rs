//! The refresh loop tying the feed session to writers and downloaders.

use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::download::MediaDownloader;
use crate::feed::time::TIME_FORMAT;
use crate::feed::{FeedClient, FeedError, PageSession, PageSnapshot, Post};
use crate::writer::WriterSet;

/// Polls the home feed on a fixed interval and hands new posts onwards.
pub struct Spider<C> {
    session: PageSession<C>,
    writers: WriterSet,
    downloaders: Vec<MediaDownloader>,
    filter_reposts: bool,
    refresh_interval: Duration,
    seen_id_capacity: usize,
    seen_ids: Vec<String>,
    since: NaiveDateTime,
    stalled_polls: u32,
}

impl<C: FeedClient> Spider<C> {
    #[must_use]
    pub fn new(
        session: PageSession<C>,
        writers: WriterSet,
        downloaders: Vec<MediaDownloader>,
        config: &Config,
    ) -> Self {
        Self {
            session,
            writers,
            downloaders,
            filter_reposts: config.filter_reposts,
            refresh_interval: config.refresh_interval,
            seen_id_capacity: config.seen_id_capacity,
            seen_ids: Vec::new(),
            since: Local::now().naive_local(),
            stalled_polls: 0,
        }
    }

    #[must_use]
    pub fn since(&self) -> NaiveDateTime {
        self.since
    }

    pub fn set_since(&mut self, since: NaiveDateTime) {
        self.since = since;
    }

    #[must_use]
    pub fn seen_ids(&self) -> &[String] {
        &self.seen_ids
    }

    /// Polls on which the session gave up after repeated empty feed pages.
    #[must_use]
    pub fn stalled_polls(&self) -> u32 {
        self.stalled_polls
    }

    #[must_use]
    pub fn session(&self) -> &PageSession<C> {
        &self.session
    }

    /// Run until a fatal feed error.
    ///
    /// Each cycle moves the watermark to the current time, sleeps for the
    /// refresh interval and then polls once.
    ///
    /// # Errors
    ///
    /// Returns the fatal [`FeedError`] that ended the loop.
    pub async fn run(&mut self) -> Result<(), FeedError> {
        loop {
            self.since = Local::now().naive_local();
            debug!(
                seconds = self.refresh_interval.as_secs(),
                "Sleeping until next refresh"
            );
            tokio::time::sleep(self.refresh_interval).await;
            self.poll_once().await?;
        }
    }

    /// Fetch posts newer than the watermark, write and download them.
    ///
    /// Returns the number of posts fetched.
    ///
    /// # Errors
    ///
    /// Returns the fatal [`FeedError`]s of the extraction pipeline.
    pub async fn poll_once(&mut self) -> Result<usize, FeedError> {
        info!(
            since = %self.since.format(TIME_FORMAT),
            "Start fetching posts published after watermark"
        );

        let seen_ids = std::mem::take(&mut self.seen_ids);
        let page = self.session.poll(seen_ids, self.since).await?;
        self.seen_ids = page.seen_ids;
        self.trim_seen_ids();
        if !page.to_continue {
            self.note_stop();
        }

        if !page.posts.is_empty() {
            self.handle_posts(&page.posts).await;
        }

        let count = page.posts.len();
        if self.filter_reposts {
            info!(count, "共爬取{count}条原创微博");
        } else {
            info!(count, "共爬取{count}条微博");
        }
        info!("信息抓取完毕");
        Ok(count)
    }

    async fn handle_posts(&self, posts: &[Post]) {
        let failures = self.writers.write_all(posts).await;
        if failures > 0 {
            error!(failures, "Some writers failed");
        }

        for downloader in &self.downloaders {
            if let Err(e) = downloader.download_posts(posts).await {
                error!(kind = downloader.kind().describe(), "Media download error: {e:#}");
            }
        }
    }

    /// The session stops either at the watermark or after too many empty
    /// loads; only the latter needs attention.
    fn note_stop(&mut self) {
        let has_page = self
            .session
            .snapshot()
            .is_some_and(PageSnapshot::is_valid);
        if has_page {
            debug!("Reached posts older than the watermark");
            return;
        }
        self.stalled_polls += 1;
        warn!(
            stalled_polls = self.stalled_polls,
            "Feed stayed empty across several refreshes; the cookie may have expired"
        );
    }

    /// Keep only the most recent ids.
    fn trim_seen_ids(&mut self) {
        if self.seen_ids.len() > self.seen_id_capacity {
            let excess = self.seen_ids.len() - self.seen_id_capacity;
            self.seen_ids.drain(..excess);
        }
    }
}
