//! Media downloads for extracted posts.
//!
//! Each [`MediaDownloader`] handles one kind of media and writes into its own
//! directory under the output root. Files already on disk are never fetched
//! again; failures are appended to `not_downloaded.txt` in that directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::constants::BROWSER_USER_AGENT;
use crate::feed::Post;

const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Retry and timeout policy shared by all downloaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadSettings {
    pub retries: u32,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl DownloadSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            retries: config.download_retries,
            connect_timeout: config.download_connect_timeout,
            read_timeout: config.download_read_timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    OriginalPictures,
    RepostPictures,
    Video,
}

impl MediaKind {
    /// Label used in logs and as the directory name for pictures.
    #[must_use]
    pub fn describe(&self) -> &'static str {
        match self {
            Self::OriginalPictures => "原创微博图片",
            Self::RepostPictures => "转发微博图片",
            Self::Video => "视频",
        }
    }

    /// Directory of this kind relative to the output root.
    #[must_use]
    pub fn relative_dir(&self) -> PathBuf {
        match self {
            Self::OriginalPictures | Self::RepostPictures => {
                Path::new("img").join(self.describe())
            }
            Self::Video => PathBuf::from("video"),
        }
    }

    fn urls<'a>(&self, post: &'a Post) -> Vec<&'a str> {
        match self {
            Self::OriginalPictures => post.original_pictures.iter().map(String::as_str).collect(),
            Self::RepostPictures => post.repost_pictures.iter().map(String::as_str).collect(),
            Self::Video => post.video_url.as_deref().into_iter().collect(),
        }
    }

    fn extension(&self, url: &str) -> String {
        match self {
            Self::Video => ".mp4".to_string(),
            Self::OriginalPictures | Self::RepostPictures => picture_extension(url),
        }
    }
}

/// Extension of the last path segment of `url`, `.jpg` when there is none.
#[must_use]
pub fn picture_extension(url: &str) -> String {
    let segment = Url::parse(url)
        .ok()
        .and_then(|u| u.path_segments().and_then(|mut s| s.next_back()).map(ToString::to_string))
        .unwrap_or_default();
    match segment.rfind('.') {
        Some(dot) if dot + 1 < segment.len() => segment[dot..].to_string(),
        _ => ".jpg".to_string(),
    }
}

/// `<yyyymmdd>_<post id>[_<n>]<ext>`; the index is 1-based and only used
/// when the post has several files of this kind.
#[must_use]
pub fn file_name(post: &Post, index: Option<usize>, extension: &str) -> String {
    let stem = post.publish_time.map_or_else(
        || post.id.clone(),
        |t| format!("{}_{}", t.format("%Y%m%d"), post.id),
    );
    match index {
        Some(n) => format!("{stem}_{n}{extension}"),
        None => format!("{stem}{extension}"),
    }
}

/// Outcome counts of one [`MediaDownloader::download_posts`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Downloads one kind of media for a batch of posts.
#[derive(Debug, Clone)]
pub struct MediaDownloader {
    kind: MediaKind,
    dir: PathBuf,
    client: reqwest::Client,
    retries: u32,
}

impl MediaDownloader {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(kind: MediaKind, output_dir: &Path, settings: DownloadSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .connect_timeout(settings.connect_timeout)
            .read_timeout(settings.read_timeout)
            .build()
            .context("Failed to build download client")?;

        Ok(Self {
            kind,
            dir: output_dir.join(kind.relative_dir()),
            client,
            retries: settings.retries,
        })
    }

    /// Pictures of the posts themselves.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn original_pictures(output_dir: &Path, settings: DownloadSettings) -> Result<Self> {
        Self::new(MediaKind::OriginalPictures, output_dir, settings)
    }

    /// Pictures of quoted posts.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn repost_pictures(output_dir: &Path, settings: DownloadSettings) -> Result<Self> {
        Self::new(MediaKind::RepostPictures, output_dir, settings)
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn video(output_dir: &Path, settings: DownloadSettings) -> Result<Self> {
        Self::new(MediaKind::Video, output_dir, settings)
    }

    /// Build the downloaders enabled by `config`.
    ///
    /// Repost pictures are only fetched when reposts are not filtered.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Vec<Self>> {
        let settings = DownloadSettings::from_config(config);
        let mut downloaders = Vec::new();
        if config.pic_download {
            downloaders.push(Self::original_pictures(&config.output_dir, settings)?);
            if !config.filter_reposts {
                downloaders.push(Self::repost_pictures(&config.output_dir, settings)?);
            }
        }
        if config.video_download {
            downloaders.push(Self::video(&config.output_dir, settings)?);
        }
        Ok(downloaders)
    }

    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Download every file of this kind referenced by `posts`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the target directory cannot be created or the
    /// failure log cannot be written; individual download failures are counted.
    pub async fn download_posts(&self, posts: &[Post]) -> Result<DownloadSummary> {
        let mut summary = DownloadSummary::default();
        let jobs: Vec<_> = posts
            .iter()
            .flat_map(|post| {
                let urls = self.kind.urls(post);
                let numbered = urls.len() > 1;
                urls.into_iter().enumerate().map(move |(i, url)| {
                    let name = file_name(post, numbered.then_some(i + 1), &self.kind.extension(url));
                    (post, url, name)
                })
            })
            .collect();

        if jobs.is_empty() {
            return Ok(summary);
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        info!(kind = self.kind.describe(), files = jobs.len(), "Downloading media");

        for (post, url, name) in jobs {
            let path = self.dir.join(&name);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                debug!(path = %path.display(), "Already downloaded, skipping");
                summary.skipped += 1;
                continue;
            }

            match self.fetch_with_retries(url).await {
                Ok(bytes) => {
                    tokio::fs::write(&path, &bytes)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    summary.downloaded += 1;
                }
                Err(e) => {
                    warn!(post_id = %post.id, url, "Download failed: {e:#}");
                    self.record_failure(&post.id, url, &path).await?;
                    summary.failed += 1;
                }
            }
        }

        info!(
            kind = self.kind.describe(),
            downloaded = summary.downloaded,
            skipped = summary.skipped,
            failed = summary.failed,
            "Media download finished"
        );
        Ok(summary)
    }

    async fn fetch_with_retries(&self, url: &str) -> Result<Vec<u8>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.fetch(url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if attempt <= self.retries => {
                    debug!(url, attempt, "Download attempt failed: {e:#}");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let bytes = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send download request")?
            .error_for_status()
            .context("Download returned error")?
            .bytes()
            .await
            .context("Failed to read download body")?;
        Ok(bytes.to_vec())
    }

    async fn record_failure(&self, post_id: &str, url: &str, path: &Path) -> Result<()> {
        let log = self.dir.join("not_downloaded.txt");
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log)
            .await
            .with_context(|| format!("Failed to open {}", log.display()))?;
        let line = format!("{post_id}:{url} {}\n", path.display());
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("Failed to append to {}", log.display()))?;
        Ok(())
    }
}
