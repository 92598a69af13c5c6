//! Per-field extractors over a post container.
//!
//! Every extractor reads one attribute from a [`PostNode`]. Lookups that need a
//! detail page do not fetch anything here; they return a source describing what
//! to fetch, which the assembler resolves afterwards.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use super::client::VIDEO_PAGE_PATTERN;
use super::error::FeedError;
use super::markup::{
    anchor_image_src, anchor_text, element_text, href, MarkerText, PostNode, ARTICLE_MARKER,
    LIKE_MARKER, MAP_MARKER, VIDEO_SUFFIX,
};
use super::time::{parse_publish_time, parse_publish_tool};
use crate::constants::WEIBO_BASE_URL;

#[allow(clippy::expect_used)]
static INTEGER_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

/// More comment-class spans than this marks a repost.
const REPOST_CMT_THRESHOLD: usize = 3;

const IMAGE_EXTENSIONS: [&str; 4] = [".gif", ".jpeg", ".jpg", ".png"];

/// Outcome of a single field extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<T> {
    Found(T),
    Absent,
    Failed(String),
}

impl<T> Field<T> {
    /// Collapse to an option, logging failures against the post.
    pub fn into_option(self, post_id: &str, field: &'static str) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::Absent => None,
            failed @ Self::Failed(_) => {
                failed.log_if_failed(post_id, field);
                None
            }
        }
    }

    /// Log a failure against the post; found and absent values are dropped.
    pub fn log_if_failed(&self, post_id: &str, field: &'static str) {
        if let Self::Failed(reason) = self {
            warn!(post_id = %post_id, field, reason = %reason, "Field extraction failed");
        }
    }

    fn from_option(value: Option<T>) -> Self {
        value.map_or(Self::Absent, Self::Found)
    }
}

/// Original vs repost, from the number of comment-class spans.
#[must_use]
pub fn is_repost(node: &PostNode<'_>) -> bool {
    node.comment_spans().count() > REPOST_CMT_THRESHOLD
}

/// Author id: last path segment of the author link.
#[must_use]
pub fn extract_user_id(node: &PostNode<'_>) -> Field<String> {
    let Some(link) = node.author_anchor().and_then(href) else {
        return Field::Failed("no author link".to_string());
    };
    Field::from_option(last_path_segment(link))
}

/// Post text before any continuation fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentDraft {
    Original {
        inline: String,
        read_more: bool,
    },
    Repost {
        inline: String,
        reason: String,
        attributed_user: Option<String>,
        read_more: bool,
    },
}

impl ContentDraft {
    /// Whether the inline text is truncated behind a "read more" anchor.
    #[must_use]
    pub fn needs_full_text(&self) -> bool {
        match self {
            Self::Original { read_more, .. } | Self::Repost { read_more, .. } => *read_more,
        }
    }

    /// Final content, preferring the expanded text when one was fetched.
    #[must_use]
    pub fn compose(&self, expanded: Option<String>) -> String {
        match self {
            Self::Original { inline, .. } => expanded.unwrap_or_else(|| inline.clone()),
            Self::Repost {
                inline,
                reason,
                attributed_user,
                ..
            } => {
                let quoted = expanded.unwrap_or_else(|| inline.clone());
                compose_repost(reason, attributed_user.as_deref(), &quoted)
            }
        }
    }
}

/// Repost layout: reason, then the attributed user, then the quoted content.
#[must_use]
pub fn compose_repost(reason: &str, attributed_user: Option<&str>, quoted: &str) -> String {
    match attributed_user {
        Some(user) => format!("{reason}\n原始用户: {user}\n转发内容: {quoted}"),
        None => format!("{reason}\n转发内容: {quoted}"),
    }
}

/// Content of an original post: between the author prefix and the footer.
#[must_use]
pub fn extract_original_content(node: &PostNode<'_>) -> ContentDraft {
    let text = node.text();
    let inline = MarkerText(&text)
        .after_author()
        .before_last(LIKE_MARKER)
        .trimmed();
    ContentDraft::Original {
        inline,
        read_more: node.has_read_more(),
    }
}

/// Content of a repost: the quoted text plus the reposter's own reason.
#[must_use]
pub fn extract_repost_content(node: &PostNode<'_>) -> ContentDraft {
    let text = node.text();
    let inline = MarkerText(&text)
        .after_author()
        .before_last(LIKE_MARKER)
        .before_last(LIKE_MARKER)
        .trimmed();

    let reason = node
        .last_block()
        .map(|block| {
            let block_text = element_text(block);
            MarkerText(&block_text).before_last(LIKE_MARKER).trimmed()
        })
        .unwrap_or_default();

    ContentDraft::Repost {
        inline,
        reason,
        attributed_user: node.attributed_user(),
        read_more: node.has_read_more(),
    }
}

/// Headline-article link, when the post announces one.
#[must_use]
pub fn extract_article_url(node: &PostNode<'_>) -> Option<String> {
    let text = node.text();
    if !MarkerText(&text).after_author().as_str().trim_start().starts_with(ARTICLE_MARKER) {
        return None;
    }
    let prefix = format!("{WEIBO_BASE_URL}/sinaurl");
    node.all_anchors()
        .filter_map(href)
        .find(|link| link.starts_with(&prefix))
        .map(ToString::to_string)
}

/// Like, repost and comment counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Footer {
    pub likes: u64,
    pub reposts: u64,
    pub comments: u64,
}

/// Read the counts from the last sub-block, starting at its last like marker.
///
/// # Errors
///
/// Returns [`FeedError::MalformedFooter`] when the marker is missing or fewer
/// than three integers follow it.
pub fn extract_footer(node: &PostNode<'_>, post_id: &str) -> Result<Footer, FeedError> {
    let block_text = node.last_block().map(element_text).unwrap_or_default();
    let malformed = || FeedError::MalformedFooter {
        post_id: post_id.to_string(),
        footer: block_text.clone(),
    };

    let footer = MarkerText(&block_text)
        .from_last(LIKE_MARKER)
        .ok_or_else(malformed)?;
    let counts: Vec<u64> = INTEGER_RUN
        .find_iter(footer.as_str())
        .take(3)
        .map(|m| m.as_str().parse::<u64>())
        .collect::<Result<_, _>>()
        .map_err(|_| malformed())?;

    match counts.as_slice() {
        [likes, reposts, comments] => Ok(Footer {
            likes: *likes,
            reposts: *reposts,
            comments: *comments,
        }),
        _ => Err(malformed()),
    }
}

/// Rewrite a thumbnail URL to its full-resolution variant.
#[must_use]
pub fn upgrade_thumbnail(url: &str) -> String {
    url.replace("/thumb180/", "/large/")
        .replace("/wap180/", "/large/")
}

/// Where the pictures of a post come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PictureSource {
    None,
    /// Already upgraded URLs found inline.
    Inline(Vec<String>),
    /// Multi-picture post; the gallery page of this id lists them all.
    Gallery(String),
}

/// Pictures of the post and, on a repost, of the quoted post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureDraft {
    pub original: PictureSource,
    pub repost: PictureSource,
}

/// Locate the pictures of the post whose id is `picture_id`.
///
/// # Errors
///
/// Returns [`FeedError::PicturesHidden`] when the post links a picture but the
/// page carries no image at all, which happens when the account disabled
/// inline pictures.
pub fn extract_picture_source(
    node: &PostNode<'_>,
    picture_id: &str,
    post_id: &str,
) -> Result<PictureSource, FeedError> {
    let first_pic = format!("{WEIBO_BASE_URL}/mblog/pic/{picture_id}");
    let all_pics = format!("{WEIBO_BASE_URL}/mblog/picAll/{picture_id}");
    let hrefs = node.block_hrefs().concat();

    if !hrefs.contains(&first_pic) {
        return Ok(PictureSource::None);
    }
    if hrefs.contains(&all_pics) {
        return Ok(PictureSource::Gallery(picture_id.to_string()));
    }
    if !node.has_image() {
        return Err(FeedError::PicturesHidden {
            post_id: post_id.to_string(),
        });
    }

    let preview = node
        .block_anchors()
        .filter(|a| href(*a).is_some_and(|link| link.contains(&first_pic)))
        .find_map(anchor_image_src);
    Ok(preview.map_or(PictureSource::None, |src| {
        PictureSource::Inline(vec![upgrade_thumbnail(src)])
    }))
}

/// Pictures for the post, honoring the original/repost layout.
///
/// # Errors
///
/// Propagates [`FeedError::PicturesHidden`].
pub fn extract_pictures(
    node: &PostNode<'_>,
    post_id: &str,
    repost: bool,
) -> Result<PictureDraft, FeedError> {
    if !repost {
        return Ok(PictureDraft {
            original: extract_picture_source(node, post_id, post_id)?,
            repost: PictureSource::None,
        });
    }

    let quoted = match quoted_post_id(node) {
        Field::Found(id) => extract_picture_source(node, &id, post_id)?,
        other => {
            other.log_if_failed(post_id, "quoted_post_id");
            PictureSource::None
        }
    };

    let own = node
        .last_block_anchors()
        .filter_map(href)
        .find(|link| IMAGE_EXTENSIONS.iter().any(|ext| link.ends_with(ext)))
        .map_or(PictureSource::None, |link| {
            PictureSource::Inline(vec![link.to_string()])
        });

    Ok(PictureDraft {
        original: own,
        repost: quoted,
    })
}

/// Id of the quoted post, from the repost's first comment link.
#[must_use]
pub fn quoted_post_id(node: &PostNode<'_>) -> Field<String> {
    let Some(link) = node.comment_anchor().and_then(href) else {
        return Field::Failed("repost has no comment link".to_string());
    };
    Field::from_option(last_path_segment(link))
}

/// Where the video of a post comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSource {
    None,
    /// Inline link to the mobile video page.
    Page(String),
    /// The post is truncated; the detail page holds the video link.
    DetailPage,
}

#[must_use]
pub fn extract_video_source(node: &PostNode<'_>) -> VideoSource {
    if node.first_block_has_read_more() {
        return VideoSource::DetailPage;
    }
    node.first_block_anchors()
        .filter_map(href)
        .find(|link| link.contains(VIDEO_PAGE_PATTERN))
        .map_or(VideoSource::None, |link| VideoSource::Page(link.to_string()))
}

/// Place name next to a "show map" link.
#[must_use]
pub fn extract_place(node: &PostNode<'_>) -> Field<String> {
    let has_map_link = node.first_block_direct_anchors().any(|a| {
        href(a).is_some_and(|link| link.contains("place.weibo.com")) && anchor_text(a) == MAP_MARKER
    });
    if !has_map_link {
        return Field::Absent;
    }

    let anchors = node.content_anchors();
    let Some(last) = anchors.last() else {
        return Field::Failed("map link without place anchor".to_string());
    };
    let place = if anchor_text(*last).ends_with(VIDEO_SUFFIX) {
        match anchors.len().checked_sub(2).map(|i| anchors[i]) {
            Some(anchor) => anchor,
            None => return Field::Absent,
        }
    } else {
        *last
    };
    Field::from_option(Some(anchor_text(place)).filter(|p| !p.is_empty()))
}

/// Normalized time label (`<time>来自<client>`).
#[must_use]
pub fn extract_time_label(node: &PostNode<'_>) -> Field<String> {
    match node.time_span() {
        Some(span) => Field::Found(element_text(span)),
        None => Field::Failed("no time label".to_string()),
    }
}

/// Publish time parsed from the time label.
#[must_use]
pub fn extract_publish_time(label: &str, now: chrono::NaiveDateTime) -> Field<chrono::NaiveDateTime> {
    match parse_publish_time(label, now) {
        Some(time) => Field::Found(time),
        None => Field::Failed(format!("unrecognized time label {label:?}")),
    }
}

/// Client label from the time label.
#[must_use]
pub fn extract_publish_tool(label: &str) -> Field<String> {
    Field::from_option(parse_publish_tool(label))
}

fn last_path_segment(link: &str) -> Option<String> {
    let path = link.split(['?', '#']).next().unwrap_or(link);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(ToString::to_string)
}
