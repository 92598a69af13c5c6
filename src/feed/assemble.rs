//! Builds a [`Post`] from one feed container.
//!
//! Assembly runs in two steps. [`PostAssembler::scan`] reads everything the
//! container shows inline while the parsed page is alive and records which
//! detail pages are still needed. [`PostAssembler::resolve`] then performs
//! those fetches and produces the final record.

use chrono::NaiveDateTime;
use tracing::{debug, info};

use super::continuation::ContinuationResolver;
use super::error::FeedError;
use super::extract::{
    extract_article_url, extract_footer, extract_original_content, extract_pictures,
    extract_place, extract_publish_time, extract_publish_tool, extract_repost_content,
    extract_time_label, extract_user_id, extract_video_source, is_repost, upgrade_thumbnail,
    ContentDraft, Field, PictureDraft, PictureSource, VideoSource,
};
use super::markup::PostNode;
use super::post::Post;

/// A post read from the feed page whose continuations are not fetched yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDraft {
    post: Post,
    content: ContentDraft,
    pictures: PictureDraft,
    video: VideoSource,
}

impl PostDraft {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.post.id
    }

    #[must_use]
    pub fn publish_time(&self) -> Option<NaiveDateTime> {
        self.post.publish_time
    }

    #[must_use]
    pub fn is_repost(&self) -> bool {
        self.post.is_repost
    }
}

/// Applies the repost filter and runs the extractors in a fixed order.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostAssembler {
    filter_reposts: bool,
}

impl PostAssembler {
    #[must_use]
    pub fn new(filter_reposts: bool) -> Self {
        Self { filter_reposts }
    }

    /// Read the inline fields of a container.
    ///
    /// Returns `Ok(None)` for reposts when filtering and for containers
    /// without a post id.
    ///
    /// # Errors
    ///
    /// Returns the fatal [`FeedError`]s raised by the picture and footer
    /// extractors.
    pub fn scan(&self, node: &PostNode<'_>, now: NaiveDateTime) -> Result<Option<PostDraft>, FeedError> {
        let repost = is_repost(node);
        if self.filter_reposts && repost {
            info!("Skipping repost while filtering reposts");
            return Ok(None);
        }

        let Some(id) = node.post_id() else {
            debug!("Container without post id, skipping");
            return Ok(None);
        };

        let user_id = extract_user_id(node)
            .into_option(&id, "user_id")
            .unwrap_or_default();
        let content = if repost {
            extract_repost_content(node)
        } else {
            extract_original_content(node)
        };
        let article_url = extract_article_url(node);
        let pictures = extract_pictures(node, &id, repost)?;
        let video = extract_video_source(node);
        let publish_place = extract_place(node).into_option(&id, "publish_place");

        let (publish_time, publish_tool) = match extract_time_label(node) {
            Field::Found(label) => (
                extract_publish_time(&label, now).into_option(&id, "publish_time"),
                extract_publish_tool(&label).into_option(&id, "publish_tool"),
            ),
            other => {
                other.log_if_failed(&id, "time_label");
                (None, None)
            }
        };

        let footer = extract_footer(node, &id)?;

        let post = Post {
            id,
            user_id,
            is_repost: repost,
            content: String::new(),
            article_url,
            original_pictures: Vec::new(),
            repost_pictures: Vec::new(),
            video_url: None,
            publish_place,
            publish_time,
            publish_tool,
            like_count: footer.likes,
            repost_count: footer.reposts,
            comment_count: footer.comments,
        };

        Ok(Some(PostDraft {
            post,
            content,
            pictures,
            video,
        }))
    }

    /// Fetch whatever the draft still needs and finish the post.
    pub async fn resolve(&self, draft: PostDraft, resolver: &ContinuationResolver<'_>) -> Post {
        let PostDraft {
            mut post,
            content,
            pictures,
            video,
        } = draft;

        let expanded = if content.needs_full_text() {
            resolver.full_text(&post.id, post.is_repost).await
        } else {
            None
        };
        post.content = content.compose(expanded);

        post.original_pictures = resolve_pictures(pictures.original, resolver).await;
        if post.is_repost && !self.filter_reposts {
            post.repost_pictures = resolve_pictures(pictures.repost, resolver).await;
        }

        let video_page = match video {
            VideoSource::None => None,
            VideoSource::Page(url) => Some(url),
            VideoSource::DetailPage => resolver.video_page(&post.id).await,
        };
        if let Some(page) = video_page {
            post.video_url = resolver.video_stream(&post.id, &page).await;
        }

        post
    }
}

async fn resolve_pictures(source: PictureSource, resolver: &ContinuationResolver<'_>) -> Vec<String> {
    match source {
        PictureSource::None => Vec::new(),
        PictureSource::Inline(urls) => urls,
        PictureSource::Gallery(id) => resolver
            .gallery(&id)
            .await
            .unwrap_or_default()
            .iter()
            .map(|url| upgrade_thumbnail(url))
            .collect(),
    }
}
