//! Sub-fetches for posts the feed only shows in part.
//!
//! Each lookup is a single round-trip against a detail page. Failures are
//! logged and reported as absence so only the owning field degrades.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use tracing::{debug, warn};

use super::client::{Endpoints, FeedClient, VIDEO_PAGE_PATTERN};
use super::markup::{element_text, MarkerText, ORIGINAL_REPOST_MARKER};

#[allow(clippy::expect_used)]
static CONTAINER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.c").expect("valid selector"));
#[allow(clippy::expect_used)]
static TIME_SPAN: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.ct").expect("valid selector"));
#[allow(clippy::expect_used)]
static IMAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[src]").expect("valid selector"));
#[allow(clippy::expect_used)]
static DETAIL_POST: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body > div.c[id]").expect("valid selector"));
#[allow(clippy::expect_used)]
static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

/// Full text of a post from its detail page.
///
/// The post is the second `div.c`; its text runs from the author prefix up to
/// the last occurrence of the page's first time label. For reposts the quoted
/// post's own footer is cut as well.
#[must_use]
pub fn parse_full_text(html: &str, repost: bool) -> Option<String> {
    let document = Html::parse_document(html);
    let container = document.select(&CONTAINER).nth(1)?;
    let time_label = document
        .select(&TIME_SPAN)
        .next()
        .and_then(|span| span.text().next())
        .map(super::normalize::normalize_text)?;

    let text = element_text(container);
    let mut content = MarkerText(&text).after_author().before_last(&time_label);
    if repost {
        content = content.before_last(ORIGINAL_REPOST_MARKER);
    }
    let content = content.trimmed();
    (!content.is_empty()).then_some(content)
}

/// Preview picture URLs listed on a gallery page, in document order.
#[must_use]
pub fn parse_gallery(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&IMAGE)
        .filter_map(|img| img.value().attr("src"))
        .map(ToString::to_string)
        .collect()
}

/// Mobile video page linked from the post on its detail page.
#[must_use]
pub fn parse_video_page(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let post = document.select(&DETAIL_POST).next()?;
    post.select(&ANCHOR)
        .filter_map(|a| a.value().attr("href"))
        .find(|link| link.contains(VIDEO_PAGE_PATTERN))
        .map(ToString::to_string)
}

/// Issues continuation fetches for one poll.
pub struct ContinuationResolver<'a> {
    client: &'a dyn FeedClient,
    endpoints: &'a Endpoints,
}

impl<'a> ContinuationResolver<'a> {
    #[must_use]
    pub fn new(client: &'a dyn FeedClient, endpoints: &'a Endpoints) -> Self {
        Self { client, endpoints }
    }

    async fn fetch(&self, post_id: &str, url: &str, purpose: &'static str) -> Option<String> {
        match self.client.fetch_page(url).await {
            Ok(html) => Some(html),
            Err(e) => {
                warn!(post_id = %post_id, purpose, "Continuation fetch failed: {e}");
                None
            }
        }
    }

    /// Expanded text of a truncated post.
    pub async fn full_text(&self, post_id: &str, repost: bool) -> Option<String> {
        let html = self
            .fetch(post_id, &self.endpoints.comment(post_id), "full_text")
            .await?;
        let text = parse_full_text(&html, repost);
        if text.is_none() {
            warn!(post_id = %post_id, "Detail page has no readable post text");
        }
        text
    }

    /// Preview URLs of every picture in a multi-picture post.
    pub async fn gallery(&self, post_id: &str) -> Option<Vec<String>> {
        let html = self
            .fetch(post_id, &self.endpoints.gallery(post_id), "gallery")
            .await?;
        let pictures = parse_gallery(&html);
        debug!(post_id = %post_id, count = pictures.len(), "Gallery resolved");
        Some(pictures)
    }

    /// Mobile video page of a truncated post.
    pub async fn video_page(&self, post_id: &str) -> Option<String> {
        let html = self
            .fetch(post_id, &self.endpoints.comment(post_id), "video_page")
            .await?;
        parse_video_page(&html)
    }

    /// Direct stream URL behind a mobile video page.
    pub async fn video_stream(&self, post_id: &str, video_page_url: &str) -> Option<String> {
        match self.client.resolve_video_stream(video_page_url).await {
            Ok(url) => url,
            Err(e) => {
                warn!(post_id = %post_id, url = %video_page_url, "Video stream lookup failed: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL: &str = r#"<html><body>
        <div class="c">header</div>
        <div class="c" id="M_Labc">
          <div>
            <a href="https://weibo.cn/u/1">Author</a>:<span class="ctt">这是一条很长的微博，后面还有很多内容。</span>
            <a href="https://m.weibo.cn/s/video/show?object_id=1034:99">某人的微博视频</a>
            &nbsp;<span class="ct">今天 14:30&nbsp;来自iPhone</span>
          </div>
        </div>
        <div class="c">comments</div>
    </body></html>"#;

    #[test]
    fn test_parse_full_text() {
        let text = parse_full_text(DETAIL, false).unwrap();
        assert!(text.starts_with("这是一条很长的微博，后面还有很多内容。"));
        assert!(text.ends_with("某人的微博视频"));
        assert!(!text.contains("今天"));
    }

    #[test]
    fn test_parse_full_text_repost_cuts_quoted_footer() {
        let html = r#"<html><body><div class="c">h</div><div class="c" id="M_R"><div>U:quoted long text 赞[5] 原文转发[1] 原文评论[2]<span class="ct">03月02日 09:05</span></div></div></body></html>"#;
        assert_eq!(
            parse_full_text(html, true).as_deref(),
            Some("quoted long text 赞[5]")
        );
    }

    #[test]
    fn test_parse_full_text_missing_container() {
        assert!(parse_full_text("<html><body><div class=\"c\">only</div></body></html>", false).is_none());
    }

    #[test]
    fn test_parse_gallery() {
        let html = r#"<html><body><div class="c"><a href="/1"><img src="https://wx1.sinaimg.cn/thumb180/1.jpg"></a><a href="/2"><img src="https://wx1.sinaimg.cn/thumb180/2.jpg"></a><img alt="no src"></div></body></html>"#;
        assert_eq!(
            parse_gallery(html),
            vec![
                "https://wx1.sinaimg.cn/thumb180/1.jpg".to_string(),
                "https://wx1.sinaimg.cn/thumb180/2.jpg".to_string()
            ]
        );
    }

    #[test]
    fn test_parse_video_page() {
        assert_eq!(
            parse_video_page(DETAIL).as_deref(),
            Some("https://m.weibo.cn/s/video/show?object_id=1034:99")
        );
        assert!(parse_video_page("<html><body><div class=\"c\" id=\"M_x\">none</div></body></html>").is_none());
    }
}
