//! Integration tests for the feed page session.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use weibo_feed_spider::feed::{Endpoints, FeedClient, FeedError, FetchError, PageSession};

/// In-memory feed site. Each URL serves its queued responses in order and
/// keeps repeating the last one.
#[derive(Default)]
struct ScriptedClient {
    pages: Mutex<HashMap<String, VecDeque<String>>>,
    streams: HashMap<String, String>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedClient {
    fn with_page(self, url: &str, html: &str) -> Self {
        self.pages
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(html.to_string());
        self
    }

    fn with_stream(mut self, page: &str, stream: &str) -> Self {
        self.streams.insert(page.to_string(), stream.to_string());
        self
    }

    fn requests_to(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }
}

#[async_trait]
impl FeedClient for ScriptedClient {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());
        let mut pages = self.pages.lock().unwrap();
        let queue = pages.get_mut(url).ok_or_else(|| FetchError::Status {
            url: url.to_string(),
            status: 404,
        })?;
        let html = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        html.ok_or_else(|| FetchError::Status {
            url: url.to_string(),
            status: 404,
        })
    }

    async fn resolve_video_stream(
        &self,
        video_page_url: &str,
    ) -> Result<Option<String>, FetchError> {
        Ok(self.streams.get(video_page_url).cloned())
    }
}

const HOME: &str = "https://weibo.cn/";

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 2)
        .and_then(|d| d.and_hms_opt(15, 0, 0))
        .unwrap()
}

fn at(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 2)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .unwrap()
}

/// An original post in a single block with the footer `赞[3] 转发[1] 评论[0]`.
fn original(id: &str, time: &str, extra: &str) -> String {
    format!(
        r#"<div class="c" id="M_{id}"><div><a class="nk" href="https://weibo.cn/u/1001">Author</a><span class="ctt">:post {id}</span>{extra}&nbsp;<a href="https://weibo.cn/attitude/{id}">赞[3]</a>&nbsp;<a href="https://weibo.cn/repost/{id}">转发[1]</a>&nbsp;<a href="https://weibo.cn/comment/{id}" class="cc">评论[0]</a>&nbsp;<span class="ct">{time}&nbsp;来自iPhone客户端</span></div></div>"#
    )
}

fn repost(id: &str, quoted: &str) -> String {
    format!(
        r#"<div class="c" id="M_{id}">
          <div>
            <a class="nk" href="https://weibo.cn/reposter">Reposter</a>
            <span class="cmt">转发了&nbsp;<a href="https://weibo.cn/u/2002">OrigUser</a>&nbsp;的微博:</span>
            <span class="ctt">quoted text</span>
            &nbsp;<span class="cmt">赞[100]</span>&nbsp;<span class="cmt">原文转发[20]</span>&nbsp;<a href="https://weibo.cn/comment/{quoted}?rl=1#cmtfrm" class="cc">原文评论[30]</a>
          </div>
          <div>
            <a href="https://weibo.cn/mblog/pic/{quoted}?rl=1"><img src="https://wx2.sinaimg.cn/thumb180/q.jpg"></a>
          </div>
          <div>
            <span class="cmt">转发理由:</span>my reason&nbsp;&nbsp;<a href="https://weibo.cn/attitude/{id}">赞[1]</a>&nbsp;<a href="https://weibo.cn/repost/{id}">转发[0]</a>&nbsp;<a href="https://weibo.cn/comment/{id}" class="cc">评论[2]</a>&nbsp;<span class="ct">今天 14:40&nbsp;来自微博 weibo.com</span>
          </div>
        </div>"#
    )
}

/// Wrap containers into a feed page ending with the pagination container.
fn feed(containers: &[String]) -> String {
    format!(
        r#"<html><body>{}<div class="c"><form>下页 1/50页</form></div></body></html>"#,
        containers.concat()
    )
}

const LOGIN_PAGE: &str =
    r#"<html><body><div class="c"><div>请先登录</div></div><div class="c">footer</div></body></html>"#;

async fn loaded(client: ScriptedClient, filter_reposts: bool) -> PageSession<ScriptedClient> {
    let mut session = PageSession::new(client, Endpoints::default(), filter_reposts);
    session.load().await;
    session
}

#[tokio::test]
async fn test_two_container_snapshot_yields_one_post() {
    let html = feed(&[original("Oa1", "今天 14:30", "")]);
    let session = loaded(ScriptedClient::default().with_page(HOME, &html), false).await;

    let page = session
        .get_one_page(Vec::new(), at(14, 0), now())
        .await
        .unwrap();

    assert!(page.to_continue);
    assert_eq!(page.seen_ids, vec!["Oa1".to_string()]);
    assert_eq!(page.posts.len(), 1);

    let post = &page.posts[0];
    assert_eq!(post.id, "Oa1");
    assert_eq!(post.user_id, "1001");
    assert!(!post.is_repost);
    assert_eq!(post.content, "post Oa1");
    assert_eq!(
        (post.like_count, post.repost_count, post.comment_count),
        (3, 1, 0)
    );
    assert_eq!(post.publish_time, Some(at(14, 30)));
    assert_eq!(post.publish_tool.as_deref(), Some("iPhone客户端"));
    assert!(post.original_pictures.is_empty());
    assert!(post.repost_pictures.is_empty());
    assert!(post.video_url.is_none());
    assert!(post.publish_place.is_none());
    assert!(post.article_url.is_none());
}

#[tokio::test]
async fn test_stop_rule_at_watermark() {
    let html = feed(&[
        original("Oa1", "今天 14:50", ""),
        original("Ob2", "今天 14:30", ""),
        original("Oc3", "今天 14:00", ""),
        original("Od4", "今天 13:00", ""),
    ]);
    let session = loaded(ScriptedClient::default().with_page(HOME, &html), false).await;

    let page = session
        .get_one_page(Vec::new(), at(14, 20), now())
        .await
        .unwrap();

    let ids: Vec<_> = page.posts.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["Oa1", "Ob2"]);
    assert_eq!(page.seen_ids, vec!["Oa1".to_string(), "Ob2".to_string()]);
    assert!(!page.to_continue);
}

#[tokio::test]
async fn test_grace_window_keeps_post_just_before_watermark() {
    let html = feed(&[original("Oa1", "今天 14:19", "")]);
    let session = loaded(ScriptedClient::default().with_page(HOME, &html), false).await;

    let page = session
        .get_one_page(Vec::new(), at(14, 20), now())
        .await
        .unwrap();

    assert_eq!(page.posts.len(), 1);
    assert!(page.to_continue);
}

#[tokio::test]
async fn test_seen_ids_are_skipped() {
    let html = feed(&[
        original("Oa1", "今天 14:50", ""),
        original("Ob2", "今天 14:40", ""),
    ]);
    let session = loaded(ScriptedClient::default().with_page(HOME, &html), false).await;

    let page = session
        .get_one_page(vec!["Oa1".to_string()], at(14, 0), now())
        .await
        .unwrap();

    let ids: Vec<_> = page.posts.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["Ob2"]);
    assert_eq!(page.seen_ids, vec!["Oa1".to_string(), "Ob2".to_string()]);
}

#[tokio::test]
async fn test_seen_post_older_than_watermark_does_not_stop() {
    let html = feed(&[
        original("Oold", "今天 13:00", ""),
        original("Onew", "今天 14:50", ""),
    ]);
    let session = loaded(ScriptedClient::default().with_page(HOME, &html), false).await;

    let page = session
        .get_one_page(vec!["Oold".to_string()], at(14, 0), now())
        .await
        .unwrap();

    assert_eq!(page.posts.len(), 1);
    assert_eq!(page.posts[0].id, "Onew");
    assert!(page.to_continue);
}

#[tokio::test]
async fn test_repost_assembled_when_not_filtering() {
    let html = feed(&[repost("Rr1", "Qq1")]);
    let session = loaded(ScriptedClient::default().with_page(HOME, &html), false).await;

    let page = session
        .get_one_page(Vec::new(), at(14, 0), now())
        .await
        .unwrap();

    assert_eq!(page.posts.len(), 1);
    let post = &page.posts[0];
    assert!(post.is_repost);
    assert_eq!(
        post.content,
        "转发理由:my reason\n原始用户: OrigUser\n转发内容: quoted text"
    );
    assert_eq!(
        post.repost_pictures,
        vec!["https://wx2.sinaimg.cn/large/q.jpg".to_string()]
    );
    assert!(post.original_pictures.is_empty());
    assert_eq!(
        (post.like_count, post.repost_count, post.comment_count),
        (1, 0, 2)
    );
    assert_eq!(post.publish_time, Some(at(14, 40)));
}

#[tokio::test]
async fn test_filter_mode_skips_reposts() {
    let html = feed(&[repost("Rr1", "Qq1"), original("Oa1", "今天 14:30", "")]);
    let session = loaded(ScriptedClient::default().with_page(HOME, &html), true).await;

    let page = session
        .get_one_page(Vec::new(), at(14, 0), now())
        .await
        .unwrap();

    let ids: Vec<_> = page.posts.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["Oa1"]);
    assert!(page.posts.iter().all(|p| !p.is_repost && p.repost_pictures.is_empty()));
}

#[tokio::test]
async fn test_empty_poll_counter_stops_after_three_empty_loads() {
    let client = ScriptedClient::default().with_page(HOME, LOGIN_PAGE);
    let mut session = PageSession::new(client, Endpoints::default(), false);

    session.load().await;
    assert_eq!(session.empty_polls(), 1);
    assert!(session.to_continue());
    assert_eq!(session.client().requests_to(HOME), 3);

    session.load().await;
    assert_eq!(session.empty_polls(), 2);
    assert!(session.to_continue());

    session.load().await;
    assert_eq!(session.empty_polls(), 0);
    assert!(!session.to_continue());

    let page = session
        .get_one_page(Vec::new(), at(14, 0), now())
        .await
        .unwrap();
    assert!(page.posts.is_empty());
    assert!(!page.to_continue);

    // The flag is re-armed on the next load
    session.load().await;
    assert!(session.to_continue());
    assert_eq!(session.empty_polls(), 1);
}

#[tokio::test]
async fn test_load_retries_until_valid_snapshot() {
    let html = feed(&[original("Oa1", "今天 14:30", "")]);
    let client = ScriptedClient::default()
        .with_page(HOME, LOGIN_PAGE)
        .with_page(HOME, &html);
    let session = loaded(client, false).await;

    assert_eq!(session.client().requests_to(HOME), 2);
    assert_eq!(session.empty_polls(), 0);
    assert!(session.snapshot().is_some_and(|s| s.is_valid()));
}

#[tokio::test]
async fn test_fetch_errors_count_as_empty_attempts() {
    let session = loaded(ScriptedClient::default(), false).await;

    assert_eq!(session.client().requests_to(HOME), 3);
    assert_eq!(session.empty_polls(), 1);
    assert!(session.snapshot().is_none());
}

#[tokio::test]
async fn test_valid_snapshot_resets_empty_counter() {
    let html = feed(&[original("Oa1", "今天 14:30", "")]);
    let client = ScriptedClient::default()
        .with_page(HOME, LOGIN_PAGE)
        .with_page(HOME, LOGIN_PAGE)
        .with_page(HOME, LOGIN_PAGE)
        .with_page(HOME, &html);
    let mut session = PageSession::new(client, Endpoints::default(), false);

    session.load().await;
    assert_eq!(session.empty_polls(), 1);
    session.load().await;
    assert_eq!(session.empty_polls(), 0);
}

#[tokio::test]
async fn test_malformed_footer_is_fatal() {
    let broken = r#"<div class="c" id="M_Obad"><div><a class="nk" href="https://weibo.cn/u/1">A</a><span class="ctt">:text</span>&nbsp;<a href="https://weibo.cn/attitude/Obad">赞</a>&nbsp;<span class="ct">今天 14:30</span></div></div>"#;
    let html = feed(&[broken.to_string()]);
    let session = loaded(ScriptedClient::default().with_page(HOME, &html), false).await;

    let err = session
        .get_one_page(Vec::new(), at(14, 0), now())
        .await
        .unwrap_err();
    assert!(matches!(err, FeedError::MalformedFooter { ref post_id, .. } if post_id == "Obad"));
}

#[tokio::test]
async fn test_hidden_pictures_is_fatal() {
    let html = feed(&[original(
        "Oh1",
        "今天 14:30",
        r#"<a href="https://weibo.cn/mblog/pic/Oh1?rl=0">图片</a>"#,
    )]);
    let session = loaded(ScriptedClient::default().with_page(HOME, &html), false).await;

    let err = session
        .get_one_page(Vec::new(), at(14, 0), now())
        .await
        .unwrap_err();
    assert!(matches!(err, FeedError::PicturesHidden { ref post_id } if post_id == "Oh1"));
    assert!(err.to_string().contains("https://weibo.cn/account/customize/pic"));
}

#[tokio::test]
async fn test_inline_picture_is_upgraded() {
    let html = feed(&[original(
        "Op1",
        "今天 14:30",
        r#"<a href="https://weibo.cn/mblog/pic/Op1?rl=0"><img src="https://wx1.sinaimg.cn/wap180/p.jpg"></a>"#,
    )]);
    let session = loaded(ScriptedClient::default().with_page(HOME, &html), false).await;

    let page = session
        .get_one_page(Vec::new(), at(14, 0), now())
        .await
        .unwrap();
    assert_eq!(
        page.posts[0].original_pictures,
        vec!["https://wx1.sinaimg.cn/large/p.jpg".to_string()]
    );
}

#[tokio::test]
async fn test_gallery_continuation() {
    let html = feed(&[original(
        "Og1",
        "今天 14:30",
        r#"<a href="https://weibo.cn/mblog/pic/Og1?rl=0"><img src="https://wx1.sinaimg.cn/wap180/1.jpg"></a><a href="https://weibo.cn/mblog/picAll/Og1?rl=1">组图共2张</a>"#,
    )]);
    let gallery = r#"<html><body><div class="c"><a href="/1"><img src="https://wx1.sinaimg.cn/thumb180/1.jpg"></a><a href="/2"><img src="https://wx1.sinaimg.cn/thumb180/2.jpg"></a></div></body></html>"#;
    let client = ScriptedClient::default()
        .with_page(HOME, &html)
        .with_page("https://weibo.cn/mblog/picAll/Og1?rl=1", gallery);
    let session = loaded(client, false).await;

    let page = session
        .get_one_page(Vec::new(), at(14, 0), now())
        .await
        .unwrap();
    assert_eq!(
        page.posts[0].original_pictures,
        vec![
            "https://wx1.sinaimg.cn/large/1.jpg".to_string(),
            "https://wx1.sinaimg.cn/large/2.jpg".to_string()
        ]
    );
}

#[tokio::test]
async fn test_read_more_fetches_full_text() {
    let html = feed(&[original(
        "Ol1",
        "今天 14:30",
        r#"<a href="https://weibo.cn/comment/Ol1">全文</a>"#,
    )]);
    let detail = r#"<html><body><div class="c">header</div><div class="c" id="M_Ol1"><div><a href="https://weibo.cn/u/1001">Author</a>:<span class="ctt">the whole long post</span>&nbsp;<span class="ct">今天 14:30&nbsp;来自iPhone客户端</span></div></div></body></html>"#;
    let client = ScriptedClient::default()
        .with_page(HOME, &html)
        .with_page("https://weibo.cn/comment/Ol1", detail);
    let session = loaded(client, false).await;

    let page = session
        .get_one_page(Vec::new(), at(14, 0), now())
        .await
        .unwrap();
    assert_eq!(page.posts[0].content, "the whole long post");
}

#[tokio::test]
async fn test_failed_continuation_keeps_inline_text() {
    let html = feed(&[original(
        "Ol1",
        "今天 14:30",
        r#"<a href="https://weibo.cn/comment/Ol1">全文</a>"#,
    )]);
    let session = loaded(ScriptedClient::default().with_page(HOME, &html), false).await;

    let page = session
        .get_one_page(Vec::new(), at(14, 0), now())
        .await
        .unwrap();
    assert_eq!(page.posts.len(), 1);
    assert!(page.posts[0].content.starts_with("post Ol1"));
}

#[tokio::test]
async fn test_inline_video_resolves_stream() {
    let video_page = "https://m.weibo.cn/s/video/show?object_id=1034:42";
    let html = feed(&[original(
        "Ov1",
        "今天 14:30",
        &format!(r#"<a href="{video_page}">某人的微博视频</a>"#),
    )]);
    let client = ScriptedClient::default()
        .with_page(HOME, &html)
        .with_stream(video_page, "https://f.video.weibocdn.com/42.mp4");
    let session = loaded(client, false).await;

    let page = session
        .get_one_page(Vec::new(), at(14, 0), now())
        .await
        .unwrap();
    assert_eq!(
        page.posts[0].video_url.as_deref(),
        Some("https://f.video.weibocdn.com/42.mp4")
    );
}

#[tokio::test]
async fn test_truncated_post_resolves_video_from_detail_page() {
    let video_page = "https://m.weibo.cn/s/video/show?object_id=1034:77";
    let html = feed(&[original(
        "Ov2",
        "今天 14:30",
        r#"<a href="https://weibo.cn/comment/Ov2">全文</a>"#,
    )]);
    let detail = format!(
        r#"<html><body><div class="c">header</div><div class="c" id="M_Ov2"><div><a href="https://weibo.cn/u/1001">Author</a>:<span class="ctt">the long video post</span><a href="{video_page}">某人的微博视频</a>&nbsp;<span class="ct">今天 14:30&nbsp;来自iPhone客户端</span></div></div></body></html>"#
    );
    let client = ScriptedClient::default()
        .with_page(HOME, &html)
        .with_page("https://weibo.cn/comment/Ov2", &detail)
        .with_stream(video_page, "https://f.video.weibocdn.com/77.mp4");
    let session = loaded(client, false).await;

    let page = session
        .get_one_page(Vec::new(), at(14, 0), now())
        .await
        .unwrap();
    let post = &page.posts[0];
    assert_eq!(
        post.video_url.as_deref(),
        Some("https://f.video.weibocdn.com/77.mp4")
    );
    assert!(post.content.starts_with("the long video post"));
}

#[tokio::test]
async fn test_truncated_repost_uses_expanded_quoted_text() {
    let html = feed(&[repost("Rr2", "Qq2").replace(
        r#"<span class="ctt">quoted text</span>"#,
        r#"<span class="ctt">quoted te</span><a href="https://weibo.cn/comment/Rr2">全文</a>"#,
    )]);
    let detail = r#"<html><body><div class="c">header</div><div class="c" id="M_Rr2"><div><span class="cmt">转发了&nbsp;<a href="https://weibo.cn/u/2002">OrigUser</a>&nbsp;的微博:</span><span class="ctt">the whole quoted post</span>&nbsp;<span class="cmt">原文转发[20]</span></div><div><span class="cmt">转发理由:</span>my reason&nbsp;<span class="ct">今天 14:40&nbsp;来自微博 weibo.com</span></div></div></body></html>"#;
    let client = ScriptedClient::default()
        .with_page(HOME, &html)
        .with_page("https://weibo.cn/comment/Rr2", detail);
    let session = loaded(client, false).await;

    let page = session
        .get_one_page(Vec::new(), at(14, 0), now())
        .await
        .unwrap();
    assert_eq!(
        page.posts[0].content,
        "转发理由:my reason\n原始用户: OrigUser\n转发内容: the whole quoted post"
    );
    assert!(session.client().requests_to("https://weibo.cn/comment/Rr2") >= 1);
}

#[tokio::test]
async fn test_unparseable_time_is_kept() {
    let html = feed(&[original("Ou1", "很久以前", "")]);
    let session = loaded(ScriptedClient::default().with_page(HOME, &html), false).await;

    let page = session
        .get_one_page(Vec::new(), at(14, 0), now())
        .await
        .unwrap();
    assert_eq!(page.posts.len(), 1);
    assert!(page.posts[0].publish_time.is_none());
    assert!(page.to_continue);
}
