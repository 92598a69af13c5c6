use thiserror::Error;

/// Account settings page where inline images can be switched back on.
pub const PICTURE_SETTINGS_URL: &str = "https://weibo.cn/account/customize/pic";

/// Errors that abort a whole poll.
///
/// Everything else the extraction pipeline runs into is logged and degraded to a
/// field sentinel.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error(
        "the account hides pictures in the feed; open {PICTURE_SETTINGS_URL} and set picture display to \"显示\" (post {post_id})"
    )]
    PicturesHidden { post_id: String },

    #[error("could not read like/repost/comment counts for post {post_id} from footer {footer:?}")]
    MalformedFooter { post_id: String, footer: String },
}

/// Errors from the HTTP collaborator.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
}
