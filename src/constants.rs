//! Shared constants used across the application.

/// User agent sent with feed and media requests.
///
/// The mobile site serves the plain markup the extractors understand to a
/// regular desktop browser.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Host the feed markup links to, regardless of where it was fetched from.
pub const WEIBO_BASE_URL: &str = "https://weibo.cn";
