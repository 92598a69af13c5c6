//! Weibo feed spider library.
//!
//! Polls the home timeline of a logged-in weibo.cn account, extracts new
//! posts and hands them to writers and media downloaders.

// Allow raw string hashes for safety - they're harmless and prevent issues if content changes
#![allow(clippy::needless_raw_string_hashes)]

pub mod config;
pub mod constants;
pub mod db;
pub mod download;
pub mod feed;
pub mod spider;
pub mod writer;
