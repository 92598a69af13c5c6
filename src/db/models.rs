use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::feed::time::TIME_FORMAT;
use crate::feed::Post;

/// A row of the `weibo` table.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredPost {
    pub id: String,
    pub user_id: String,
    pub is_repost: bool,
    pub content: String,
    pub article_url: Option<String>,
    pub original_pictures: String,
    pub repost_pictures: String,
    pub video_url: Option<String>,
    pub publish_place: Option<String>,
    pub publish_time: Option<String>,
    pub publish_tool: Option<String>,
    pub like_count: i64,
    pub repost_count: i64,
    pub comment_count: i64,
    pub first_seen_at: String,
    pub updated_at: String,
}

impl StoredPost {
    /// Rebuild the extracted post.
    ///
    /// # Errors
    ///
    /// Returns an error if a picture column is not a JSON array or the publish
    /// time is not in the stored format.
    pub fn into_post(self) -> Result<Post> {
        let publish_time = self
            .publish_time
            .as_deref()
            .map(|t| NaiveDateTime::parse_from_str(t, TIME_FORMAT))
            .transpose()
            .with_context(|| format!("Invalid publish_time for weibo {}", self.id))?;

        Ok(Post {
            original_pictures: serde_json::from_str(&self.original_pictures)
                .with_context(|| format!("Invalid original_pictures for weibo {}", self.id))?,
            repost_pictures: serde_json::from_str(&self.repost_pictures)
                .with_context(|| format!("Invalid repost_pictures for weibo {}", self.id))?,
            id: self.id,
            user_id: self.user_id,
            is_repost: self.is_repost,
            content: self.content,
            article_url: self.article_url,
            video_url: self.video_url,
            publish_place: self.publish_place,
            publish_time,
            publish_tool: self.publish_tool,
            like_count: count_from_row(self.like_count),
            repost_count: count_from_row(self.repost_count),
            comment_count: count_from_row(self.comment_count),
        })
    }
}

/// Column values for inserting or refreshing a post.
#[derive(Debug, Clone)]
pub struct NewStoredPost {
    pub id: String,
    pub user_id: String,
    pub is_repost: bool,
    pub content: String,
    pub article_url: Option<String>,
    pub original_pictures: String,
    pub repost_pictures: String,
    pub video_url: Option<String>,
    pub publish_place: Option<String>,
    pub publish_time: Option<String>,
    pub publish_tool: Option<String>,
    pub like_count: i64,
    pub repost_count: i64,
    pub comment_count: i64,
}

impl NewStoredPost {
    /// Column values for `post`.
    ///
    /// # Errors
    ///
    /// Returns an error if a picture list cannot be serialized.
    pub fn from_post(post: &Post) -> Result<Self> {
        Ok(Self {
            id: post.id.clone(),
            user_id: post.user_id.clone(),
            is_repost: post.is_repost,
            content: post.content.clone(),
            article_url: post.article_url.clone(),
            original_pictures: serde_json::to_string(&post.original_pictures)
                .context("Failed to serialize original_pictures")?,
            repost_pictures: serde_json::to_string(&post.repost_pictures)
                .context("Failed to serialize repost_pictures")?,
            video_url: post.video_url.clone(),
            publish_place: post.publish_place.clone(),
            publish_time: post.publish_time_label(),
            publish_tool: post.publish_tool.clone(),
            like_count: count_to_row(post.like_count),
            repost_count: count_to_row(post.repost_count),
            comment_count: count_to_row(post.comment_count),
        })
    }
}

fn count_to_row(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

fn count_from_row(count: i64) -> u64 {
    u64::try_from(count).unwrap_or_default()
}
