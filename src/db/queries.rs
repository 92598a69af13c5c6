use anyhow::{Context, Result};
use sqlx::SqlitePool;

use super::models::{NewStoredPost, StoredPost};

// ========== Weibo ==========

/// Get a stored post by its id.
pub async fn get_post(pool: &SqlitePool, id: &str) -> Result<Option<StoredPost>> {
    sqlx::query_as("SELECT * FROM weibo WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch weibo by id")
}

/// Check whether a post is already stored.
pub async fn post_exists(pool: &SqlitePool, id: &str) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM weibo WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to check weibo existence")?;
    Ok(row.is_some())
}

/// Insert a post or refresh every column of an existing one.
///
/// Returns `true` when the post was not stored before.
pub async fn upsert_post(pool: &SqlitePool, post: &NewStoredPost) -> Result<bool> {
    let existed = post_exists(pool, &post.id).await?;

    sqlx::query(
        r"
        INSERT INTO weibo (
            id, user_id, is_repost, content, article_url, original_pictures,
            repost_pictures, video_url, publish_place, publish_time, publish_tool,
            like_count, repost_count, comment_count
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            user_id = excluded.user_id,
            is_repost = excluded.is_repost,
            content = excluded.content,
            article_url = excluded.article_url,
            original_pictures = excluded.original_pictures,
            repost_pictures = excluded.repost_pictures,
            video_url = excluded.video_url,
            publish_place = excluded.publish_place,
            publish_time = excluded.publish_time,
            publish_tool = excluded.publish_tool,
            like_count = excluded.like_count,
            repost_count = excluded.repost_count,
            comment_count = excluded.comment_count,
            updated_at = datetime('now')
        ",
    )
    .bind(&post.id)
    .bind(&post.user_id)
    .bind(post.is_repost)
    .bind(&post.content)
    .bind(&post.article_url)
    .bind(&post.original_pictures)
    .bind(&post.repost_pictures)
    .bind(&post.video_url)
    .bind(&post.publish_place)
    .bind(&post.publish_time)
    .bind(&post.publish_tool)
    .bind(post.like_count)
    .bind(post.repost_count)
    .bind(post.comment_count)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to upsert weibo {}", post.id))?;

    Ok(!existed)
}

/// Count stored posts.
pub async fn count_posts(pool: &SqlitePool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM weibo")
        .fetch_one(pool)
        .await
        .context("Failed to count weibo")?;
    Ok(count)
}

/// Most recently published posts first, undated ones last.
pub async fn get_recent_posts(pool: &SqlitePool, limit: i64) -> Result<Vec<StoredPost>> {
    sqlx::query_as(
        r"
        SELECT * FROM weibo
        ORDER BY publish_time IS NULL, publish_time DESC, id DESC
        LIMIT ?
        ",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to fetch recent weibo")
}
