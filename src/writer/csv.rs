use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::PostWriter;
use crate::feed::Post;

const HEADER: [&str; 14] = [
    "微博id",
    "用户id",
    "微博正文",
    "是否原创",
    "头条文章url",
    "原始图片url",
    "被转发微博图片url",
    "视频url",
    "微博发布位置",
    "微博发布时间",
    "微博发布工具",
    "点赞数",
    "转发数",
    "评论数",
];

/// Appends one row per post to `weibo.csv`, writing the header on first use.
#[derive(Debug, Clone)]
pub struct CsvWriter {
    path: PathBuf,
}

impl CsvWriter {
    #[must_use]
    pub fn new(output_dir: &Path) -> Self {
        Self {
            path: output_dir.join("weibo.csv"),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn needs_header(&self) -> bool {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len() == 0,
            Err(_) => true,
        }
    }
}

fn record(post: &Post) -> [String; 14] {
    [
        post.id.clone(),
        post.user_id.clone(),
        post.content.clone(),
        if post.is_repost { "否" } else { "是" }.to_string(),
        post.article_url.clone().unwrap_or_default(),
        post.original_pictures.join(","),
        post.repost_pictures.join(","),
        post.video_url.clone().unwrap_or_default(),
        post.publish_place.clone().unwrap_or_default(),
        post.publish_time_label().unwrap_or_default(),
        post.publish_tool.clone().unwrap_or_default(),
        post.like_count.to_string(),
        post.repost_count.to_string(),
        post.comment_count.to_string(),
    ]
}

/// Serialize `posts` as CSV rows, optionally preceded by the header row.
fn encode_rows(posts: &[Post], header: bool) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    if header {
        wtr.write_record(HEADER).context("Failed to encode csv header")?;
    }
    for post in posts {
        wtr.write_record(record(post))
            .with_context(|| format!("Failed to encode post {}", post.id))?;
    }
    wtr.into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush csv rows: {e}"))
}

#[async_trait]
impl PostWriter for CsvWriter {
    fn name(&self) -> &'static str {
        "csv"
    }

    async fn write_posts(&self, posts: &[Post]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let rows = encode_rows(posts, self.needs_header().await)?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        file.write_all(&rows)
            .await
            .with_context(|| format!("Failed to append to {}", self.path.display()))?;
        file.flush().await?;
        Ok(())
    }
}
