use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::PostWriter;
use crate::feed::Post;

/// Appends the readable block of each post to `weibo.txt`.
#[derive(Debug, Clone)]
pub struct TxtWriter {
    path: PathBuf,
}

impl TxtWriter {
    #[must_use]
    pub fn new(output_dir: &Path) -> Self {
        Self {
            path: output_dir.join("weibo.txt"),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PostWriter for TxtWriter {
    fn name(&self) -> &'static str {
        "txt"
    }

    async fn write_posts(&self, posts: &[Post]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut text = String::new();
        for post in posts {
            text.push_str(&post.to_string());
            text.push_str("\n\n");
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        file.write_all(text.as_bytes())
            .await
            .with_context(|| format!("Failed to append to {}", self.path.display()))?;
        file.flush().await?;
        Ok(())
    }
}
