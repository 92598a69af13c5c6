use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::PostWriter;
use crate::feed::Post;

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonDocument {
    #[serde(default)]
    weibo: Vec<Post>,
}

/// Keeps `weibo.json` as a single document merged by post id.
#[derive(Debug, Clone)]
pub struct JsonWriter {
    path: PathBuf,
}

impl JsonWriter {
    #[must_use]
    pub fn new(output_dir: &Path) -> Self {
        Self {
            path: output_dir.join("weibo.json"),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<JsonDocument> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(JsonDocument::default()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        }
    }
}

/// Replace entries with the same id in place, append the rest.
fn merge(existing: &mut Vec<Post>, posts: &[Post]) {
    for post in posts {
        if let Some(slot) = existing.iter_mut().find(|p| p.id == post.id) {
            *slot = post.clone();
        } else {
            existing.push(post.clone());
        }
    }
}

#[async_trait]
impl PostWriter for JsonWriter {
    fn name(&self) -> &'static str {
        "json"
    }

    async fn write_posts(&self, posts: &[Post]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut document = self.load().await?;
        merge(&mut document.weibo, posts);
        debug!(total = document.weibo.len(), "Merged posts into json document");

        let text = serde_json::to_string_pretty(&document).context("Failed to serialize posts")?;
        tokio::fs::write(&self.path, text)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}
