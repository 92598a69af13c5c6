use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::PostWriter;
use crate::db::{upsert_post, Database, NewStoredPost};
use crate::feed::Post;

/// Upserts posts into the `weibo` table.
#[derive(Debug, Clone)]
pub struct SqliteWriter {
    db: Database,
}

impl SqliteWriter {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PostWriter for SqliteWriter {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn write_posts(&self, posts: &[Post]) -> Result<()> {
        let mut inserted = 0usize;
        for post in posts {
            let row = NewStoredPost::from_post(post)?;
            if upsert_post(self.db.pool(), &row).await? {
                inserted += 1;
            }
        }
        debug!(inserted, updated = posts.len() - inserted, "Stored posts in sqlite");
        Ok(())
    }
}
