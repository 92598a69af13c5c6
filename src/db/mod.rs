mod migrations;
mod models;
mod queries;

pub use models::*;
pub use queries::*;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

/// SQLite store for extracted posts.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection, running migrations if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or migrations fail.
    pub async fn new(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Readers outside the spider may hold the lock while a poll writes
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        let db = Self { pool };
        db.run_migrations().await?;
        db.verify_writable(path).await?;

        Ok(db)
    }

    /// Fail at startup instead of after the first poll with new posts.
    ///
    /// Writer failures only get logged while the spider keeps polling, so a
    /// read-only store would otherwise drop every post silently. A no-op
    /// `DELETE` takes SQLite's write lock without touching any row.
    async fn verify_writable(&self, path: &Path) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to open SQLite writability check")?;
        sqlx::query("DELETE FROM weibo WHERE 0")
            .execute(&mut *tx)
            .await
            .with_context(|| {
                format!(
                    "SQLite database is not writable (path: {}). Check that DATABASE_PATH points to a writable file",
                    path.display()
                )
            })?;
        tx.rollback()
            .await
            .context("Failed to finish SQLite writability check")?;
        Ok(())
    }

    /// Run all pending migrations.
    async fn run_migrations(&self) -> Result<()> {
        migrations::run(&self.pool).await?;
        info!("Database migrations complete");
        Ok(())
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
