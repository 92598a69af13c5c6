use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

/// Run all pending migrations.
pub async fn run(pool: &SqlitePool) -> Result<()> {
    create_migration_table(pool).await?;
    let current_version = get_schema_version(pool).await?;

    if current_version < 1 {
        debug!("Running migration v1");
        run_migration_v1(pool).await?;
        set_schema_version(pool, 1).await?;
    }

    if current_version < 2 {
        debug!("Running migration v2");
        run_migration_v2(pool).await?;
        set_schema_version(pool, 2).await?;
    }

    Ok(())
}

async fn create_migration_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS _schema_version (
            version INTEGER PRIMARY KEY
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create schema version table")?;

    Ok(())
}

async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT version FROM _schema_version LIMIT 1")
        .fetch_optional(pool)
        .await
        .context("Failed to get schema version")?;

    Ok(row.map_or(0, |(v,)| v))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("DELETE FROM _schema_version")
        .execute(pool)
        .await?;
    sqlx::query("INSERT INTO _schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

async fn run_migration_v1(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v1: creating weibo table");

    // Picture lists are stored as JSON arrays
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS weibo (
            id TEXT PRIMARY KEY NOT NULL,
            user_id TEXT NOT NULL,
            is_repost INTEGER NOT NULL DEFAULT 0,
            content TEXT NOT NULL,
            article_url TEXT,
            original_pictures TEXT NOT NULL DEFAULT '[]',
            repost_pictures TEXT NOT NULL DEFAULT '[]',
            video_url TEXT,
            publish_place TEXT,
            publish_time TEXT,
            publish_tool TEXT,
            like_count INTEGER NOT NULL DEFAULT 0,
            repost_count INTEGER NOT NULL DEFAULT 0,
            comment_count INTEGER NOT NULL DEFAULT 0,
            first_seen_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create weibo table")?;

    Ok(())
}

async fn run_migration_v2(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v2: indexing weibo by user and publish time");

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_weibo_user_id ON weibo(user_id)")
        .execute(pool)
        .await
        .context("Failed to create user_id index")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_weibo_publish_time ON weibo(publish_time)")
        .execute(pool)
        .await
        .context("Failed to create publish_time index")?;

    Ok(())
}
