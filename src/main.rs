use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use weibo_feed_spider::config::{Config, WriteMode};
use weibo_feed_spider::db::Database;
use weibo_feed_spider::download::MediaDownloader;
use weibo_feed_spider::feed::{Endpoints, FeedError, HttpFeedClient, PageSession};
use weibo_feed_spider::spider::Spider;
use weibo_feed_spider::writer::WriterSet;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // Initialize logging
    init_tracing()?;

    info!("Starting weibo-feed-spider");

    // Load and validate configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(
        feed = %config.feed_base_url,
        filter_reposts = config.filter_reposts,
        refresh_secs = config.refresh_interval.as_secs(),
        write_modes = ?config.write_modes.iter().map(WriteMode::as_str).collect::<Vec<_>>(),
        "Configuration loaded"
    );

    // Ensure output directory exists
    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create output directory: {}",
                config.output_dir.display()
            )
        })?;

    let db = if config.writes(WriteMode::Sqlite) {
        if let Some(parent) = config.database_path.parent() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }
        let db = Database::new(&config.database_path)
            .await
            .context("Failed to initialize database")?;
        info!(path = %config.database_path.display(), "Database initialized");
        Some(db)
    } else {
        None
    };

    let client = HttpFeedClient::new(&config.cookie, config.request_timeout)
        .context("Failed to initialize feed client")?;
    let session = PageSession::new(
        client,
        Endpoints::new(&config.feed_base_url),
        config.filter_reposts,
    );
    let writers = WriterSet::from_config(&config, db);
    let downloaders =
        MediaDownloader::from_config(&config).context("Failed to initialize downloaders")?;
    if downloaders.is_empty() {
        info!("Media downloads disabled");
    }

    let mut spider = Spider::new(session, writers, downloaders, &config);

    tokio::select! {
        result = spider.run() => {
            if let Err(e) = result {
                report_feed_error(&e);
                return Err(e.into());
            }
        }
        () = shutdown_signal() => {
            info!("Shutting down...");
        }
    }

    info!("Shutdown complete");

    Ok(())
}

fn report_feed_error(e: &FeedError) {
    match e {
        FeedError::PicturesHidden { .. } => {
            warn!("Enable picture display for the account before running again");
        }
        FeedError::MalformedFooter { footer, .. } => {
            warn!(footer = %footer, "Feed markup changed; the footer could not be read");
        }
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,weibo_feed_spider=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        // Structured JSON logging for production
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        // Pretty-printed logging for development
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
