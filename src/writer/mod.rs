//! Persistence targets for extracted posts.

mod csv;
mod json;
mod sqlite;
mod txt;

pub use self::csv::CsvWriter;
pub use json::JsonWriter;
pub use sqlite::SqliteWriter;
pub use txt::TxtWriter;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, error};

use crate::config::{Config, WriteMode};
use crate::db::Database;
use crate::feed::Post;

/// A destination for the posts of one poll.
#[async_trait]
pub trait PostWriter: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Persist `posts` in page order.
    async fn write_posts(&self, posts: &[Post]) -> Result<()>;
}

/// The writers enabled for this run.
pub struct WriterSet {
    writers: Vec<Box<dyn PostWriter>>,
}

impl WriterSet {
    /// Create a new empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            writers: Vec::new(),
        }
    }

    /// Build the writers named by the configured write modes.
    ///
    /// `db` is required only when the sqlite mode is enabled.
    #[must_use]
    pub fn from_config(config: &Config, db: Option<Database>) -> Self {
        let mut set = Self::new();
        for mode in &config.write_modes {
            match mode {
                WriteMode::Csv => set.register(Box::new(CsvWriter::new(&config.output_dir))),
                WriteMode::Txt => set.register(Box::new(TxtWriter::new(&config.output_dir))),
                WriteMode::Json => set.register(Box::new(JsonWriter::new(&config.output_dir))),
                WriteMode::Sqlite => match db.clone() {
                    Some(db) => set.register(Box::new(SqliteWriter::new(db))),
                    None => error!("sqlite write mode enabled without a database"),
                },
            }
        }
        set
    }

    /// Register a writer.
    pub fn register(&mut self, writer: Box<dyn PostWriter>) {
        self.writers.push(writer);
    }

    /// Get all registered writers.
    #[must_use]
    pub fn writers(&self) -> &[Box<dyn PostWriter>] {
        &self.writers
    }

    /// Hand `posts` to every writer; a failing writer does not stop the others.
    ///
    /// Returns the number of writers that failed.
    pub async fn write_all(&self, posts: &[Post]) -> usize {
        if posts.is_empty() {
            return 0;
        }
        let mut failures = 0;
        for writer in &self.writers {
            match writer.write_posts(posts).await {
                Ok(()) => debug!(writer = writer.name(), count = posts.len(), "Posts written"),
                Err(e) => {
                    error!(writer = writer.name(), "Failed to write posts: {e:#}");
                    failures += 1;
                }
            }
        }
        failures
    }
}

impl Default for WriterSet {
    fn default() -> Self {
        Self::new()
    }
}
