use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::constants::WEIBO_BASE_URL;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Feed
    pub cookie: String,
    pub feed_base_url: String,
    pub filter_reposts: bool,
    pub refresh_interval: Duration,
    pub request_timeout: Duration,
    pub seen_id_capacity: usize,

    // Output
    pub write_modes: Vec<WriteMode>,
    pub output_dir: PathBuf,
    pub database_path: PathBuf,

    // Media
    pub pic_download: bool,
    pub video_download: bool,
    pub download_retries: u32,
    pub download_connect_timeout: Duration,
    pub download_read_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Append rows to `weibo.csv`
    Csv,
    /// Append readable blocks to `weibo.txt`
    Txt,
    /// Keep `weibo.json` merged by post id
    Json,
    /// Upsert into the SQLite database
    Sqlite,
}

impl WriteMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Txt => "txt",
            Self::Json => "json",
            Self::Sqlite => "sqlite",
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Feed
            cookie: required_env("WEIBO_COOKIE")?,
            feed_base_url: env_or_default("FEED_BASE_URL", WEIBO_BASE_URL),
            filter_reposts: parse_env_bool("FILTER_REPOSTS", false)?,
            refresh_interval: Duration::from_secs(parse_env_u64("REFRESH_INTERVAL_SECS", 300)?),
            request_timeout: Duration::from_secs(parse_env_u64("REQUEST_TIMEOUT_SECS", 30)?),
            seen_id_capacity: parse_env_usize("SEEN_ID_CAPACITY", 1000)?,

            // Output
            write_modes: parse_write_modes(&env_or_default("WRITE_MODE", "txt"))?,
            output_dir: PathBuf::from(env_or_default("OUTPUT_DIR", "./weibo")),
            database_path: PathBuf::from(env_or_default("DATABASE_PATH", "./weibo/weibo.sqlite")),

            // Media
            pic_download: parse_env_bool("PIC_DOWNLOAD", false)?,
            video_download: parse_env_bool("VIDEO_DOWNLOAD", false)?,
            download_retries: parse_env_u32("DOWNLOAD_RETRIES", 5)?,
            download_connect_timeout: Duration::from_secs(parse_env_u64(
                "DOWNLOAD_CONNECT_TIMEOUT_SECS",
                5,
            )?),
            download_read_timeout: Duration::from_secs(parse_env_u64(
                "DOWNLOAD_READ_TIMEOUT_SECS",
                10,
            )?),
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cookie.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "WEIBO_COOKIE".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if let Err(e) = url::Url::parse(&self.feed_base_url) {
            return Err(ConfigError::InvalidValue {
                name: "FEED_BASE_URL".to_string(),
                message: format!("not a valid URL: {e}"),
            });
        }
        if self.refresh_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "REFRESH_INTERVAL_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.seen_id_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                name: "SEEN_ID_CAPACITY".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.write_modes.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "WRITE_MODE".to_string(),
                message: "must name at least one of csv, txt, json, sqlite".to_string(),
            });
        }
        Ok(())
    }

    /// Defaults with a placeholder cookie, for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            cookie: "SUB=test".to_string(),
            feed_base_url: WEIBO_BASE_URL.to_string(),
            filter_reposts: false,
            refresh_interval: Duration::from_secs(300),
            request_timeout: Duration::from_secs(30),
            seen_id_capacity: 1000,
            write_modes: vec![WriteMode::Txt],
            output_dir: PathBuf::from("./weibo"),
            database_path: PathBuf::from("./weibo/weibo.sqlite"),
            pic_download: false,
            video_download: false,
            download_retries: 5,
            download_connect_timeout: Duration::from_secs(5),
            download_read_timeout: Duration::from_secs(10),
        }
    }

    /// Whether `mode` is among the configured write modes.
    #[must_use]
    pub fn writes(&self, mode: WriteMode) -> bool {
        self.write_modes.contains(&mode)
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}

fn parse_write_modes(value: &str) -> Result<Vec<WriteMode>, ConfigError> {
    let mut modes = Vec::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let mode = match part.to_lowercase().as_str() {
            "csv" => WriteMode::Csv,
            "txt" => WriteMode::Txt,
            "json" => WriteMode::Json,
            "sqlite" => WriteMode::Sqlite,
            _ => {
                return Err(ConfigError::InvalidValue {
                    name: "WRITE_MODE".to_string(),
                    message: format!("must be a comma list of csv, txt, json, sqlite, got '{part}'"),
                })
            }
        };
        if !modes.contains(&mode) {
            modes.push(mode);
        }
    }
    Ok(modes)
}
