//! Configuration module for the flashcards backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::clock::DayBoundary;
use crate::errors::AppError;

/// Connection details for the remote table store.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub url: String,
    pub api_key: String,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Remote mirror; local-only when absent
    pub remote: Option<RemoteConfig>,
    /// Zone that decides calendar-day boundaries for streaks
    pub day_boundary: DayBoundary,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let db_path = env::var("FLASHCARDS_DB_PATH")
            .unwrap_or_else(|_| "./data/flashcards.sqlite".to_string())
            .into();

        let bind_addr = env::var("FLASHCARDS_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid FLASHCARDS_BIND_ADDR: {}", e)))?;

        let log_level = env::var("FLASHCARDS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let remote = match (
            env::var("FLASHCARDS_REMOTE_URL").ok().filter(|s| !s.is_empty()),
            env::var("FLASHCARDS_REMOTE_KEY").ok(),
        ) {
            (Some(url), Some(api_key)) => Some(RemoteConfig { url, api_key }),
            (Some(_), None) => {
                return Err(AppError::Config(
                    "FLASHCARDS_REMOTE_URL is set but FLASHCARDS_REMOTE_KEY is missing".to_string(),
                ))
            }
            (None, _) => None,
        };

        let day_boundary = match env::var("FLASHCARDS_DAY_BOUNDARY") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| AppError::Config(format!("Invalid FLASHCARDS_DAY_BOUNDARY: {}", e)))?,
            Err(_) => DayBoundary::default(),
        };

        Ok(Self {
            db_path,
            bind_addr,
            log_level,
            remote,
            day_boundary,
        })
    }
}
