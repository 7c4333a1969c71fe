//! Cite-Ripple: a polite citation graph harvester
//!
//! This crate harvests bibliographic records and their citation relationships
//! from a remote metadata service, deduplicates author affiliations through
//! fuzzy matching, and builds a citation graph in a SQLite store.

pub mod affiliation;
pub mod config;
pub mod crawler;
pub mod gateway;
pub mod model;
pub mod output;
pub mod storage;

use thiserror::Error;

/// Main error type for Cite-Ripple operations
#[derive(Debug, Error)]
pub enum RippleError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Metadata fetch failed: {0}")]
    Fetch(#[from] gateway::FetchError),

    #[error("No DOI could be recovered for article {numeric_id}")]
    MissingIdentifier { numeric_id: String },

    #[error("Malformed record {numeric_id}: {reason}")]
    MalformedRecord { numeric_id: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RippleError {
    /// Whether this error should abort the whole crawl rather than a single item
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_fatal(),
            Self::Config(_) | Self::Io(_) => true,
            _ => false,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Cite-Ripple operations
pub type Result<T> = std::result::Result<T, RippleError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use affiliation::{AffiliationResolver, Components};
pub use config::Config;
pub use crawler::{CitationGraphCrawler, CrawlAborted, CrawlStats, StopHandle};
pub use gateway::{EntrezClient, MetadataApi, MetadataGateway, RateLimiter, RetryPolicy};
pub use model::{ArticleRecord, AuthorRecord, CitationEdge};
