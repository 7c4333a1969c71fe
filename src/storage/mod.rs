//! Storage module for persisting the citation graph
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization and schema management
//! - Article, author and keyword persistence
//! - Citation edges, dangling ones included
//! - Affiliation entities
//! - Run tracking

mod schema;
mod sqlite;
mod traits;

pub use sqlite::{init_database, SqliteStorage};
pub use traits::{MissingIdSink, StorageError, StorageResult, Store};

use crate::RippleError;

use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(RippleError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, RippleError> {
    SqliteStorage::new(path)
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    /// "graph", "keyword" or "refresh"
    pub kind: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub totals: RunTotals,
}

/// Counters written back when a run finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub articles_saved: u64,
    pub edges_saved: u64,
    pub levels_processed: u64,
    pub failures: u64,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
