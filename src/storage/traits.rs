//! Storage traits and error types
//!
//! This module defines the trait interface the crawler writes through and
//! the side channel for articles whose DOI cannot be recovered.

use crate::affiliation::AffiliationEntity;
use crate::model::{ArticleRecord, CitationEdge, StoredArticle};
use crate::storage::{RunRecord, RunStatus, RunTotals};
use rusqlite::ErrorCode;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Article {0} has no DOI and cannot be stored in the graph")]
    MissingDoi(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    /// Whether the store itself is unusable, as opposed to one write failing
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::CannotOpen
                    | ErrorCode::NotADatabase
                    | ErrorCode::DatabaseCorrupt
                    | ErrorCode::DiskFull
                    | ErrorCode::ReadOnly
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::PermissionDenied
            ),
            Self::Io(_) | Self::LockPoisoned => true,
            _ => false,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence interface for the citation graph
///
/// Implementations keep each article write atomic: a failed
/// `upsert_article` leaves no partial authors, links or keywords behind.
pub trait Store {
    // ===== Articles =====

    /// Numeric IDs of every article the store already knows about, including
    /// articles recorded as missing a DOI
    fn known_numeric_ids(&self) -> StorageResult<HashSet<String>>;

    fn find_by_numeric_id(&self, numeric_id: &str) -> StorageResult<Option<StoredArticle>>;

    fn find_by_doi(&self, doi: &str) -> StorageResult<Option<StoredArticle>>;

    /// Numeric IDs of stored articles last crawled before `crawled_before`
    /// (an RFC 3339 timestamp), oldest first
    fn stale_numeric_ids(&self, crawled_before: &str, limit: usize) -> StorageResult<Vec<String>>;

    /// Inserts or refreshes an article together with its authors, keywords,
    /// publication types, grants and MeSH headings
    ///
    /// # Arguments
    ///
    /// * `record` - The article; must carry a DOI
    /// * `affiliation_ids` - Resolved affiliation ids per author, aligned with `record.authors`
    ///
    /// # Returns
    ///
    /// `true` if the article was new, `false` if an existing row was refreshed
    fn upsert_article(
        &mut self,
        record: &ArticleRecord,
        affiliation_ids: &[Vec<i64>],
    ) -> StorageResult<bool>;

    // ===== Citation edges =====

    /// Records a citation edge
    ///
    /// # Returns
    ///
    /// `true` if the edge was inserted or resolved a previously dangling
    /// edge, `false` if it was already known
    fn upsert_citation_edge(&mut self, edge: &CitationEdge) -> StorageResult<bool>;

    /// Outgoing edges of one article, in reference order
    fn citation_edges_from(&self, citing_doi: &str) -> StorageResult<Vec<CitationEdge>>;

    // ===== Affiliations =====

    /// All affiliation entities as `(id, raw text)`, in creation order
    fn all_affiliations(&self) -> StorageResult<Vec<(i64, String)>>;

    /// Stores an entity, returning the id of the row holding its normalized text
    fn upsert_affiliation(&mut self, entity: &AffiliationEntity) -> StorageResult<i64>;

    // ===== Run Management =====

    fn create_run(&mut self, kind: &str, config_hash: &str) -> StorageResult<i64>;

    fn finish_run(&mut self, run_id: i64, status: RunStatus, totals: &RunTotals)
        -> StorageResult<()>;

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    // ===== Statistics =====

    fn count_articles(&self) -> StorageResult<u64>;

    fn count_authors(&self) -> StorageResult<u64>;

    fn count_edges(&self) -> StorageResult<u64>;

    fn count_dangling_edges(&self) -> StorageResult<u64>;

    fn count_affiliations(&self) -> StorageResult<u64>;

    fn count_missing_doi(&self) -> StorageResult<u64>;
}

/// Side channel for articles whose DOI stayed unknown after a re-fetch
pub trait MissingIdSink {
    fn record(&mut self, record: &ArticleRecord) -> StorageResult<()>;
}

impl<T: MissingIdSink> MissingIdSink for Arc<Mutex<T>> {
    fn record(&mut self, record: &ArticleRecord) -> StorageResult<()> {
        self.lock()
            .map_err(|_| StorageError::LockPoisoned)?
            .record(record)
    }
}

impl MissingIdSink for Vec<ArticleRecord> {
    fn record(&mut self, record: &ArticleRecord) -> StorageResult<()> {
        self.push(record.clone());
        Ok(())
    }
}
