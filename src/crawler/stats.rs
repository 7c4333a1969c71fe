//! Crawl statistics and per-item issue accumulation

use crate::storage::RunTotals;
use crate::RippleError;
use std::fmt;
use thiserror::Error;

/// States of one graph crawl, in the order they are visited per level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlPhase {
    Seed,
    ExpandLevel,
    FetchRefs,
    DiscoverNew,
    FetchDetails,
    ResolveDoi,
    Persist,
    AdvanceDepth,
    Terminate,
}

impl CrawlPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seed => "seed",
            Self::ExpandLevel => "expand_level",
            Self::FetchRefs => "fetch_refs",
            Self::DiscoverNew => "discover_new",
            Self::FetchDetails => "fetch_details",
            Self::ResolveDoi => "resolve_doi",
            Self::Persist => "persist",
            Self::AdvanceDepth => "advance_depth",
            Self::Terminate => "terminate",
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-fatal failure affecting one ID or one batch
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlIssue {
    pub phase: CrawlPhase,
    pub numeric_id: Option<String>,
    pub message: String,
}

impl fmt::Display for CrawlIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.numeric_id {
            Some(id) => write!(f, "[{}] {}: {}", self.phase, id, self.message),
            None => write!(f, "[{}] {}", self.phase, self.message),
        }
    }
}

/// Aggregate result of a crawl, returned even when items failed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlStats {
    /// Articles newly inserted into the store
    pub articles_saved: u64,
    /// Existing articles whose metadata was refreshed
    pub articles_refreshed: u64,
    /// Edges inserted, or dangling edges resolved
    pub edges_saved: u64,
    /// Of `edges_saved`, those stored without a cited DOI
    pub dangling_edges: u64,
    /// Links whose citing side has no stored DOI
    pub edges_skipped: u64,
    pub levels_processed: u64,
    /// IDs scheduled by this crawl (seeds included)
    pub ids_scheduled: u64,
    /// Records routed to the missing-DOI sink
    pub missing_doi: u64,
    /// Set when a stop was requested before the crawl finished
    pub stopped: bool,
    pub errors: Vec<CrawlIssue>,
}

impl CrawlStats {
    /// Records a non-fatal failure and logs it
    pub fn record_issue(
        &mut self,
        phase: CrawlPhase,
        numeric_id: Option<&str>,
        error: impl fmt::Display,
    ) {
        let issue = CrawlIssue {
            phase,
            numeric_id: numeric_id.map(str::to_string),
            message: error.to_string(),
        };
        tracing::warn!("{}", issue);
        self.errors.push(issue);
    }

    pub fn failures(&self) -> u64 {
        self.errors.len() as u64
    }

    /// Folds the statistics of a follow-up crawl into this one
    pub fn merge(&mut self, other: CrawlStats) {
        self.articles_saved += other.articles_saved;
        self.articles_refreshed += other.articles_refreshed;
        self.edges_saved += other.edges_saved;
        self.dangling_edges += other.dangling_edges;
        self.edges_skipped += other.edges_skipped;
        self.levels_processed += other.levels_processed;
        self.ids_scheduled += other.ids_scheduled;
        self.missing_doi += other.missing_doi;
        self.stopped |= other.stopped;
        self.errors.extend(other.errors);
    }

    /// Counters persisted with the run record
    pub fn totals(&self) -> RunTotals {
        RunTotals {
            articles_saved: self.articles_saved,
            edges_saved: self.edges_saved,
            levels_processed: self.levels_processed,
            failures: self.failures(),
        }
    }
}

impl fmt::Display for CrawlStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} articles saved ({} refreshed), {} edges saved ({} dangling, {} skipped), \
             {} levels, {} IDs scheduled, {} without DOI, {} errors",
            self.articles_saved,
            self.articles_refreshed,
            self.edges_saved,
            self.dangling_edges,
            self.edges_skipped,
            self.levels_processed,
            self.ids_scheduled,
            self.missing_doi,
            self.errors.len()
        )?;
        if self.stopped {
            write!(f, " (stopped early)")?;
        }
        Ok(())
    }
}

/// A fatal error together with the statistics gathered before it
#[derive(Debug, Error)]
#[error("crawl aborted after {} articles and {} edges: {source}", .stats.articles_saved, .stats.edges_saved)]
pub struct CrawlAborted {
    pub stats: CrawlStats,
    #[source]
    pub source: RippleError,
}
