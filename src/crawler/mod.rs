//! Crawler module for citation graph harvesting
//!
//! This module contains the core crawling logic, including:
//! - The processed set and per-level frontier
//! - Breadth-first expansion of the citation graph
//! - Keyword-driven seeding, with optional search filters
//! - Refreshing stale stored articles
//! - Statistics and per-item error accumulation
//! - Cooperative cancellation

mod frontier;
mod graph;
mod keyword;
mod refresh;
mod stats;
#[cfg(test)]
mod testing;

pub use frontier::{Frontier, ProcessedSet};
pub use graph::CitationGraphCrawler;
pub use keyword::SearchFilter;
pub use refresh::REFRESH_LIMIT;
pub use stats::{CrawlAborted, CrawlIssue, CrawlPhase, CrawlStats};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag requesting that a crawl stop at the next chunk boundary
///
/// Clones share the same flag. There is no preemption: requests already in
/// flight for the current chunk are allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
