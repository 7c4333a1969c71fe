//! Statistics generation from the graph database
//!
//! This module provides functionality for extracting and displaying
//! citation graph statistics from the storage layer.

use crate::storage::{RunRecord, StorageResult, Store};
use std::fmt::Write;

/// Graph statistics summary
#[derive(Debug, Clone)]
pub struct GraphStatistics {
    /// Articles stored with a DOI
    pub articles: u64,

    pub authors: u64,

    /// Citation edges, dangling ones included
    pub edges: u64,

    /// Edges whose cited article has no DOI yet
    pub dangling_edges: u64,

    /// Distinct affiliation entities
    pub affiliations: u64,

    /// Articles set aside because no DOI could be recovered
    pub missing_doi: u64,

    /// The most recent crawl run, if any
    pub latest_run: Option<RunRecord>,
}

impl GraphStatistics {
    /// Share of edges whose both ends are resolved, in percent
    pub fn resolved_edge_rate(&self) -> f64 {
        if self.edges == 0 {
            return 0.0;
        }
        (self.edges - self.dangling_edges) as f64 / self.edges as f64 * 100.0
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(GraphStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Store) -> StorageResult<GraphStatistics> {
    Ok(GraphStatistics {
        articles: storage.count_articles()?,
        authors: storage.count_authors()?,
        edges: storage.count_edges()?,
        dangling_edges: storage.count_dangling_edges()?,
        affiliations: storage.count_affiliations()?,
        missing_doi: storage.count_missing_doi()?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Renders statistics as the text printed by `--stats`
pub fn format_statistics(stats: &GraphStatistics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Citation Graph Statistics ===\n");

    let _ = writeln!(out, "Overview:");
    let _ = writeln!(out, "  Articles: {}", stats.articles);
    let _ = writeln!(out, "  Authors: {}", stats.authors);
    let _ = writeln!(out, "  Affiliations: {}", stats.affiliations);
    let _ = writeln!(out, "  Articles without DOI: {}", stats.missing_doi);
    let _ = writeln!(out);

    let _ = writeln!(out, "Citation Edges:");
    let _ = writeln!(out, "  Total: {}", stats.edges);
    let _ = writeln!(out, "  Dangling: {}", stats.dangling_edges);
    let _ = writeln!(out, "  Resolved: {:.1}%", stats.resolved_edge_rate());

    if let Some(run) = &stats.latest_run {
        let _ = writeln!(out);
        let _ = writeln!(out, "Latest Run:");
        let _ = writeln!(
            out,
            "  #{} ({}) {} - started {}",
            run.id,
            run.kind,
            run.status.to_db_string(),
            run.started_at
        );
        if let Some(finished) = &run.finished_at {
            let _ = writeln!(out, "  Finished: {}", finished);
        }
        let _ = writeln!(
            out,
            "  Saved {} articles and {} edges over {} levels ({} errors)",
            run.totals.articles_saved,
            run.totals.edges_saved,
            run.totals.levels_processed,
            run.totals.failures
        );
    }

    out
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &GraphStatistics) {
    print!("{}", format_statistics(stats));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArticleRecord, CitationEdge};
    use crate::storage::{RunStatus, RunTotals, SqliteStorage};

    #[test]
    fn test_load_statistics_empty() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let stats = load_statistics(&storage).unwrap();

        assert_eq!(stats.articles, 0);
        assert_eq!(stats.edges, 0);
        assert!(stats.latest_run.is_none());
        assert_eq!(stats.resolved_edge_rate(), 0.0);
    }

    #[test]
    fn test_load_statistics_counts() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let record = ArticleRecord {
            numeric_id: Some("1".to_string()),
            doi: Some("10.1/one".to_string()),
            title: Some("One".to_string()),
            ..ArticleRecord::default()
        };
        storage.upsert_article(&record, &[]).unwrap();
        storage
            .upsert_citation_edge(&CitationEdge::new("10.1/one", None, "2", Some(1)))
            .unwrap();
        storage
            .upsert_citation_edge(&CitationEdge::new(
                "10.1/one",
                Some("10.1/three".to_string()),
                "3",
                Some(2),
            ))
            .unwrap();
        let run = storage.create_run("graph", "abc").unwrap();
        storage
            .finish_run(run, RunStatus::Completed, &RunTotals::default())
            .unwrap();

        let stats = load_statistics(&storage).unwrap();
        assert_eq!(stats.articles, 1);
        assert_eq!(stats.edges, 2);
        assert_eq!(stats.dangling_edges, 1);
        assert_eq!(stats.resolved_edge_rate(), 50.0);

        let text = format_statistics(&stats);
        assert!(text.contains("Articles: 1"));
        assert!(text.contains("Dangling: 1"));
        assert!(text.contains("Resolved: 50.0%"));
        assert!(text.contains("(graph) completed"));
    }
}
