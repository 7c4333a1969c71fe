//! Keyword-driven crawls: search, store the hits, optionally expand them

use crate::crawler::graph::CitationGraphCrawler;
use crate::crawler::stats::{CrawlAborted, CrawlPhase, CrawlStats};
use crate::gateway::MetadataApi;
use crate::storage::Store;
use chrono::{Local, NaiveDate};

/// Field restrictions ANDed onto a search term
///
/// Dates use the service's `YYYY/MM/DD` form (or a `YYYY` / `YYYY/MM`
/// prefix). Each list matches any of its values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub publication_types: Vec<String>,
    pub languages: Vec<String>,
    pub journals: Vec<String>,
    pub authors: Vec<String>,
    pub mesh_terms: Vec<String>,
}

/// Lower bound used when only an end date is given
const EARLIEST_DATE: &str = "1900/01/01";

fn any_of(values: &[String], tag: &str) -> Option<String> {
    let quoted: Vec<String> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| format!("\"{}\"[{}]", v, tag))
        .collect();
    match quoted.len() {
        0 => None,
        1 => quoted.into_iter().next(),
        _ => Some(format!("({})", quoted.join(" OR "))),
    }
}

impl SearchFilter {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Builds the full query for `term`; an open-ended date range ends today
    pub fn query(&self, term: &str) -> String {
        self.query_as_of(term, Local::now().date_naive())
    }

    fn query_as_of(&self, term: &str, today: NaiveDate) -> String {
        let mut parts = vec![term.trim().to_string()];

        let range = match (&self.date_from, &self.date_to) {
            (Some(from), Some(to)) => Some(format!("{}:{}", from, to)),
            (Some(from), None) => Some(format!("{}:{}", from, today.format("%Y/%m/%d"))),
            (None, Some(to)) => Some(format!("{}:{}", EARLIEST_DATE, to)),
            (None, None) => None,
        };
        parts.extend(range.map(|r| format!("{}[dp]", r)));

        for (values, tag) in [
            (&self.publication_types, "pt"),
            (&self.languages, "la"),
            (&self.journals, "ta"),
            (&self.authors, "au"),
            (&self.mesh_terms, "mh"),
        ] {
            parts.extend(any_of(values, tag));
        }

        parts.join(" AND ")
    }
}

impl<A, S> CitationGraphCrawler<A, S>
where
    A: MetadataApi,
    S: Store,
{
    /// Searches for `term` and crawls from the matching articles
    ///
    /// Hits are paged through in `search-batch-size` steps, fetched and
    /// stored; with `fetch_references` they then seed a citation crawl.
    ///
    /// # Arguments
    ///
    /// * `term` - Search query in the service's syntax
    /// * `max_results` - Upper bound on hits used; `None` takes every hit
    /// * `fetch_references` - Whether to expand the hits' citation graph
    /// * `max_depth` - Depth bound handed to the citation crawl
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlStats)` - Statistics of the seed fetch and any citation crawl
    /// * `Err(CrawlAborted)` - A fatal error together with the partial statistics
    pub async fn crawl_by_keyword(
        &mut self,
        term: &str,
        max_results: Option<usize>,
        fetch_references: bool,
        max_depth: Option<u32>,
    ) -> Result<CrawlStats, CrawlAborted> {
        let mut stats = CrawlStats::default();

        let hits = self.collect_hits(term, max_results, &mut stats).await;
        tracing::info!("Search '{}' yielded {} articles", term, hits.len());
        if hits.is_empty() {
            return Ok(stats);
        }

        if let Err(source) = self.ingest(&hits, &mut stats).await {
            tracing::error!("Keyword crawl aborted: {}", source);
            return Err(CrawlAborted { stats, source });
        }

        if !fetch_references || stats.stopped {
            return Ok(stats);
        }

        match self.crawl_citation_graph(&hits, max_depth).await {
            Ok(graph) => {
                stats.merge(graph);
                Ok(stats)
            }
            Err(mut aborted) => {
                stats.merge(aborted.stats);
                aborted.stats = stats;
                Err(aborted)
            }
        }
    }

    /// Runs [`crawl_by_keyword`](Self::crawl_by_keyword) on `term` narrowed by `filter`
    pub async fn crawl_by_filtered_keyword(
        &mut self,
        term: &str,
        filter: &SearchFilter,
        max_results: Option<usize>,
        fetch_references: bool,
        max_depth: Option<u32>,
    ) -> Result<CrawlStats, CrawlAborted> {
        let query = filter.query(term);
        if !filter.is_empty() {
            tracing::info!("Filtered search query: {}", query);
        }
        self.crawl_by_keyword(&query, max_results, fetch_references, max_depth)
            .await
    }

    /// Pages through the search results until `max_results` IDs are collected
    async fn collect_hits(
        &self,
        term: &str,
        max_results: Option<usize>,
        stats: &mut CrawlStats,
    ) -> Vec<String> {
        let page_size = self.settings().search_batch_size.max(1);
        let mut hits: Vec<String> = Vec::new();
        let mut wanted = max_results.unwrap_or(usize::MAX);

        while hits.len() < wanted {
            let offset = hits.len();
            let count = page_size.min(wanted - offset);
            let page = match self.gateway().search(term, count, offset).await {
                Ok(page) => page,
                Err(e) => {
                    stats.record_issue(
                        CrawlPhase::Seed,
                        None,
                        format!("search at offset {}: {}", offset, e),
                    );
                    break;
                }
            };

            let total = usize::try_from(page.count).unwrap_or(usize::MAX);
            wanted = wanted.min(total);
            if page.ids.is_empty() {
                break;
            }
            tracing::debug!(
                "Search page at offset {}: {} IDs of {} total",
                offset,
                page.ids.len(),
                total
            );
            hits.extend(page.ids);
        }

        hits.truncate(wanted);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CrawlerConfig;
    use crate::crawler::testing::{fixture, fixture_with, ids, FakeApi};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 17).unwrap()
    }

    #[test]
    fn test_empty_filter_keeps_term() {
        let filter = SearchFilter::default();
        assert!(filter.is_empty());
        assert_eq!(filter.query_as_of(" crispr ", today()), "crispr");
    }

    #[test]
    fn test_filter_query_combines_fields() {
        let filter = SearchFilter {
            date_from: Some("2020/01/01".to_string()),
            date_to: Some("2022/12/31".to_string()),
            publication_types: ids(&["Review", "Clinical Trial"]),
            languages: ids(&["english"]),
            journals: ids(&["Nature"]),
            authors: ids(&["Doudna JA"]),
            mesh_terms: ids(&["Gene Editing"]),
        };
        assert_eq!(
            filter.query_as_of("crispr", today()),
            "crispr AND 2020/01/01:2022/12/31[dp] \
             AND (\"Review\"[pt] OR \"Clinical Trial\"[pt]) AND \"english\"[la] \
             AND \"Nature\"[ta] AND \"Doudna JA\"[au] AND \"Gene Editing\"[mh]"
        );
    }

    #[test]
    fn test_open_date_ranges() {
        let from = SearchFilter {
            date_from: Some("2023".to_string()),
            ..SearchFilter::default()
        };
        assert_eq!(
            from.query_as_of("crispr", today()),
            "crispr AND 2023:2024/05/17[dp]"
        );

        let to = SearchFilter {
            date_to: Some("1999/12/31".to_string()),
            ..SearchFilter::default()
        };
        assert_eq!(
            to.query_as_of("crispr", today()),
            "crispr AND 1900/01/01:1999/12/31[dp]"
        );
    }

    #[test]
    fn test_blank_filter_values_ignored() {
        let filter = SearchFilter {
            languages: ids(&["", "  "]),
            ..SearchFilter::default()
        };
        assert_eq!(filter.query_as_of("crispr", today()), "crispr");
    }

    #[tokio::test(start_paused = true)]
    async fn test_filtered_keyword_crawl() {
        let mut api = FakeApi::default().with_articles(&["1", "2"]);
        api.search_hits = ids(&["1", "2"]);
        let mut f = fixture(api);
        let filter = SearchFilter {
            journals: ids(&["Journal of Tests"]),
            ..SearchFilter::default()
        };

        let stats = f
            .crawler
            .crawl_by_filtered_keyword("crispr", &filter, None, false, None)
            .await
            .unwrap();

        assert_eq!(stats.articles_saved, 2);
        let terms = f.crawler.gateway().api().search_terms.lock().unwrap().clone();
        assert_eq!(terms, vec!["crispr AND \"Journal of Tests\"[ta]".to_string()]);
    }

    fn searchable(hits: &[&str]) -> FakeApi {
        let mut api = FakeApi::default().with_articles(hits);
        api.search_hits = ids(hits);
        api
    }

    #[tokio::test(start_paused = true)]
    async fn test_keyword_stores_hits_without_references() {
        let api = searchable(&["1", "2", "3"]).with_references("1", &["9"]);
        let mut f = fixture(api);

        let stats = f
            .crawler
            .crawl_by_keyword("crispr", None, false, None)
            .await
            .unwrap();

        assert_eq!(stats.articles_saved, 3);
        assert_eq!(stats.levels_processed, 0);
        assert!(f.crawler.gateway().api().reference_calls().is_empty());
        assert_eq!(f.store.lock().unwrap().count_articles().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keyword_respects_max_results_and_pages() {
        let api = searchable(&["1", "2", "3", "4", "5"]);
        let settings = CrawlerConfig {
            search_batch_size: 2,
            ..CrawlerConfig::default()
        };
        let mut f = fixture_with(api, settings);

        let stats = f
            .crawler
            .crawl_by_keyword("crispr", Some(3), false, None)
            .await
            .unwrap();

        assert_eq!(stats.articles_saved, 3);
        let calls = f.crawler.gateway().api().search_calls.lock().unwrap().clone();
        assert_eq!(calls, vec![(2, 0), (1, 2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keyword_stops_at_total_count() {
        let api = searchable(&["1", "2"]);
        let mut f = fixture(api);

        let stats = f
            .crawler
            .crawl_by_keyword("rare", Some(50), false, None)
            .await
            .unwrap();

        assert_eq!(stats.articles_saved, 2);
        assert_eq!(f.crawler.gateway().api().search_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keyword_with_references() {
        let api = searchable(&["1"])
            .with_references("1", &["2"])
            .with_articles(&["2"]);
        let mut f = fixture(api);

        let stats = f
            .crawler
            .crawl_by_keyword("crispr", None, true, Some(1))
            .await
            .unwrap();

        assert_eq!(stats.articles_saved, 2);
        assert_eq!(stats.edges_saved, 1);
        assert_eq!(stats.dangling_edges, 0);
        assert_eq!(stats.levels_processed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keyword_without_hits() {
        let mut f = fixture(FakeApi::default());
        let stats = f
            .crawler
            .crawl_by_keyword("nothing", None, true, None)
            .await
            .unwrap();

        assert_eq!(stats, Default::default());
    }
}
