//! Re-fetching stored articles whose metadata has gone stale

use crate::crawler::graph::{lock, CitationGraphCrawler};
use crate::crawler::stats::{CrawlAborted, CrawlStats};
use crate::gateway::MetadataApi;
use crate::storage::Store;
use chrono::{Duration, Utc};

/// Most articles refreshed by one call
pub const REFRESH_LIMIT: usize = 1000;

impl<A, S> CitationGraphCrawler<A, S>
where
    A: MetadataApi,
    S: Store,
{
    /// Re-fetches articles last crawled more than `days_old` days ago
    ///
    /// At most [`REFRESH_LIMIT`] articles are taken, oldest first. Each one is
    /// written back through the usual persistence path, so refreshed rows are
    /// counted in `articles_refreshed` and get a new `last_crawled_at`.
    pub async fn refresh_stale_articles(
        &mut self,
        days_old: u32,
    ) -> Result<CrawlStats, CrawlAborted> {
        let mut stats = CrawlStats::default();
        let cutoff = (Utc::now() - Duration::days(i64::from(days_old))).to_rfc3339();

        let stale = match lock(self.store())
            .and_then(|store| store.stale_numeric_ids(&cutoff, REFRESH_LIMIT))
        {
            Ok(stale) => stale,
            Err(e) => {
                return Err(CrawlAborted {
                    stats,
                    source: e.into(),
                })
            }
        };
        tracing::info!(
            "{} articles last crawled before {}",
            stale.len(),
            cutoff
        );
        if stale.is_empty() {
            return Ok(stats);
        }

        match self.ingest(&stale, &mut stats).await {
            Ok(()) => {
                tracing::info!("Refresh finished: {}", stats);
                Ok(stats)
            }
            Err(source) => {
                tracing::error!("Refresh aborted: {}", source);
                Err(CrawlAborted { stats, source })
            }
        }
    }
}
