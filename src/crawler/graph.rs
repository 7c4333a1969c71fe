//! Breadth-first expansion of the citation graph
//!
//! Each level asks the gateway for the references of every frontier ID, keeps
//! the IDs never seen before, fetches and persists their records, and stores
//! the citation edges found on the way. The processed set only grows, so the
//! walk terminates even when the graph has cycles.

use crate::affiliation::AffiliationResolver;
use crate::config::{Config, CrawlerConfig};
use crate::crawler::frontier::{Frontier, ProcessedSet};
use crate::crawler::stats::{CrawlAborted, CrawlPhase, CrawlStats};
use crate::crawler::StopHandle;
use crate::gateway::{MetadataApi, MetadataGateway};
use crate::model::{ArticleRecord, CitationEdge};
use crate::storage::{MissingIdSink, StorageError, StorageResult, Store};
use crate::RippleError;
use futures::future::join_all;
use std::sync::{Arc, Mutex, MutexGuard};

/// One citation seen while expanding a level
#[derive(Debug, Clone, PartialEq, Eq)]
struct Link {
    citing: String,
    cited: String,
    order: Option<u32>,
    /// Found through the citing side's reference list rather than a cited-by lookup
    via_reference: bool,
}

impl Link {
    /// The end of the link that the expanded article did not already know
    fn discovered(&self) -> &str {
        if self.via_reference {
            &self.cited
        } else {
            &self.citing
        }
    }
}

pub(super) fn lock<S>(store: &Mutex<S>) -> StorageResult<MutexGuard<'_, S>> {
    store.lock().map_err(|_| StorageError::LockPoisoned)
}

/// Keeps a non-fatal storage failure as an issue; passes fatal ones up
fn tolerate(
    stats: &mut CrawlStats,
    phase: CrawlPhase,
    numeric_id: Option<&str>,
    error: StorageError,
) -> Result<(), RippleError> {
    if error.is_fatal() {
        return Err(error.into());
    }
    stats.record_issue(phase, numeric_id, error);
    Ok(())
}

/// Computes the next frontier: discovered IDs not yet processed, in discovery order
///
/// Every returned ID is added to `processed`. Discoveries beyond the
/// processed-set cap are dropped.
fn discover_new(links: &[Link], processed: &mut ProcessedSet) -> Vec<String> {
    let mut new_ids = Vec::new();
    let mut dropped = 0usize;
    for link in links {
        let id = link.discovered();
        if processed.contains(id) {
            continue;
        }
        if processed.insert(id) {
            new_ids.push(id.to_string());
        } else {
            dropped += 1;
        }
    }
    if dropped > 0 {
        tracing::warn!(
            "Scheduling cap reached; {} discovered IDs were not scheduled",
            dropped
        );
    }
    new_ids
}

/// Citation graph crawler
///
/// Pulls data through a [`MetadataGateway`], resolves author affiliations and
/// writes articles and edges to a shared [`Store`]. Records whose DOI cannot
/// be recovered go to a separate [`MissingIdSink`].
pub struct CitationGraphCrawler<A, S> {
    gateway: MetadataGateway<A>,
    store: Arc<Mutex<S>>,
    sink: Box<dyn MissingIdSink + Send + Sync>,
    resolver: AffiliationResolver,
    settings: CrawlerConfig,
    stop: StopHandle,
}

impl<A, S> CitationGraphCrawler<A, S>
where
    A: MetadataApi,
    S: Store + MissingIdSink + Send + 'static,
{
    /// Builds a crawler that also uses `store` as its missing-DOI sink
    pub fn from_config(api: A, store: Arc<Mutex<S>>, config: &Config) -> Self {
        let sink = Box::new(Arc::clone(&store));
        Self::new(
            MetadataGateway::from_config(api, config),
            store,
            sink,
            AffiliationResolver::from_config(&config.affiliation),
            config.crawler.clone(),
        )
    }
}

impl<A, S> CitationGraphCrawler<A, S>
where
    A: MetadataApi,
    S: Store,
{
    pub fn new(
        gateway: MetadataGateway<A>,
        store: Arc<Mutex<S>>,
        sink: Box<dyn MissingIdSink + Send + Sync>,
        resolver: AffiliationResolver,
        settings: CrawlerConfig,
    ) -> Self {
        Self {
            gateway,
            store,
            sink,
            resolver,
            settings,
            stop: StopHandle::new(),
        }
    }

    /// Handle that stops this crawler at its next chunk boundary
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn gateway(&self) -> &MetadataGateway<A> {
        &self.gateway
    }

    pub fn store(&self) -> &Arc<Mutex<S>> {
        &self.store
    }

    pub fn settings(&self) -> &CrawlerConfig {
        &self.settings
    }

    /// Expands the citation graph breadth-first from `seeds`
    ///
    /// Seeds count as processed and are not detail-fetched here; edges are
    /// stored for links whose citing article is in the store.
    ///
    /// # Arguments
    ///
    /// * `seeds` - Numeric IDs forming the depth-0 frontier
    /// * `max_depth` - Number of levels to expand; `None` expands until no new
    ///   IDs appear or the scheduling cap is reached
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlStats)` - Statistics, including the per-item errors that were tolerated
    /// * `Err(CrawlAborted)` - A fatal error together with the partial statistics
    pub async fn crawl_citation_graph(
        &mut self,
        seeds: &[String],
        max_depth: Option<u32>,
    ) -> Result<CrawlStats, CrawlAborted> {
        let mut stats = CrawlStats::default();
        match self.expand(seeds, max_depth, &mut stats).await {
            Ok(()) => {
                tracing::info!("Citation crawl finished: {}", stats);
                Ok(stats)
            }
            Err(source) => {
                tracing::error!("Citation crawl aborted: {}", source);
                Err(CrawlAborted { stats, source })
            }
        }
    }

    /// Fetches and stores any seeds the store does not know, then crawls from them
    ///
    /// Unlike [`crawl_citation_graph`](Self::crawl_citation_graph), this makes
    /// the seeds' own references storable as edges.
    pub async fn crawl_seeds(
        &mut self,
        seeds: &[String],
        max_depth: Option<u32>,
    ) -> Result<CrawlStats, CrawlAborted> {
        let mut stats = CrawlStats::default();
        if let Err(source) = self.ingest_unknown(seeds, &mut stats).await {
            return Err(CrawlAborted { stats, source });
        }

        match self.crawl_citation_graph(seeds, max_depth).await {
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

    /// Maps an affiliation string onto a stored entity, creating one if nothing matches
    pub fn resolve_affiliation(&mut self, text: &str) -> crate::Result<i64> {
        let mut store = lock(&self.store)?;
        Ok(self.resolver.resolve(text, &mut *store)?)
    }

    async fn ingest_unknown(
        &mut self,
        seeds: &[String],
        stats: &mut CrawlStats,
    ) -> Result<(), RippleError> {
        let unknown = {
            let store = lock(&self.store)?;
            let mut unknown = Vec::new();
            for id in Frontier::new(seeds).ids() {
                if store.find_by_numeric_id(id)?.is_none() {
                    unknown.push(id.clone());
                }
            }
            unknown
        };

        if !unknown.is_empty() {
            tracing::info!("Fetching {} seeds not yet in the store", unknown.len());
            self.ingest(&unknown, stats).await?;
        }
        Ok(())
    }

    async fn expand(
        &mut self,
        seeds: &[String],
        max_depth: Option<u32>,
        stats: &mut CrawlStats,
    ) -> Result<(), RippleError> {
        let known = lock(&self.store)?.known_numeric_ids()?;
        let known_count = known.len();
        let mut processed = ProcessedSet::new(known, self.settings.max_processed);
        let mut frontier = Frontier::new(seeds);
        for id in frontier.ids() {
            processed.insert(id);
        }

        tracing::info!(
            phase = %CrawlPhase::Seed,
            "Starting citation crawl from {} seeds ({} IDs already known)",
            frontier.len(),
            known_count
        );
        match max_depth {
            Some(depth) => tracing::info!("Expanding at most {} levels", depth),
            None => tracing::warn!(
                "No depth bound; the crawl stops only when no new IDs appear or {} IDs are scheduled",
                self.settings.max_processed
            ),
        }

        while !frontier.is_empty() && frontier.within(max_depth) {
            if self.stop.is_stopped() {
                stats.stopped = true;
                break;
            }

            tracing::info!(
                phase = %CrawlPhase::ExpandLevel,
                "Expanding level {} ({} IDs)",
                frontier.depth(),
                frontier.len()
            );
            let links = self.gather_links(frontier.ids(), stats).await;
            if stats.stopped {
                tracing::info!("Stop requested; level {} abandoned", frontier.depth());
                break;
            }
            stats.levels_processed += 1;

            let new_ids = discover_new(&links, &mut processed);
            tracing::info!(
                phase = %CrawlPhase::DiscoverNew,
                "Level {}: {} links, {} new IDs",
                frontier.depth(),
                links.len(),
                new_ids.len()
            );

            if !new_ids.is_empty() {
                self.ingest(&new_ids, stats).await?;
            }
            self.persist_edges(&links, stats)?;

            if new_ids.is_empty() || stats.stopped {
                frontier.clear();
            } else {
                frontier.advance(new_ids);
                tracing::debug!(
                    phase = %CrawlPhase::AdvanceDepth,
                    "Advancing to depth {}",
                    frontier.depth()
                );
            }
        }

        stats.ids_scheduled = processed.added() as u64;
        tracing::info!(
            phase = %CrawlPhase::Terminate,
            "Crawl ended after {} levels with {} IDs scheduled",
            stats.levels_processed,
            stats.ids_scheduled
        );
        Ok(())
    }

    /// Looks up the links of every ID, one concurrent chunk at a time
    ///
    /// A failed lookup is recorded and skipped without affecting its siblings.
    async fn gather_links(&self, ids: &[String], stats: &mut CrawlStats) -> Vec<Link> {
        let gateway = &self.gateway;
        let follow_cited_by = self.settings.follow_cited_by;
        let chunk_size = self.settings.chunk_size.max(1);
        let mut links = Vec::new();

        for (index, chunk) in ids.chunks(chunk_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.settings.chunk_pause()).await;
                if self.stop.is_stopped() {
                    stats.stopped = true;
                    break;
                }
            }

            tracing::debug!(
                phase = %CrawlPhase::FetchRefs,
                "Fetching links for chunk {} ({} IDs)",
                index + 1,
                chunk.len()
            );
            let results = join_all(chunk.iter().map(move |id| async move {
                let references = gateway.fetch_references(id).await;
                let citers = if follow_cited_by {
                    Some(gateway.fetch_cited_by(id).await)
                } else {
                    None
                };
                (references, citers)
            }))
            .await;

            for (id, (references, citers)) in chunk.iter().zip(results) {
                match references {
                    Ok(references) => {
                        links.extend(references.into_iter().map(|r| Link {
                            citing: id.clone(),
                            cited: r.cited_id,
                            order: Some(r.order),
                            via_reference: true,
                        }))
                    }
                    Err(e) => stats.record_issue(CrawlPhase::FetchRefs, Some(id.as_str()), e),
                }
                match citers {
                    Some(Ok(citers)) => links.extend(citers.into_iter().map(|c| Link {
                        citing: c.citing_id,
                        cited: id.clone(),
                        order: None,
                        via_reference: false,
                    })),
                    Some(Err(e)) => stats.record_issue(CrawlPhase::FetchRefs, Some(id.as_str()), e),
                    None => {}
                }
            }
        }

        links
    }

    /// Fetches, validates and persists the records of `ids`
    pub(super) async fn ingest(
        &mut self,
        ids: &[String],
        stats: &mut CrawlStats,
    ) -> Result<(), RippleError> {
        let records = self.fetch_records(ids, stats).await?;
        self.persist_records(&records, stats)
    }

    async fn fetch_records(
        &mut self,
        ids: &[String],
        stats: &mut CrawlStats,
    ) -> Result<Vec<ArticleRecord>, RippleError> {
        let mut fetched = Vec::with_capacity(ids.len());
        for (index, batch) in ids
            .chunks(self.settings.detail_batch_size.max(1))
            .enumerate()
        {
            if index > 0 && self.stop.is_stopped() {
                stats.stopped = true;
                break;
            }
            tracing::debug!(
                phase = %CrawlPhase::FetchDetails,
                "Fetching details for {} IDs",
                batch.len()
            );
            match self.gateway.fetch_details(batch).await {
                Ok(records) => {
                    if records.len() < batch.len() {
                        tracing::debug!(
                            "{} of {} IDs returned no record",
                            batch.len() - records.len(),
                            batch.len()
                        );
                    }
                    fetched.extend(records);
                }
                Err(e) => stats.record_issue(
                    CrawlPhase::FetchDetails,
                    None,
                    format!("batch of {} IDs ({}..) failed: {}", batch.len(), batch[0], e),
                ),
            }
        }

        let mut resolved = Vec::with_capacity(fetched.len());
        for record in fetched {
            if let Some(record) = self.resolve_doi(record, stats).await? {
                resolved.push(record);
            }
        }
        Ok(resolved)
    }

    /// Validates a record and makes sure it carries a DOI
    ///
    /// Records missing a DOI get one single-ID re-fetch; if that does not
    /// produce one, the record goes to the missing-DOI sink and is dropped.
    async fn resolve_doi(
        &mut self,
        mut record: ArticleRecord,
        stats: &mut CrawlStats,
    ) -> Result<Option<ArticleRecord>, RippleError> {
        let Some(id) = record.numeric_id.clone() else {
            tracing::error!("Dropping record without a numeric ID: {:?}", record.title);
            stats.record_issue(
                CrawlPhase::ResolveDoi,
                None,
                RippleError::MalformedRecord {
                    numeric_id: record.label().to_string(),
                    reason: "no numeric ID".to_string(),
                },
            );
            return Ok(None);
        };

        if record.title.as_deref().map_or(true, |t| t.trim().is_empty()) {
            stats.record_issue(
                CrawlPhase::ResolveDoi,
                Some(id.as_str()),
                RippleError::MalformedRecord {
                    numeric_id: id.clone(),
                    reason: "no title".to_string(),
                },
            );
            return Ok(None);
        }

        if record.has_doi() {
            return Ok(Some(record));
        }

        tracing::debug!(
            phase = %CrawlPhase::ResolveDoi,
            "Record {} has no DOI, fetching it again",
            id
        );
        match self.gateway.fetch_details(std::slice::from_ref(&id)).await {
            Ok(again) => {
                let recovered = again
                    .into_iter()
                    .find(|r| r.numeric_id.as_deref() == Some(id.as_str()))
                    .and_then(|r| r.doi);
                if let Some(doi) = recovered {
                    tracing::debug!("Recovered DOI {} for {}", doi, id);
                    record.doi = Some(doi);
                    return Ok(Some(record));
                }
            }
            Err(e) => tracing::debug!("Re-fetch of {} failed: {}", id, e),
        }

        match self.sink.record(&record) {
            Ok(()) => stats.missing_doi += 1,
            Err(e) => tolerate(stats, CrawlPhase::Persist, Some(id.as_str()), e)?,
        }
        stats.record_issue(
            CrawlPhase::ResolveDoi,
            Some(id.as_str()),
            RippleError::MissingIdentifier { numeric_id: id.clone() },
        );
        Ok(None)
    }

    fn persist_records(
        &mut self,
        records: &[ArticleRecord],
        stats: &mut CrawlStats,
    ) -> Result<(), RippleError> {
        for record in records {
            match self.persist_record(record) {
                Ok(true) => {
                    stats.articles_saved += 1;
                    tracing::debug!(
                        phase = %CrawlPhase::Persist,
                        "Saved {} ({})",
                        record.label(),
                        record.doi.as_deref().unwrap_or_default()
                    );
                }
                Ok(false) => stats.articles_refreshed += 1,
                Err(e) => tolerate(stats, CrawlPhase::Persist, Some(record.label()), e)?,
            }
        }
        Ok(())
    }

    /// Resolves the record's affiliations and writes it in one store transaction
    fn persist_record(&mut self, record: &ArticleRecord) -> StorageResult<bool> {
        let mut store = lock(&self.store)?;

        let mut affiliation_ids = Vec::with_capacity(record.authors.len());
        for author in &record.authors {
            let mut ids = Vec::new();
            for raw in author.affiliations.iter().filter(|a| !a.trim().is_empty()) {
                let id = self.resolver.resolve(raw, &mut *store)?;
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
            affiliation_ids.push(ids);
        }

        store.upsert_article(record, &affiliation_ids)
    }

    /// Stores an edge for every link whose citing article has a DOI
    ///
    /// The cited side is resolved through the store; when it has no DOI the
    /// edge is kept dangling with the cited numeric ID.
    fn persist_edges(&self, links: &[Link], stats: &mut CrawlStats) -> Result<(), RippleError> {
        if links.is_empty() {
            return Ok(());
        }
        let mut store = lock(&self.store)?;

        for link in links {
            let citing = match store.find_by_numeric_id(&link.citing) {
                Ok(Some(article)) => article,
                Ok(None) => {
                    tracing::trace!("No stored DOI for citing {}; edge skipped", link.citing);
                    stats.edges_skipped += 1;
                    continue;
                }
                Err(e) => {
                    tolerate(stats, CrawlPhase::Persist, Some(link.citing.as_str()), e)?;
                    continue;
                }
            };
            let cited_doi = match store.find_by_numeric_id(&link.cited) {
                Ok(found) => found.map(|article| article.doi),
                Err(e) => {
                    tolerate(stats, CrawlPhase::Persist, Some(link.cited.as_str()), e)?;
                    continue;
                }
            };

            let edge = CitationEdge::new(citing.doi, cited_doi, link.cited.as_str(), link.order);
            match store.upsert_citation_edge(&edge) {
                Ok(true) => {
                    stats.edges_saved += 1;
                    if edge.is_dangling() {
                        stats.dangling_edges += 1;
                    }
                }
                Ok(false) => {}
                Err(e) => tolerate(stats, CrawlPhase::Persist, Some(link.citing.as_str()), e)?,
            }
        }
        Ok(())
    }
}
