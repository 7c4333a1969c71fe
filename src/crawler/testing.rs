//! In-memory metadata service and crawler fixtures for unit tests

use crate::affiliation::{AffiliationEntity, AffiliationResolver};
use crate::config::CrawlerConfig;
use crate::crawler::CitationGraphCrawler;
use crate::gateway::{FetchError, MetadataApi, MetadataGateway, RateLimiter, RetryPolicy};
use crate::model::{
    ArticleRecord, AuthorRecord, CitationEdge, CitedReference, CitingReference, SearchPage,
    StoredArticle,
};
use crate::storage::{
    RunRecord, RunStatus, RunTotals, SqliteStorage, StorageError, StorageResult, Store,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const STANFORD: &str = "Dept. of Biology, Stanford Univ., CA 94305, USA";

/// Scripted metadata service that records every call it receives
#[derive(Default)]
pub struct FakeApi {
    pub references: HashMap<String, Vec<String>>,
    pub citers: HashMap<String, Vec<String>>,
    pub records: HashMap<String, ArticleRecord>,
    pub search_hits: Vec<String>,
    /// IDs whose DOI is left out of the first detail response
    pub doi_on_refetch: HashSet<String>,
    pub failing_refs: HashSet<String>,
    pub reference_calls: Mutex<Vec<String>>,
    pub detail_calls: Mutex<Vec<Vec<String>>>,
    pub search_calls: Mutex<Vec<(usize, usize)>>,
    pub search_terms: Mutex<Vec<String>>,
    detailed: Mutex<HashSet<String>>,
}

impl FakeApi {
    pub fn with_references(mut self, id: &str, cited: &[&str]) -> Self {
        self.references
            .insert(id.to_string(), cited.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn with_citers(mut self, id: &str, citing: &[&str]) -> Self {
        self.citers
            .insert(id.to_string(), citing.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn with_record(mut self, record: ArticleRecord) -> Self {
        let id = record.numeric_id.clone().unwrap_or_default();
        self.records.insert(id, record);
        self
    }

    pub fn with_articles(self, ids: &[&str]) -> Self {
        ids.iter().fold(self, |api, id| api.with_record(article(id)))
    }

    pub fn reference_calls(&self) -> Vec<String> {
        self.reference_calls.lock().unwrap().clone()
    }

    pub fn detail_calls(&self) -> Vec<Vec<String>> {
        self.detail_calls.lock().unwrap().clone()
    }

    pub fn detailed_ids(&self) -> HashSet<String> {
        self.detail_calls().into_iter().flatten().collect()
    }
}

fn decode_error(id: &str) -> FetchError {
    FetchError::Decode {
        endpoint: "elink.fcgi".to_string(),
        message: format!("unreadable links for {}", id),
    }
}

#[async_trait]
impl MetadataApi for FakeApi {
    async fn search(
        &self,
        term: &str,
        max_count: usize,
        offset: usize,
    ) -> Result<SearchPage, FetchError> {
        self.search_calls.lock().unwrap().push((max_count, offset));
        self.search_terms.lock().unwrap().push(term.to_string());
        Ok(SearchPage {
            count: self.search_hits.len() as u64,
            ids: self
                .search_hits
                .iter()
                .skip(offset)
                .take(max_count)
                .cloned()
                .collect(),
        })
    }

    async fn fetch_details(&self, ids: &[String]) -> Result<Vec<ArticleRecord>, FetchError> {
        self.detail_calls.lock().unwrap().push(ids.to_vec());
        let mut detailed = self.detailed.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| {
                let mut record = self.records.get(id)?.clone();
                let first_time = detailed.insert(id.clone());
                if first_time && self.doi_on_refetch.contains(id) {
                    record.doi = None;
                }
                Some(record)
            })
            .collect())
    }

    async fn fetch_references(&self, id: &str) -> Result<Vec<CitedReference>, FetchError> {
        self.reference_calls.lock().unwrap().push(id.to_string());
        if self.failing_refs.contains(id) {
            return Err(decode_error(id));
        }
        Ok(self
            .references
            .get(id)
            .into_iter()
            .flatten()
            .enumerate()
            .map(|(i, cited)| CitedReference {
                cited_id: cited.clone(),
                order: i as u32 + 1,
            })
            .collect())
    }

    async fn fetch_cited_by(&self, id: &str) -> Result<Vec<CitingReference>, FetchError> {
        Ok(self
            .citers
            .get(id)
            .into_iter()
            .flatten()
            .map(|citing| CitingReference {
                citing_id: citing.clone(),
            })
            .collect())
    }
}

/// A resolvable article with one author at Stanford
pub fn article(id: &str) -> ArticleRecord {
    ArticleRecord {
        numeric_id: Some(id.to_string()),
        doi: Some(format!("10.1000/{}", id)),
        title: Some(format!("Article {}", id)),
        journal: Some("Journal of Tests".to_string()),
        pub_year: Some(2021),
        authors: vec![AuthorRecord {
            last_name: Some(format!("Author{}", id)),
            fore_name: Some("Test".to_string()),
            affiliations: vec![STANFORD.to_string()],
            ..AuthorRecord::default()
        }],
        ..ArticleRecord::default()
    }
}

pub type TestCrawler = CitationGraphCrawler<FakeApi, SqliteStorage>;

pub struct Fixture {
    pub crawler: TestCrawler,
    pub store: Arc<Mutex<SqliteStorage>>,
    pub missing: Arc<Mutex<Vec<ArticleRecord>>>,
}

pub fn fixture(api: FakeApi) -> Fixture {
    fixture_with(api, CrawlerConfig::default())
}

pub fn fixture_with(api: FakeApi, settings: CrawlerConfig) -> Fixture {
    let store = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
    let (crawler, missing) = crawler_over(api, Arc::clone(&store), settings);
    Fixture {
        crawler,
        store,
        missing,
    }
}

/// Builds a crawler over any store, with a fast gateway and a vector sink
pub fn crawler_over<S: Store>(
    api: FakeApi,
    store: Arc<Mutex<S>>,
    settings: CrawlerConfig,
) -> (CitationGraphCrawler<FakeApi, S>, Arc<Mutex<Vec<ArticleRecord>>>) {
    let missing = Arc::new(Mutex::new(Vec::new()));
    let gateway = MetadataGateway::new(
        api,
        Arc::new(RateLimiter::new(50.0)),
        RetryPolicy {
            max_retries: 1,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            exponential_base: 2.0,
            jitter: false,
        },
    );
    let crawler = CitationGraphCrawler::new(
        gateway,
        store,
        Box::new(Arc::clone(&missing)),
        AffiliationResolver::new(0.85),
        settings,
    );
    (crawler, missing)
}

/// SQLite store whose article writes fail on demand
pub struct FailingStore {
    pub inner: SqliteStorage,
    /// IDs whose write fails with a constraint violation
    pub rejected: HashSet<String>,
    /// Number of successful article writes before the disk is reported full
    pub disk_full_after: Option<usize>,
    writes: usize,
}

impl FailingStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteStorage::new_in_memory().unwrap(),
            rejected: HashSet::new(),
            disk_full_after: None,
            writes: 0,
        }
    }
}

fn sqlite_failure(code: std::os::raw::c_int) -> StorageError {
    StorageError::Sqlite(rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(code),
        None,
    ))
}

impl Store for FailingStore {
    fn known_numeric_ids(&self) -> StorageResult<HashSet<String>> {
        self.inner.known_numeric_ids()
    }

    fn find_by_numeric_id(&self, numeric_id: &str) -> StorageResult<Option<StoredArticle>> {
        self.inner.find_by_numeric_id(numeric_id)
    }

    fn find_by_doi(&self, doi: &str) -> StorageResult<Option<StoredArticle>> {
        self.inner.find_by_doi(doi)
    }

    fn stale_numeric_ids(&self, crawled_before: &str, limit: usize) -> StorageResult<Vec<String>> {
        self.inner.stale_numeric_ids(crawled_before, limit)
    }

    fn upsert_article(
        &mut self,
        record: &ArticleRecord,
        affiliation_ids: &[Vec<i64>],
    ) -> StorageResult<bool> {
        if self.rejected.contains(record.label()) {
            return Err(sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT));
        }
        if self.disk_full_after.is_some_and(|n| self.writes >= n) {
            return Err(sqlite_failure(rusqlite::ffi::SQLITE_FULL));
        }
        let inserted = self.inner.upsert_article(record, affiliation_ids)?;
        self.writes += 1;
        Ok(inserted)
    }

    fn upsert_citation_edge(&mut self, edge: &CitationEdge) -> StorageResult<bool> {
        self.inner.upsert_citation_edge(edge)
    }

    fn citation_edges_from(&self, citing_doi: &str) -> StorageResult<Vec<CitationEdge>> {
        self.inner.citation_edges_from(citing_doi)
    }

    fn all_affiliations(&self) -> StorageResult<Vec<(i64, String)>> {
        self.inner.all_affiliations()
    }

    fn upsert_affiliation(&mut self, entity: &AffiliationEntity) -> StorageResult<i64> {
        self.inner.upsert_affiliation(entity)
    }

    fn create_run(&mut self, kind: &str, config_hash: &str) -> StorageResult<i64> {
        self.inner.create_run(kind, config_hash)
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        totals: &RunTotals,
    ) -> StorageResult<()> {
        self.inner.finish_run(run_id, status, totals)
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        self.inner.get_latest_run()
    }

    fn count_articles(&self) -> StorageResult<u64> {
        self.inner.count_articles()
    }

    fn count_authors(&self) -> StorageResult<u64> {
        self.inner.count_authors()
    }

    fn count_edges(&self) -> StorageResult<u64> {
        self.inner.count_edges()
    }

    fn count_dangling_edges(&self) -> StorageResult<u64> {
        self.inner.count_dangling_edges()
    }

    fn count_affiliations(&self) -> StorageResult<u64> {
        self.inner.count_affiliations()
    }

    fn count_missing_doi(&self) -> StorageResult<u64> {
        self.inner.count_missing_doi()
    }
}

pub fn ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}
