//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the metadata service and a
//! temporary SQLite database to test full crawls end-to-end.

use cite_ripple::config::{parse_config, Config};
use cite_ripple::crawler::{CitationGraphCrawler, SearchFilter};
use cite_ripple::gateway::EntrezClient;
use cite_ripple::output::load_statistics;
use cite_ripple::storage::{open_storage, RunStatus, SqliteStorage, Store};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the mock server
fn create_test_config(base_url: &str, db_path: &Path) -> Config {
    parse_config(&format!(
        r#"
[crawler]
chunk-size = 2
chunk-pause-ms = 0
detail-batch-size = 50

[gateway]
base-url = "{}"
tool-name = "cite-ripple-test"
contact-email = "curator@example.org"
calls-per-second = 100.0

[retry]
max-retries = 1
initial-delay-ms = 1
max-delay-ms = 2
jitter = false

[output]
database-path = "{}"
"#,
        base_url,
        db_path.display()
    ))
    .expect("valid test config")
}

struct Harness {
    server: MockServer,
    _dir: TempDir,
    config: Config,
    store: Arc<Mutex<SqliteStorage>>,
}

impl Harness {
    async fn start() -> Self {
        let server = MockServer::start().await;
        let dir = TempDir::new().expect("temp dir");
        let config = create_test_config(&server.uri(), &dir.path().join("graph.db"));
        let store = open_storage(Path::new(&config.output.database_path)).expect("database opens");
        Self {
            server,
            _dir: dir,
            config,
            store: Arc::new(Mutex::new(store)),
        }
    }

    fn crawler(&self) -> CitationGraphCrawler<EntrezClient, SqliteStorage> {
        let api = EntrezClient::new(&self.config.gateway).expect("client builds");
        CitationGraphCrawler::from_config(api, Arc::clone(&self.store), &self.config)
    }

    async fn mock_details(&self, ids: &str, articles: &[(&str, Option<&str>)]) {
        Mock::given(method("GET"))
            .and(path("/efetch.fcgi"))
            .and(query_param("id", ids))
            .respond_with(ResponseTemplate::new(200).set_body_string(article_set(articles)))
            .mount(&self.server)
            .await;
    }

    async fn mock_references(&self, id: &str, cited: &[&str]) {
        Mock::given(method("GET"))
            .and(path("/elink.fcgi"))
            .and(query_param("id", id))
            .and(query_param("linkname", "pubmed_pubmed_refs"))
            .respond_with(ResponseTemplate::new(200).set_body_string(link_set(
                id,
                "pubmed_pubmed_refs",
                cited,
            )))
            .mount(&self.server)
            .await;
    }
}

fn article_xml(id: &str, doi: Option<&str>) -> String {
    let doi = doi
        .map(|d| format!(r#"<ELocationID EIdType="doi" ValidYN="Y">{}</ELocationID>"#, d))
        .unwrap_or_default();
    format!(
        r#"<PubmedArticle>
    <MedlineCitation>
      <PMID Version="1">{id}</PMID>
      <Article>
        <Journal><JournalIssue><PubDate><Year>2020</Year></PubDate></JournalIssue>
          <Title>Journal of Examples</Title></Journal>
        <ArticleTitle>Article {id}</ArticleTitle>
        {doi}
        <AuthorList>
          <Author>
            <LastName>Author{id}</LastName>
            <ForeName>Sam</ForeName>
            <AffiliationInfo>
              <Affiliation>Department of Biology, Stanford University, Stanford, CA 94305, USA.</Affiliation>
            </AffiliationInfo>
          </Author>
        </AuthorList>
      </Article>
    </MedlineCitation>
  </PubmedArticle>"#
    )
}

fn article_set(articles: &[(&str, Option<&str>)]) -> String {
    let body: String = articles
        .iter()
        .map(|(id, doi)| article_xml(id, *doi))
        .collect();
    format!("<PubmedArticleSet>{}</PubmedArticleSet>", body)
}

fn link_set(id: &str, linkname: &str, links: &[&str]) -> String {
    let links: Vec<String> = links.iter().map(|l| format!("\"{}\"", l)).collect();
    format!(
        r#"{{"linksets":[{{"dbfrom":"pubmed","ids":["{}"],"linksetdbs":[{{"dbto":"pubmed","linkname":"{}","links":[{}]}}]}}]}}"#,
        id,
        linkname,
        links.join(",")
    )
}

fn seeds(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_seed_crawl_stores_graph() {
    let h = Harness::start().await;
    h.mock_details("100", &[("100", Some("10.1000/a100"))]).await;
    h.mock_references("100", &["200", "300"]).await;
    h.mock_details(
        "200,300",
        &[("200", Some("10.1000/a200")), ("300", None)],
    )
    .await;
    // 300 gets one single-ID retry and still comes back without a DOI
    h.mock_details("300", &[("300", None)]).await;

    let mut crawler = h.crawler();
    let stats = crawler.crawl_seeds(&seeds(&["100"]), Some(1)).await.unwrap();

    assert_eq!(stats.articles_saved, 2);
    assert_eq!(stats.missing_doi, 1);
    assert_eq!(stats.levels_processed, 1);
    assert_eq!(stats.edges_saved, 2);
    assert_eq!(stats.dangling_edges, 1);

    let store = h.store.lock().unwrap();
    let graph = load_statistics(&*store).unwrap();
    assert_eq!(graph.articles, 2);
    assert_eq!(graph.missing_doi, 1);
    assert_eq!(graph.edges, 2);
    assert_eq!(graph.dangling_edges, 1);
    // Both articles share one affiliation entity
    assert_eq!(graph.affiliations, 1);

    let edges = store.citation_edges_from("10.1000/a100").unwrap();
    let resolved: Vec<_> = edges.iter().filter(|e| !e.is_dangling()).collect();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].cited_doi.as_deref(), Some("10.1000/a200"));
}

#[tokio::test]
async fn test_reference_failure_is_isolated() {
    let h = Harness::start().await;
    h.mock_details(
        "100,101",
        &[("100", Some("10.1000/a100")), ("101", Some("10.1000/a101"))],
    )
    .await;
    h.mock_references("100", &["200"]).await;
    Mock::given(method("GET"))
        .and(path("/elink.fcgi"))
        .and(query_param("id", "101"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.server)
        .await;
    h.mock_details("200", &[("200", Some("10.1000/a200"))]).await;

    let mut crawler = h.crawler();
    let stats = crawler
        .crawl_seeds(&seeds(&["100", "101"]), Some(1))
        .await
        .unwrap();

    assert_eq!(stats.articles_saved, 3);
    assert_eq!(stats.edges_saved, 1);
    assert_eq!(stats.failures(), 1);
    assert_eq!(stats.errors[0].numeric_id.as_deref(), Some("101"));
}

#[tokio::test]
async fn test_second_run_skips_known_articles() {
    let h = Harness::start().await;
    h.mock_details("100", &[("100", Some("10.1000/a100"))]).await;
    h.mock_references("100", &["200"]).await;
    h.mock_references("200", &["100"]).await;
    Mock::given(method("GET"))
        .and(path("/efetch.fcgi"))
        .and(query_param("id", "200"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(article_set(&[("200", Some("10.1000/a200"))])),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let first = h
        .crawler()
        .crawl_seeds(&seeds(&["100"]), None)
        .await
        .unwrap();
    assert_eq!(first.articles_saved, 2);
    assert_eq!(first.edges_saved, 2);

    // Everything is known now: links are re-read but nothing is fetched again
    let second = h
        .crawler()
        .crawl_seeds(&seeds(&["100"]), None)
        .await
        .unwrap();
    assert_eq!(second.articles_saved, 0);
    assert_eq!(second.edges_saved, 0);
    assert_eq!(second.ids_scheduled, 0);
    assert_eq!(h.store.lock().unwrap().count_edges().unwrap(), 2);
}

#[tokio::test]
async fn test_keyword_crawl_with_references() {
    let h = Harness::start().await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .and(query_param("term", "ripples"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"esearchresult":{"count":"2","idlist":["100","101"]}}"#,
        ))
        .mount(&h.server)
        .await;
    h.mock_details(
        "100,101",
        &[("100", Some("10.1000/a100")), ("101", Some("10.1000/a101"))],
    )
    .await;
    h.mock_references("100", &["101", "200"]).await;
    h.mock_references("101", &[]).await;
    h.mock_details("200", &[("200", Some("10.1000/a200"))]).await;

    let mut crawler = h.crawler();
    let stats = crawler
        .crawl_by_keyword("ripples", Some(10), true, Some(1))
        .await
        .unwrap();

    assert_eq!(stats.articles_saved, 3);
    assert_eq!(stats.edges_saved, 2);
    assert_eq!(stats.dangling_edges, 0);
}

#[tokio::test]
async fn test_filtered_keyword_query_sent() {
    let h = Harness::start().await;
    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .and(query_param(
            "term",
            r#"ripples AND 2019:2020[dp] AND "english"[la]"#,
        ))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"esearchresult":{"count":"1","idlist":["100"]}}"#,
        ))
        .expect(1)
        .mount(&h.server)
        .await;
    h.mock_details("100", &[("100", Some("10.1000/a100"))]).await;

    let filter = SearchFilter {
        date_from: Some("2019".to_string()),
        date_to: Some("2020".to_string()),
        languages: vec!["english".to_string()],
        ..SearchFilter::default()
    };
    let stats = h
        .crawler()
        .crawl_by_filtered_keyword("ripples", &filter, Some(5), false, None)
        .await
        .unwrap();

    assert_eq!(stats.articles_saved, 1);
}

#[tokio::test]
async fn test_refresh_updates_stored_article() {
    let h = Harness::start().await;
    h.mock_details("100", &[("100", Some("10.1000/a100"))]).await;
    h.mock_references("100", &[]).await;

    let first = h
        .crawler()
        .crawl_seeds(&seeds(&["100"]), Some(1))
        .await
        .unwrap();
    assert_eq!(first.articles_saved, 1);

    let refreshed = h.crawler().refresh_stale_articles(0).await.unwrap();
    assert_eq!(refreshed.articles_saved, 0);
    assert_eq!(refreshed.articles_refreshed, 1);
    assert_eq!(h.store.lock().unwrap().count_articles().unwrap(), 1);
}

#[tokio::test]
async fn test_run_bookkeeping() {
    let h = Harness::start().await;
    h.mock_details("100", &[("100", Some("10.1000/a100"))]).await;
    h.mock_references("100", &[]).await;

    let run_id = h.store.lock().unwrap().create_run("graph", "hash").unwrap();
    let stats = h
        .crawler()
        .crawl_seeds(&seeds(&["100"]), Some(2))
        .await
        .unwrap();
    h.store
        .lock()
        .unwrap()
        .finish_run(run_id, RunStatus::Completed, &stats.totals())
        .unwrap();

    let latest = h.store.lock().unwrap().get_latest_run().unwrap().unwrap();
    assert_eq!(latest.id, run_id);
    assert_eq!(latest.status, RunStatus::Completed);
    assert_eq!(latest.totals.articles_saved, 1);
    assert_eq!(latest.totals.levels_processed, 1);
    assert!(latest.finished_at.is_some());
}

#[tokio::test]
async fn test_stop_before_crawl() {
    let h = Harness::start().await;
    h.mock_details("100", &[("100", Some("10.1000/a100"))]).await;
    h.mock_references("100", &["200"]).await;

    let mut crawler = h.crawler();
    crawler.stop_handle().stop();
    let stats = crawler
        .crawl_citation_graph(&seeds(&["100"]), None)
        .await
        .unwrap();

    assert!(stats.stopped);
    assert_eq!(stats.levels_processed, 0);
    assert_eq!(h.store.lock().unwrap().count_articles().unwrap(), 0);
}
