//! Integration tests for the E-utilities gateway
//!
//! A wiremock server stands in for the remote service; requests go through
//! the real HTTP client, rate limiter and retry policy.

use cite_ripple::config::{parse_config, Config};
use cite_ripple::gateway::{EntrezClient, FetchError, MetadataGateway};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_test_config(base_url: &str) -> Config {
    parse_config(&format!(
        r#"
[gateway]
base-url = "{}"
tool-name = "cite-ripple-test"
contact-email = "curator@example.org"
calls-per-second = 100.0

[retry]
max-retries = 2
initial-delay-ms = 1
max-delay-ms = 5
jitter = false

[output]
database-path = "unused.db"
"#,
        base_url
    ))
    .expect("valid test config")
}

fn create_gateway(server: &MockServer) -> MetadataGateway<EntrezClient> {
    let config = create_test_config(&server.uri());
    let client = EntrezClient::new(&config.gateway).expect("client builds");
    MetadataGateway::from_config(client, &config)
}

const EFETCH_XML: &str = r#"<?xml version="1.0" ?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation Status="MEDLINE" Owner="NLM">
      <PMID Version="1">100</PMID>
      <Article PubModel="Print">
        <Journal>
          <JournalIssue CitedMedium="Internet">
            <PubDate><Year>2021</Year></PubDate>
          </JournalIssue>
          <Title>Journal of Examples</Title>
        </Journal>
        <ArticleTitle>Ripples in the <i>citation</i> pond.</ArticleTitle>
        <ELocationID EIdType="doi" ValidYN="Y">10.1000/XYZ.100</ELocationID>
        <Abstract>
          <AbstractText Label="BACKGROUND">Citations spread.</AbstractText>
        </Abstract>
        <AuthorList CompleteYN="Y">
          <Author ValidYN="Y">
            <LastName>Doe</LastName>
            <ForeName>Jane</ForeName>
            <Initials>J</Initials>
            <Identifier Source="ORCID">https://orcid.org/0000-0001-2345-6789</Identifier>
            <AffiliationInfo>
              <Affiliation>Dept. of Biology, Stanford University, Stanford, CA 94305, USA.</Affiliation>
            </AffiliationInfo>
          </Author>
        </AuthorList>
      </Article>
      <KeywordList Owner="NOTNLM">
        <Keyword MajorTopicYN="N">bibliometrics</Keyword>
      </KeywordList>
    </MedlineCitation>
    <PubmedData>
      <ArticleIdList>
        <ArticleId IdType="pubmed">100</ArticleId>
        <ArticleId IdType="pmc">PMC100</ArticleId>
      </ArticleIdList>
    </PubmedData>
  </PubmedArticle>
</PubmedArticleSet>"#;

#[tokio::test]
async fn test_search_sends_identity_and_paging() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .and(query_param("db", "pubmed"))
        .and(query_param("term", "crispr"))
        .and(query_param("retmax", "2"))
        .and(query_param("retstart", "4"))
        .and(query_param("tool", "cite-ripple-test"))
        .and(query_param("email", "curator@example.org"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"esearchresult":{"count":"7","retmax":"2","retstart":"4","idlist":["5","6"]}}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = create_gateway(&server);
    let page = gateway.search("crispr", 2, 4).await.unwrap();

    assert_eq!(page.count, 7);
    assert_eq!(page.ids, vec!["5".to_string(), "6".to_string()]);
}

#[tokio::test]
async fn test_fetch_details_decodes_xml() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/efetch.fcgi"))
        .and(query_param("id", "100"))
        .and(query_param("retmode", "xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(EFETCH_XML))
        .mount(&server)
        .await;

    let gateway = create_gateway(&server);
    let records = gateway.fetch_details(&["100".to_string()]).await.unwrap();

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.numeric_id.as_deref(), Some("100"));
    assert_eq!(record.doi.as_deref(), Some("10.1000/xyz.100"));
    assert_eq!(record.title.as_deref(), Some("Ripples in the citation pond."));
    assert_eq!(record.pub_year, Some(2021));
    assert_eq!(record.pmc_id.as_deref(), Some("PMC100"));
    assert_eq!(record.keywords, vec!["bibliometrics".to_string()]);

    let author = &record.authors[0];
    assert_eq!(author.display_name().as_deref(), Some("Jane Doe"));
    assert_eq!(author.orcid.as_deref(), Some("0000-0001-2345-6789"));
    assert_eq!(author.affiliations.len(), 1);
}

#[tokio::test]
async fn test_fetch_references_keeps_link_order() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/elink.fcgi"))
        .and(query_param("id", "100"))
        .and(query_param("linkname", "pubmed_pubmed_refs"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"linksets":[{"dbfrom":"pubmed","ids":["100"],"linksetdbs":[
                {"dbto":"pubmed","linkname":"pubmed_pubmed_refs","links":["300","200"]}]}]}"#,
        ))
        .mount(&server)
        .await;

    let gateway = create_gateway(&server);
    let refs = gateway.fetch_references("100").await.unwrap();

    let listed: Vec<(&str, u32)> = refs.iter().map(|r| (r.cited_id.as_str(), r.order)).collect();
    assert_eq!(listed, vec![("300", 1), ("200", 2)]);
}

#[tokio::test]
async fn test_fetch_cited_by() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/elink.fcgi"))
        .and(query_param("linkname", "pubmed_pubmed_citedin"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"linksets":[{"dbfrom":"pubmed","ids":["100"],"linksetdbs":[
                {"dbto":"pubmed","linkname":"pubmed_pubmed_citedin","links":["900"]}]}]}"#,
        ))
        .mount(&server)
        .await;

    let gateway = create_gateway(&server);
    let citers = gateway.fetch_cited_by("100").await.unwrap();

    assert_eq!(citers.len(), 1);
    assert_eq!(citers[0].citing_id, "900");
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"esearchresult":{"count":"1","idlist":["42"]}}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = create_gateway(&server);
    let page = gateway.search("retry", 10, 0).await.unwrap();

    assert_eq!(page.ids, vec!["42".to_string()]);
}

#[tokio::test]
async fn test_retries_exhausted_returns_last_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/elink.fcgi"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let gateway = create_gateway(&server);
    let error = gateway.fetch_references("100").await.unwrap_err();

    assert!(matches!(error, FetchError::Status { status: 429, .. }));
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/efetch.fcgi"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = create_gateway(&server);
    let error = gateway
        .fetch_details(&["100".to_string()])
        .await
        .unwrap_err();

    assert!(matches!(error, FetchError::Status { status: 400, .. }));
}

#[tokio::test]
async fn test_service_error_payload_surfaces() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"esearchresult":{"ERROR":"Invalid query syntax"}}"#,
        ))
        .mount(&server)
        .await;

    let gateway = create_gateway(&server);
    let error = gateway.search("((", 10, 0).await.unwrap_err();

    assert!(matches!(error, FetchError::Service { .. }));
    assert!(error.to_string().contains("Invalid query syntax"));
}
