//! HTTP backend for the NCBI E-utilities
//!
//! One method per primitive operation, one request per call. Throttling and
//! retries belong to [`MetadataGateway`](super::MetadataGateway).

use crate::config::GatewayConfig;
use crate::gateway::parse::{parse_articles, parse_link_ids, parse_search_page, ResponseError};
use crate::gateway::{FetchError, MetadataApi};
use crate::model::{ArticleRecord, CitedReference, CitingReference, SearchPage};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

const ESEARCH: &str = "esearch.fcgi";
const EFETCH: &str = "efetch.fcgi";
const ELINK: &str = "elink.fcgi";

const LINK_REFERENCES: &str = "pubmed_pubmed_refs";
const LINK_CITED_BY: &str = "pubmed_pubmed_citedin";

/// Builds an HTTP client identifying this tool to the service
///
/// # Arguments
///
/// * `config` - The gateway configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &GatewayConfig) -> Result<Client, reqwest::Error> {
    // Format: ToolName/Version (mailto:ContactEmail)
    let user_agent = format!(
        "{}/{} (mailto:{})",
        config.tool_name,
        env!("CARGO_PKG_VERSION"),
        config.contact_email
    );

    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// [`MetadataApi`] over the E-utilities `esearch`, `efetch` and `elink` endpoints
#[derive(Debug, Clone)]
pub struct EntrezClient {
    client: Client,
    base_url: String,
    tool: String,
    email: String,
    api_key: Option<String>,
}

impl EntrezClient {
    /// Creates a client for the endpoints under `config.base_url`
    pub fn new(config: &GatewayConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            tool: config.tool_name.clone(),
            email: config.contact_email.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// Parameters sent with every request
    fn identity_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("tool", self.tool.clone()),
            ("email", self.email.clone()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }

    /// Issues a GET and returns the body of a successful response
    async fn get_text(
        &self,
        endpoint: &'static str,
        params: &[(&'static str, String)],
    ) -> Result<String, FetchError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let network = |source| FetchError::Network {
            endpoint: endpoint.to_string(),
            source,
        };

        let response = self
            .client
            .get(&url)
            .query(&self.identity_params())
            .query(params)
            .send()
            .await
            .map_err(network)?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!("{} returned HTTP {}", endpoint, status.as_u16());
            return Err(FetchError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(network)
    }

    async fn fetch_link_ids(&self, id: &str, linkname: &str) -> Result<Vec<String>, FetchError> {
        let params = [
            ("dbfrom", "pubmed".to_string()),
            ("id", id.to_string()),
            ("linkname", linkname.to_string()),
            ("retmode", "json".to_string()),
        ];
        let body = self.get_text(ELINK, &params).await?;
        parse_link_ids(&body, linkname).map_err(|e| response_error(ELINK, e))
    }
}

fn response_error(endpoint: &str, error: ResponseError) -> FetchError {
    match error {
        ResponseError::Malformed(message) => FetchError::Decode {
            endpoint: endpoint.to_string(),
            message,
        },
        ResponseError::Service(message) => FetchError::Service {
            endpoint: endpoint.to_string(),
            message,
        },
    }
}

#[async_trait]
impl MetadataApi for EntrezClient {
    async fn search(
        &self,
        term: &str,
        max_count: usize,
        offset: usize,
    ) -> Result<SearchPage, FetchError> {
        let params = [
            ("term", term.to_string()),
            ("retmax", max_count.to_string()),
            ("retstart", offset.to_string()),
            ("sort", "relevance".to_string()),
            ("retmode", "json".to_string()),
        ];
        let body = self.get_text(ESEARCH, &params).await?;
        parse_search_page(&body).map_err(|e| response_error(ESEARCH, e))
    }

    async fn fetch_details(&self, ids: &[String]) -> Result<Vec<ArticleRecord>, FetchError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let params = [
            ("id", ids.join(",")),
            ("rettype", "abstract".to_string()),
            ("retmode", "xml".to_string()),
        ];
        let body = self.get_text(EFETCH, &params).await?;
        parse_articles(&body).map_err(|e| response_error(EFETCH, e))
    }

    async fn fetch_references(&self, id: &str) -> Result<Vec<CitedReference>, FetchError> {
        let ids = self.fetch_link_ids(id, LINK_REFERENCES).await?;
        Ok(ids
            .into_iter()
            .enumerate()
            .map(|(i, cited_id)| CitedReference {
                cited_id,
                order: i as u32 + 1,
            })
            .collect())
    }

    async fn fetch_cited_by(&self, id: &str) -> Result<Vec<CitingReference>, FetchError> {
        let ids = self.fetch_link_ids(id, LINK_CITED_BY).await?;
        Ok(ids
            .into_iter()
            .map(|citing_id| CitingReference { citing_id })
            .collect())
    }
}
