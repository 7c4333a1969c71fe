//! Gateway to the remote metadata service
//!
//! This module contains:
//! - The [`MetadataApi`] trait, the seam between the crawler and a concrete backend
//! - [`MetadataGateway`], which puts every call behind the rate limiter and retry policy
//! - [`EntrezClient`], the HTTP backend for the NCBI E-utilities
//! - Typed decoding of service responses

mod entrez;
mod parse;
mod rate_limiter;
mod retry;

pub use entrez::{build_http_client, EntrezClient};
pub use parse::{parse_articles, parse_link_ids, parse_search_page, ResponseError};
pub use rate_limiter::RateLimiter;
pub use retry::{RetryPolicy, Retryable};

use crate::config::Config;
use crate::model::{ArticleRecord, CitedReference, CitingReference, SearchPage};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by a metadata backend
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {endpoint} failed: {source}")]
    Network {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("{endpoint} reported an error: {message}")]
    Service { endpoint: String, message: String },

    #[error("could not decode {endpoint} response: {message}")]
    Decode { endpoint: String, message: String },
}

impl Retryable for FetchError {
    /// Network trouble, throttling, server errors and service-side hiccups are
    /// transient. Client errors and undecodable payloads are not.
    fn is_retryable(&self) -> bool {
        match self {
            Self::Network { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_request() || source.is_body()
            }
            Self::Status { status, .. } => *status == 429 || (500..600).contains(status),
            Self::Service { .. } => true,
            Self::Decode { .. } => false,
        }
    }
}

/// Primitive operations offered by the metadata service
///
/// Implementations perform exactly one remote call per method and do no
/// throttling or retrying of their own.
#[async_trait]
pub trait MetadataApi: Send + Sync {
    /// Returns the total hit count and one page of matching IDs
    async fn search(
        &self,
        term: &str,
        max_count: usize,
        offset: usize,
    ) -> Result<SearchPage, FetchError>;

    /// Fetches full records for a batch of numeric IDs
    async fn fetch_details(&self, ids: &[String]) -> Result<Vec<ArticleRecord>, FetchError>;

    /// Lists the articles referenced by `id`, in reference order
    async fn fetch_references(&self, id: &str) -> Result<Vec<CitedReference>, FetchError>;

    /// Lists the articles that cite `id`
    async fn fetch_cited_by(&self, id: &str) -> Result<Vec<CitingReference>, FetchError>;
}

/// Rate-limited, retrying front for a [`MetadataApi`]
///
/// Every call waits on the shared limiter before each attempt, so retries
/// are throttled like first attempts. No caching: every call reaches the
/// backend.
pub struct MetadataGateway<A> {
    api: A,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl<A: MetadataApi> MetadataGateway<A> {
    pub fn new(api: A, limiter: Arc<RateLimiter>, retry: RetryPolicy) -> Self {
        Self {
            api,
            limiter,
            retry,
        }
    }

    /// Builds a gateway with the limiter and retry policy described by `config`
    pub fn from_config(api: A, config: &Config) -> Self {
        Self::new(
            api,
            Arc::new(RateLimiter::from_config(&config.gateway)),
            RetryPolicy::from_config(&config.retry),
        )
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub async fn search(
        &self,
        term: &str,
        max_count: usize,
        offset: usize,
    ) -> Result<SearchPage, FetchError> {
        let api = &self.api;
        let limiter = &self.limiter;
        let label = format!("search '{}' at offset {}", term, offset);

        self.retry
            .run(&label, move || async move {
                limiter.acquire().await;
                api.search(term, max_count, offset).await
            })
            .await
    }

    pub async fn fetch_details(&self, ids: &[String]) -> Result<Vec<ArticleRecord>, FetchError> {
        let api = &self.api;
        let limiter = &self.limiter;
        let label = format!("details for {} ids", ids.len());

        self.retry
            .run(&label, move || async move {
                limiter.acquire().await;
                api.fetch_details(ids).await
            })
            .await
    }

    pub async fn fetch_references(&self, id: &str) -> Result<Vec<CitedReference>, FetchError> {
        let api = &self.api;
        let limiter = &self.limiter;
        let label = format!("references of {}", id);

        self.retry
            .run(&label, move || async move {
                limiter.acquire().await;
                api.fetch_references(id).await
            })
            .await
    }

    pub async fn fetch_cited_by(&self, id: &str) -> Result<Vec<CitingReference>, FetchError> {
        let api = &self.api;
        let limiter = &self.limiter;
        let label = format!("citations of {}", id);

        self.retry
            .run(&label, move || async move {
                limiter.acquire().await;
                api.fetch_cited_by(id).await
            })
            .await
    }
}
