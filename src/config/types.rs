use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Cite-Ripple
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub affiliation: AffiliationConfig,
    pub output: OutputConfig,
}

/// Citation graph traversal configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of levels to expand from the seeds; absent means unbounded
    #[serde(rename = "max-depth", default)]
    pub max_depth: Option<u32>,

    /// Number of reference lookups issued concurrently per chunk
    #[serde(rename = "chunk-size", default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Pause between chunks (milliseconds)
    #[serde(rename = "chunk-pause-ms", default = "default_chunk_pause_ms")]
    pub chunk_pause_ms: u64,

    /// Number of IDs per detail request
    #[serde(rename = "detail-batch-size", default = "default_detail_batch_size")]
    pub detail_batch_size: usize,

    /// Number of IDs per search page
    #[serde(rename = "search-batch-size", default = "default_search_batch_size")]
    pub search_batch_size: usize,

    /// Hard cap on the number of IDs a single crawl may schedule
    #[serde(rename = "max-processed", default = "default_max_processed")]
    pub max_processed: usize,

    /// Also expand each article's citing articles
    #[serde(rename = "follow-cited-by", default)]
    pub follow_cited_by: bool,
}

impl CrawlerConfig {
    pub fn chunk_pause(&self) -> Duration {
        Duration::from_millis(self.chunk_pause_ms)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            chunk_size: default_chunk_size(),
            chunk_pause_ms: default_chunk_pause_ms(),
            detail_batch_size: default_detail_batch_size(),
            search_batch_size: default_search_batch_size(),
            max_processed: default_max_processed(),
            follow_cited_by: false,
        }
    }
}

/// Remote metadata service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the E-utilities endpoints
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,

    /// Tool name reported to the service
    #[serde(rename = "tool-name")]
    pub tool_name: String,

    /// Email address for service-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,

    /// Optional API key; raises the permitted call rate
    #[serde(rename = "api-key", default)]
    pub api_key: Option<String>,

    /// Call rate without an API key
    #[serde(rename = "calls-per-second", default = "default_calls_per_second")]
    pub calls_per_second: f64,

    /// Call rate with an API key
    #[serde(
        rename = "calls-per-second-with-key",
        default = "default_calls_per_second_with_key"
    )]
    pub calls_per_second_with_key: f64,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl GatewayConfig {
    /// The call rate that applies given whether an API key is configured
    pub fn effective_rate(&self) -> f64 {
        if self.api_key.is_some() {
            self.calls_per_second_with_key
        } else {
            self.calls_per_second
        }
    }
}

/// Retry behavior for gateway calls
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(rename = "initial-delay-ms", default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(rename = "max-delay-ms", default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(rename = "exponential-base", default = "default_exponential_base")]
    pub exponential_base: f64,

    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            exponential_base: default_exponential_base(),
            jitter: true,
        }
    }
}

/// Affiliation matching configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AffiliationConfig {
    /// Minimum similarity for two affiliations to be considered the same entity
    #[serde(rename = "match-threshold", default = "default_match_threshold")]
    pub match_threshold: f64,
}

impl Default for AffiliationConfig {
    fn default() -> Self {
        Self {
            match_threshold: default_match_threshold(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

fn default_chunk_size() -> usize {
    50
}

fn default_chunk_pause_ms() -> u64 {
    500
}

fn default_detail_batch_size() -> usize {
    50
}

fn default_search_batch_size() -> usize {
    100
}

fn default_max_processed() -> usize {
    50_000
}

fn default_base_url() -> String {
    "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string()
}

fn default_calls_per_second() -> f64 {
    3.0
}

fn default_calls_per_second_with_key() -> f64 {
    10.0
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_exponential_base() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_match_threshold() -> f64 {
    0.85
}
