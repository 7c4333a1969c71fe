//! Configuration module for Cite-Ripple
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! The loaded [`Config`] is immutable and handed to each component's constructor.
//!
//! # Example
//!
//! ```no_run
//! use cite_ripple::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Crawler will use max depth: {:?}", config.crawler.max_depth);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AffiliationConfig, Config, CrawlerConfig, GatewayConfig, OutputConfig, RetryConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
