use crate::config::types::{
    AffiliationConfig, Config, CrawlerConfig, GatewayConfig, OutputConfig, RetryConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_gateway_config(&config.gateway)?;
    validate_retry_config(&config.retry)?;
    validate_affiliation_config(&config.affiliation)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.chunk_size < 1 || config.chunk_size > 200 {
        return Err(ConfigError::Validation(format!(
            "chunk_size must be between 1 and 200, got {}",
            config.chunk_size
        )));
    }

    // The service rejects very large id lists on a single request
    if config.detail_batch_size < 1 || config.detail_batch_size > 500 {
        return Err(ConfigError::Validation(format!(
            "detail_batch_size must be between 1 and 500, got {}",
            config.detail_batch_size
        )));
    }

    if config.search_batch_size < 1 || config.search_batch_size > 10_000 {
        return Err(ConfigError::Validation(format!(
            "search_batch_size must be between 1 and 10000, got {}",
            config.search_batch_size
        )));
    }

    if config.max_processed < 1 {
        return Err(ConfigError::Validation(format!(
            "max_processed must be >= 1, got {}",
            config.max_processed
        )));
    }

    Ok(())
}

/// Validates gateway configuration
fn validate_gateway_config(config: &GatewayConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url must use http or https, got '{}'",
            config.base_url
        )));
    }

    // Tool name: non-empty, no whitespace
    if config.tool_name.is_empty() {
        return Err(ConfigError::Validation(
            "tool_name cannot be empty".to_string(),
        ));
    }

    if !config
        .tool_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "tool_name must contain only alphanumeric characters, hyphens and underscores, got '{}'",
            config.tool_name
        )));
    }

    validate_email(&config.contact_email)?;

    if let Some(key) = &config.api_key {
        if key.trim().is_empty() {
            return Err(ConfigError::Validation(
                "api_key cannot be blank when present".to_string(),
            ));
        }
    }

    for (name, rate) in [
        ("calls_per_second", config.calls_per_second),
        ("calls_per_second_with_key", config.calls_per_second_with_key),
    ] {
        if !(rate > 0.0 && rate <= 100.0) {
            return Err(ConfigError::Validation(format!(
                "{} must be in (0, 100], got {}",
                name, rate
            )));
        }
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates retry configuration
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be <= 10, got {}",
            config.max_retries
        )));
    }

    if config.max_delay_ms < config.initial_delay_ms {
        return Err(ConfigError::Validation(format!(
            "max_delay_ms ({}) must be >= initial_delay_ms ({})",
            config.max_delay_ms, config.initial_delay_ms
        )));
    }

    if config.exponential_base < 1.0 {
        return Err(ConfigError::Validation(format!(
            "exponential_base must be >= 1.0, got {}",
            config.exponential_base
        )));
    }

    Ok(())
}

/// Validates affiliation configuration
fn validate_affiliation_config(config: &AffiliationConfig) -> Result<(), ConfigError> {
    if !(config.match_threshold > 0.0 && config.match_threshold <= 1.0) {
        return Err(ConfigError::Validation(format!(
            "match_threshold must be in (0, 1], got {}",
            config.match_threshold
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    // Basic email format check: must contain @ and have text on both sides
    let (local, domain) = match email.split_once('@') {
        Some(parts) => parts,
        None => {
            return Err(ConfigError::Validation(format!(
                "Invalid email format: '{}'",
                email
            )))
        }
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
