use crate::config::types::{Config, HttpConfig, OutputConfig, ScraperConfig, SourceConfig};
use crate::ConfigError;
use reqwest::header::HeaderValue;
use scraper::Selector;
use url::Url;

/// Largest worker pool a run may request
pub const MAX_WORKERS: usize = 10;

/// Upper bound for any per-request attempt budget
pub const MAX_ATTEMPTS: u32 = 10;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_source_config(&config.source)?;
    validate_scraper_config(&config.scraper)?;
    validate_http_config(&config.http)?;
    validate_output_config(&config.output)?;
    Ok(())
}

fn validate_source_config(config: &SourceConfig) -> Result<(), ConfigError> {
    validate_http_url("search_url", &config.search_url)?;

    if let Some(origin) = &config.site_origin {
        validate_http_url("site_origin", origin)?;
    }

    if config.page_size < 1 {
        return Err(ConfigError::Validation(format!(
            "page_size must be >= 1, got {}",
            config.page_size
        )));
    }

    validate_selector(&config.card_selector)?;
    validate_selector(&config.total_count_selector)?;

    Ok(())
}

fn validate_scraper_config(config: &ScraperConfig) -> Result<(), ConfigError> {
    validate_worker_count(config.workers)?;

    if let Some(limit) = config.page_limit {
        validate_page_limit(limit)?;
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "batch_size must be >= 1, got {}",
            config.batch_size
        )));
    }

    validate_attempts("max_detail_attempts", config.max_detail_attempts)?;
    validate_attempts("max_discovery_attempts", config.max_discovery_attempts)?;

    if config.request_timeout < 1 {
        return Err(ConfigError::Validation(format!(
            "request_timeout must be >= 1s, got {}s",
            config.request_timeout
        )));
    }

    Ok(())
}

fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.user_agents.is_empty() {
        return Err(ConfigError::Validation(
            "user_agents must contain at least one entry".to_string(),
        ));
    }

    for agent in &config.user_agents {
        validate_header("user_agents", agent)?;
    }
    validate_header("accept", &config.accept)?;
    validate_header("accept_language", &config.accept_language)?;
    validate_header("referer", &config.referer)?;

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates a worker count against the allowed pool size
pub fn validate_worker_count(workers: usize) -> Result<(), ConfigError> {
    if workers < 1 || workers > MAX_WORKERS {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and {}, got {}",
            MAX_WORKERS, workers
        )));
    }
    Ok(())
}

/// Validates a page limit
pub fn validate_page_limit(limit: u32) -> Result<(), ConfigError> {
    if limit < 1 {
        return Err(ConfigError::Validation(format!(
            "page_limit must be >= 1, got {}",
            limit
        )));
    }
    Ok(())
}

fn validate_attempts(field: &str, attempts: u32) -> Result<(), ConfigError> {
    if attempts < 1 || attempts > MAX_ATTEMPTS {
        return Err(ConfigError::Validation(format!(
            "{} must be between 1 and {}, got {}",
            field, MAX_ATTEMPTS, attempts
        )));
    }
    Ok(())
}

fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            field, value
        )));
    }

    Ok(())
}

fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })?;
    Ok(())
}

fn validate_header(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() || HeaderValue::from_str(value).is_err() {
        return Err(ConfigError::Validation(format!(
            "{} is not a valid header value: '{}'",
            field, value
        )));
    }
    Ok(())
}
