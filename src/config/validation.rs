use crate::config::types::{Config, FetcherConfig, OutputConfig, SchedulerConfig, WindowConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_window_config(&config.window)?;
    validate_scheduler_config(&config.scheduler)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the time window
fn validate_window_config(config: &WindowConfig) -> Result<(), ConfigError> {
    if config.end <= config.start {
        return Err(ConfigError::Validation(format!(
            "window end ({}) must be after start ({})",
            config.end, config.start
        )));
    }

    if config.step_ms < 1 {
        return Err(ConfigError::Validation(format!(
            "step_ms must be >= 1, got {}",
            config.step_ms
        )));
    }

    Ok(())
}

/// Validates scheduler configuration
fn validate_scheduler_config(config: &SchedulerConfig) -> Result<(), ConfigError> {
    if config.max_concurrency < 1 || config.max_concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrency must be between 1 and 100, got {}",
            config.max_concurrency
        )));
    }

    if config.retry_limit_per_task < 1 {
        return Err(ConfigError::Validation(format!(
            "retry_limit_per_task must be >= 1, got {}",
            config.retry_limit_per_task
        )));
    }

    if config.error_abort_threshold < 1 {
        return Err(ConfigError::Validation(format!(
            "error_abort_threshold must be >= 1, got {}",
            config.error_abort_threshold
        )));
    }

    if config.checkpoint_cadence < 1 {
        return Err(ConfigError::Validation(format!(
            "checkpoint_cadence must be >= 1, got {}",
            config.checkpoint_cadence
        )));
    }

    if config.fragment_count < 1 {
        return Err(ConfigError::Validation(format!(
            "fragment_count must be >= 1, got {}",
            config.fragment_count
        )));
    }

    Ok(())
}

/// Validates fetcher configuration
fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    let endpoint = Url::parse(&config.endpoint)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid endpoint: {}", e)))?;

    if endpoint.scheme() != "https" && endpoint.scheme() != "http" {
        return Err(ConfigError::Validation(format!(
            "endpoint '{}' must use HTTP or HTTPS",
            config.endpoint
        )));
    }

    if let Some(proxy) = &config.proxy {
        Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", proxy, e)))?;
    }

    if config.auth_token_path.is_empty() {
        return Err(ConfigError::Validation(
            "auth_token_path cannot be empty".to_string(),
        ));
    }

    if config.user_agent.is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "request_timeout_secs must be >= 1, got {}",
            config.request_timeout_secs
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.checkpoint_path.is_empty() {
        return Err(ConfigError::Validation(
            "checkpoint_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
