use crate::config::Config;
use crate::error::GateError;
use crate::rate_limit_config::RateLimitConfig;

/// Validates configuration objects for consistency and correctness
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates the upstream base URL
    pub fn validate_upstream_url(url: &str) -> Result<(), GateError> {
        if url.is_empty() {
            return Err(GateError::Validation(
                "Upstream URL cannot be empty".to_string(),
            ));
        }

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(GateError::Validation(
                "Upstream URL must start with 'http://' or 'https://'".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates the per-category rate limit table
    pub fn validate_rate_limits(config: &RateLimitConfig) -> Result<(), GateError> {
        config.validate().map_err(GateError::Validation)
    }

    /// Validates server configuration parameters
    pub fn validate_config(config: &Config) -> Result<(), GateError> {
        if config.bind_addr.port() == 0 {
            return Err(GateError::Validation(
                "Server port must be greater than 0".to_string(),
            ));
        }

        if config.upstream_timeout_secs == 0 {
            return Err(GateError::Validation(
                "Upstream timeout must be greater than 0".to_string(),
            ));
        }

        if config.cleanup_interval_secs == 0 {
            return Err(GateError::Validation(
                "Cleanup interval must be greater than 0".to_string(),
            ));
        }

        Self::validate_upstream_url(&config.upstream_url)?;

        Ok(())
    }
}
