//! Resilience configuration with builder pattern
//!
//! Bundles retry, rate limiting and request logging settings for the
//! backend client.

use super::retry::RetryConfig;
use crate::config::ResilienceSettings;

#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    pub retry: RetryConfig,
    pub rate_limit: RateLimitConfig,
    pub request_logging: bool,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub burst_capacity: u32,
    pub enabled: bool,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            request_logging: true,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 120,
            burst_capacity: 10,
            enabled: true,
        }
    }
}

impl ResilienceConfig {
    pub fn builder() -> ResilienceConfigBuilder {
        ResilienceConfigBuilder::new()
    }

    /// Fewer retries and a lower request rate
    pub fn conservative() -> Self {
        Self {
            retry: RetryConfig::conservative(),
            rate_limit: RateLimitConfig {
                requests_per_minute: 60,
                burst_capacity: 5,
                enabled: true,
            },
            request_logging: true,
        }
    }

    /// Local backend: more retries, no rate limiting
    pub fn development() -> Self {
        Self {
            retry: RetryConfig::aggressive(),
            rate_limit: RateLimitConfig {
                requests_per_minute: 600,
                burst_capacity: 50,
                enabled: false,
            },
            request_logging: true,
        }
    }

    /// No retries, no rate limiting, no request logging (tests)
    pub fn disabled() -> Self {
        Self {
            retry: RetryConfig::none(),
            rate_limit: RateLimitConfig {
                requests_per_minute: u32::MAX,
                burst_capacity: u32::MAX,
                enabled: false,
            },
            request_logging: false,
        }
    }

    /// Build from the `[resilience]` section of the configuration file
    pub fn from_settings(settings: &ResilienceSettings) -> Self {
        Self::builder()
            .max_retries(settings.max_retries)
            .requests_per_minute(settings.requests_per_minute)
            .enable_rate_limiting(settings.rate_limiting)
            .build()
    }
}

#[derive(Debug)]
pub struct ResilienceConfigBuilder {
    config: ResilienceConfig,
}

impl ResilienceConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ResilienceConfig::default(),
        }
    }

    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Retries after the first attempt of an idempotent request
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.retry.max_attempts = retries.saturating_add(1);
        self
    }

    pub fn requests_per_minute(mut self, rpm: u32) -> Self {
        self.config.rate_limit.requests_per_minute = rpm.max(1);
        self
    }

    pub fn enable_rate_limiting(mut self, enabled: bool) -> Self {
        self.config.rate_limit.enabled = enabled;
        self
    }

    pub fn request_logging(mut self, enabled: bool) -> Self {
        self.config.request_logging = enabled;
        self
    }

    pub fn build(self) -> ResilienceConfig {
        self.config
    }
}

impl Default for ResilienceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
