//! Retry policies, rate limiting, and request logging for backend calls

pub mod config;
pub mod logging;
pub mod rate_limiter;
pub mod retry;

pub use config::{RateLimitConfig, ResilienceConfig, ResilienceConfigBuilder};
pub use logging::{ApiLogger, OperationContext};
pub use rate_limiter::{RateLimiter, RateLimiterStats};
pub use retry::{Classify, RetryConfig, RetryPolicy, RetryableError};
