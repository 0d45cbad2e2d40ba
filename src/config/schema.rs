use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EngineConfig {
    /// Hard cap on URLs per submitted run.
    #[serde(default = "default_max_urls")]
    #[validate(range(min = 1, max = 100))]
    pub max_urls_per_run: u32,

    #[serde(default = "default_concurrency")]
    #[validate(range(min = 1, max = 64))]
    pub concurrency: u32,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Upper bound on waiting for a rate-limit slot before the attempt
    /// counts as a transient failure.
    #[serde(default = "default_acquire_timeout")]
    pub limiter_acquire_timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    /// Optional path to a parent configuration file to inherit from
    #[serde(default)]
    pub extends: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_urls_per_run: default_max_urls(),
            concurrency: default_concurrency(),
            request_timeout_secs: default_request_timeout(),
            limiter_acquire_timeout_secs: default_acquire_timeout(),
            retry: RetryConfig::default(),
            rate_limits: RateLimitConfig::default(),
            extends: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Treat parse errors as transient. Off by default: a changed page
    /// layout needs a human, not three more fetches.
    #[serde(default)]
    pub retry_parse_errors: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay(),
            retry_parse_errors: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketConfig {
    #[serde(default = "default_capacity")]
    pub capacity: u32,

    /// Interval per token. Slower retailers get larger intervals.
    #[serde(default = "default_refill")]
    pub refill_ms: u64,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_ms: default_refill(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Bucket for retailers without an explicit entry.
    #[serde(default)]
    pub default: BucketConfig,

    /// Overrides keyed by retailer code.
    #[serde(default)]
    pub per_retailer: HashMap<String, BucketConfig>,
}

fn default_max_urls() -> u32 {
    20
}

fn default_concurrency() -> u32 {
    4
}

fn default_request_timeout() -> u64 {
    10
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    2000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_capacity() -> u32 {
    5
}

fn default_refill() -> u64 {
    1000
}
