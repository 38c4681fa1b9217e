//! Filter layer configuration with validation.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Longest accepted filter TTL. Anything above this would push the sweeper's
/// first deadline past what `Instant` can represent.
pub const MAX_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Main filter layer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Inactivity period after which a filter is evicted. The sweeper runs
    /// every `ttl / 2`.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Upstream call configuration
    pub upstream: UpstreamConfig,
    /// Admission gate configuration
    pub rate_limit: RateLimitConfig,
}

impl FilterConfig {
    /// Config with the given TTL and defaults elsewhere
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            ..Self::default()
        }
    }

    /// Parse from JSON and validate
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: FilterConfig =
            serde_json::from_str(s).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        // ttl / 2 feeds tokio::time::interval, which panics on zero
        if self.ttl < Duration::from_millis(2) {
            return Err(ConfigError::InvalidTtl(
                "ttl must be at least 2ms".into(),
            ));
        }
        if self.ttl > MAX_TTL {
            return Err(ConfigError::InvalidTtl(format!(
                "ttl must be at most {}s",
                MAX_TTL.as_secs()
            )));
        }

        if self.upstream.request_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "upstream request_timeout cannot be 0".into(),
            ));
        }

        if self.rate_limit.enabled && self.rate_limit.requests_per_second == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "requests_per_second cannot be 0".into(),
            ));
        }

        if self.rate_limit.cleanup_interval.is_zero() || self.rate_limit.cleanup_interval > MAX_TTL {
            return Err(ConfigError::InvalidRateLimit(
                "cleanup_interval must be between 1ms and the maximum ttl".into(),
            ));
        }

        Ok(())
    }

    /// Period of the TTL sweeper
    pub fn sweep_interval(&self) -> Duration {
        self.ttl / 2
    }
}

/// Upstream node call configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Deadline applied to every node client and filter system call
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Admission gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,
    /// Sustained requests per second per client and key
    pub requests_per_second: u32,
    /// Burst allowance (token bucket)
    pub burst_size: u32,
    /// Clients that bypass rate limiting entirely
    pub whitelist: Vec<IpAddr>,
    /// How often idle buckets are dropped
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
    /// Buckets unused for this long are dropped by the cleanup task
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 100,
            burst_size: 200,
            whitelist: vec![IpAddr::V4(Ipv4Addr::LOCALHOST)],
            cleanup_interval: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(10 * 60),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            upstream: UpstreamConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid ttl: {0}")]
    InvalidTtl(String),
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Duration (de)serialization as `"30s"`, `"500ms"`, `"5m"` or plain seconds
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" must be checked before "m" and "s"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map_err(|_| "invalid minutes")?
                .checked_mul(60)
                .map(Duration::from_secs)
                .ok_or("invalid minutes")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
