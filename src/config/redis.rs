//! Broker configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Redis pub/sub broker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,

    /// Prepended to the event kind to form the channel name
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,

    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl RedisConfig {
    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Channel an event kind is published on.
    pub fn channel_for(&self, kind: &str) -> String {
        format!("{}{}", self.channel_prefix, kind)
    }

    /// Validate Redis configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::MissingRequired("OUTBOX__BROKER__URL"));
        }
        if !self.url.starts_with("redis://") && !self.url.starts_with("rediss://") {
            return Err(ValidationError::InvalidRedisUrl);
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::MustBePositive("broker.timeout_secs"));
        }
        Ok(())
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            channel_prefix: default_channel_prefix(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_channel_prefix() -> String {
    "events.".to_string()
}

fn default_timeout() -> u64 {
    5
}
