//! Publisher loop configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::adapters::events::OutboxPublisherConfig;

/// Publisher loop and broker call settings
#[derive(Debug, Clone, Deserialize)]
pub struct PublisherConfig {
    /// Max pending events per cycle
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Max republish candidates per cycle
    #[serde(default = "default_chain_batch_size")]
    pub chain_batch_size: usize,

    /// Sleep after an empty cycle, in milliseconds
    #[serde(default = "default_idle_delay")]
    pub idle_delay_ms: u64,

    /// Broker readiness polling interval, in milliseconds
    #[serde(default = "default_connection_check_interval")]
    pub connection_check_interval_ms: u64,

    /// Sends before a failed event waits for an operator
    #[serde(default = "default_max_auto_attempts")]
    pub max_auto_attempts: u32,

    /// Age in seconds after which `InProgress` entries are reclaimed (0 disables)
    #[serde(default = "default_in_progress_timeout")]
    pub in_progress_timeout_secs: u64,

    /// Deadline for one broker call in milliseconds (0 disables)
    #[serde(default)]
    pub publish_timeout_ms: u64,
}

impl PublisherConfig {
    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }

    pub fn connection_check_interval(&self) -> Duration {
        Duration::from_millis(self.connection_check_interval_ms)
    }

    pub fn in_progress_timeout(&self) -> Option<Duration> {
        (self.in_progress_timeout_secs > 0).then(|| Duration::from_secs(self.in_progress_timeout_secs))
    }

    pub fn publish_timeout(&self) -> Option<Duration> {
        (self.publish_timeout_ms > 0).then(|| Duration::from_millis(self.publish_timeout_ms))
    }

    /// Settings for `OutboxPublisher`.
    pub fn outbox_publisher_config(&self) -> OutboxPublisherConfig {
        OutboxPublisherConfig::default()
            .with_batch_size(self.batch_size)
            .with_chain_batch_size(self.chain_batch_size)
            .with_idle_delay(self.idle_delay())
            .with_connection_check_interval(self.connection_check_interval())
            .with_max_auto_attempts(self.max_auto_attempts)
            .with_in_progress_timeout(self.in_progress_timeout())
    }

    /// Validate publisher configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_size == 0 {
            return Err(ValidationError::MustBePositive("publisher.batch_size"));
        }
        if self.chain_batch_size == 0 {
            return Err(ValidationError::MustBePositive("publisher.chain_batch_size"));
        }
        if self.connection_check_interval_ms == 0 {
            return Err(ValidationError::MustBePositive(
                "publisher.connection_check_interval_ms",
            ));
        }
        if self.max_auto_attempts == 0 {
            return Err(ValidationError::MustBePositive("publisher.max_auto_attempts"));
        }
        Ok(())
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            chain_batch_size: default_chain_batch_size(),
            idle_delay_ms: default_idle_delay(),
            connection_check_interval_ms: default_connection_check_interval(),
            max_auto_attempts: default_max_auto_attempts(),
            in_progress_timeout_secs: default_in_progress_timeout(),
            publish_timeout_ms: 0,
        }
    }
}

fn default_batch_size() -> usize {
    1000
}

fn default_chain_batch_size() -> usize {
    100
}

fn default_idle_delay() -> u64 {
    1000
}

fn default_connection_check_interval() -> u64 {
    100
}

fn default_max_auto_attempts() -> u32 {
    3
}

fn default_in_progress_timeout() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_publisher_defaults() {
        let config = PublisherConfig::default();
        assert_eq!(config.outbox_publisher_config(), OutboxPublisherConfig::default());
        assert_eq!(config.publish_timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_disables_optional_timeouts() {
        let config = PublisherConfig {
            in_progress_timeout_secs: 0,
            publish_timeout_ms: 250,
            ..Default::default()
        };
        assert_eq!(config.in_progress_timeout(), None);
        assert_eq!(config.publish_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.outbox_publisher_config().in_progress_timeout, None);
    }

    #[test]
    fn rejects_zero_batch_sizes() {
        let config = PublisherConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::MustBePositive("publisher.batch_size"))
        );

        let config = PublisherConfig {
            max_auto_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
