//! Outbox configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `OUTBOX` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use event_outbox::config::OutboxConfig;
//!
//! let config = OutboxConfig::load().expect("Failed to load configuration");
//! config.logging.init().expect("Failed to initialize logging");
//!
//! println!("Publishing in batches of {}", config.publisher.batch_size);
//! ```

mod database;
mod error;
mod logging;
mod publisher;
mod redis;
mod unit_of_work;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use logging::LoggingConfig;
pub use publisher::PublisherConfig;
pub use self::redis::RedisConfig;
pub use unit_of_work::UnitOfWorkConfig;

use serde::Deserialize;

/// Root outbox configuration
///
/// Load using [`OutboxConfig::load()`] which reads from environment variables
/// and validates the result.
#[derive(Debug, Clone, Deserialize)]
pub struct OutboxConfig {
    /// Event log and failed message store (PostgreSQL)
    pub database: DatabaseConfig,

    /// Message broker (Redis pub/sub)
    pub broker: RedisConfig,

    /// Publisher loop settings
    #[serde(default)]
    pub publisher: PublisherConfig,

    /// Retry policy for transient store faults
    #[serde(default)]
    pub unit_of_work: UnitOfWorkConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl OutboxConfig {
    /// Load and validate configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `OUTBOX` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    /// 5. Validates every section
    ///
    /// # Environment Variable Format
    ///
    /// - `OUTBOX__DATABASE__URL=...` -> `database.url = ...`
    /// - `OUTBOX__PUBLISHER__BATCH_SIZE=500` -> `publisher.batch_size = 500`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Required environment variables are missing
    /// - Values cannot be parsed into expected types
    /// - A section fails validation
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config: Self = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("OUTBOX")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for the first invalid section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.database.validate()?;
        self.broker.validate()?;
        self.publisher.validate()?;
        self.unit_of_work.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;
    use std::time::Duration;

    // Mutex to ensure tests don't run in parallel (env vars are global)
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "OUTBOX__DATABASE__URL",
        "OUTBOX__BROKER__URL",
        "OUTBOX__PUBLISHER__BATCH_SIZE",
        "OUTBOX__PUBLISHER__PUBLISH_TIMEOUT_MS",
        "OUTBOX__UNIT_OF_WORK__MAX_ATTEMPTS",
    ];

    /// Helper to set environment variables for testing
    fn set_minimal_env() {
        env::set_var("OUTBOX__DATABASE__URL", "postgresql://test@localhost/test");
        env::set_var("OUTBOX__BROKER__URL", "redis://localhost:6379");
    }

    /// Helper to clear environment variables after testing
    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = OutboxConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.database.url, "postgresql://test@localhost/test");
        assert_eq!(config.broker.url, "redis://localhost:6379");
        assert_eq!(config.publisher.batch_size, 1000);
        assert_eq!(config.unit_of_work.max_attempts, 6);
    }

    #[test]
    fn test_nested_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("OUTBOX__PUBLISHER__BATCH_SIZE", "50");
        env::set_var("OUTBOX__PUBLISHER__PUBLISH_TIMEOUT_MS", "750");
        env::set_var("OUTBOX__UNIT_OF_WORK__MAX_ATTEMPTS", "2");
        let result = OutboxConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.publisher.batch_size, 50);
        assert_eq!(config.publisher.publish_timeout(), Some(Duration::from_millis(750)));
        assert_eq!(config.unit_of_work.retry_policy().max_attempts, 2);
    }

    #[test]
    fn test_missing_broker_fails() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("OUTBOX__DATABASE__URL", "postgresql://test@localhost/test");
        let result = OutboxConfig::load();
        clear_env();

        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_section_fails_validation() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("OUTBOX__PUBLISHER__BATCH_SIZE", "0");
        let result = OutboxConfig::load();
        clear_env();

        assert!(matches!(
            result,
            Err(ConfigError::ValidationFailed(ValidationError::MustBePositive(_)))
        ));
    }
}
