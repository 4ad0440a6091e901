//! Redis Streams configuration for the notification pipeline.
//!
//! This module provides the connection, stream and consumer-group settings
//! shared by the producer side and the email worker.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// When an entry is acknowledged relative to its dispatch outcome.
///
/// `AlwaysAfterAttempt` is the "we tried" policy: every entry read is
/// acknowledged once the handler returns, whether the handler succeeded or
/// not. Failed entries are therefore never redelivered. `OnSuccess` leaves
/// failed entries in the group's pending list so they can be claimed and
/// dead-lettered by a separate process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AckPolicy {
    #[default]
    AlwaysAfterAttempt,
    OnSuccess,
}

impl AckPolicy {
    /// Whether an entry with the given handler outcome should be acknowledged
    pub fn should_ack(&self, handled_ok: bool) -> bool {
        match self {
            AckPolicy::AlwaysAfterAttempt => true,
            AckPolicy::OnSuccess => handled_ok,
        }
    }
}

/// Main stream configuration for the notification pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    /// Stream key notification events are appended to
    #[serde(default = "default_stream")]
    pub stream: String,
    /// Consumer group name
    #[serde(default = "default_group")]
    pub group: String,
    /// Consumer name within the group
    #[serde(default = "default_consumer_name")]
    pub consumer_name: String,
    /// How long a single read blocks waiting for new entries
    #[serde(default = "default_block_ms")]
    pub block_ms: u64,
    /// Delay before retrying after a failed read
    #[serde(default = "default_read_retry_delay_ms")]
    pub read_retry_delay_ms: u64,
    /// Position a freshly created group starts reading from ("$" = new entries only)
    #[serde(default = "default_start_id")]
    pub start_id: String,
    /// Acknowledgment policy
    #[serde(default)]
    pub ack_policy: AckPolicy,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_stream() -> String {
    "notification_stream".to_string()
}

fn default_group() -> String {
    "email_workers".to_string()
}

fn default_consumer_name() -> String {
    "worker_1".to_string()
}

fn default_block_ms() -> u64 {
    5000
}

fn default_read_retry_delay_ms() -> u64 {
    1000
}

fn default_start_id() -> String {
    "$".to_string()
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            stream: default_stream(),
            group: default_group(),
            consumer_name: default_consumer_name(),
            block_ms: default_block_ms(),
            read_retry_delay_ms: default_read_retry_delay_ms(),
            start_id: default_start_id(),
            ack_policy: AckPolicy::default(),
        }
    }
}

impl StreamConfig {
    /// Create a new StreamConfig for the given Redis URL
    pub fn new(redis_url: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let redis_url = match std::env::var("REDIS_URL") {
            Ok(url) => url,
            Err(_) => {
                let host = std::env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string());
                let port = std::env::var("REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
                port.parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                    key: "REDIS_PORT".to_string(),
                    message: e.to_string(),
                })?;
                format!("redis://{}:{}", host, port)
            }
        };

        let mut config = Self::new(redis_url);

        if let Ok(stream) = std::env::var("NOTIFICATION_STREAM") {
            config.stream = stream;
        }
        if let Ok(group) = std::env::var("NOTIFICATION_GROUP") {
            config.group = group;
        }
        if let Ok(consumer) = std::env::var("NOTIFICATION_CONSUMER") {
            config.consumer_name = consumer;
        }

        config.validate()?;
        Ok(config)
    }

    /// Get the read block timeout as Duration
    pub fn block_timeout(&self) -> Duration {
        Duration::from_millis(self.block_ms)
    }

    /// Get the read retry delay as Duration
    pub fn read_retry_delay(&self) -> Duration {
        Duration::from_millis(self.read_retry_delay_ms)
    }

    /// Settings for a read-only observer of the same stream.
    ///
    /// The observer reads through its own `<group>-tail` group positioned at
    /// `$`, so its reads and acks never change what the worker group sees.
    pub fn observer(&self) -> Self {
        Self {
            group: format!("{}-tail", self.group),
            consumer_name: "tail".to_string(),
            start_id: "$".to_string(),
            ..self.clone()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.redis_url.is_empty() {
            return Err(ConfigError::MissingRequired("redis_url".to_string()));
        }
        if self.stream.is_empty() {
            return Err(ConfigError::MissingRequired("stream".to_string()));
        }
        if self.group.is_empty() {
            return Err(ConfigError::MissingRequired("group".to_string()));
        }
        if self.consumer_name.is_empty() {
            return Err(ConfigError::MissingRequired("consumer_name".to_string()));
        }
        if self.block_ms == 0 {
            // BLOCK 0 waits forever and the loop would never see shutdown
            return Err(ConfigError::InvalidValue {
                key: "block_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.read_retry_delay_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "read_retry_delay_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StreamConfig::default();
        assert_eq!(config.stream, "notification_stream");
        assert_eq!(config.group, "email_workers");
        assert_eq!(config.consumer_name, "worker_1");
        assert_eq!(config.start_id, "$");
        assert_eq!(config.read_retry_delay(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_group() {
        let config = StreamConfig {
            group: String::new(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired(key)) if key == "group"
        ));
    }

    #[test]
    fn test_validate_rejects_zero_retry_delay() {
        let config = StreamConfig {
            read_retry_delay_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_validate_rejects_zero_block() {
        let config = StreamConfig {
            block_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "block_ms"
        ));
    }

    #[test]
    fn test_observer_uses_separate_group() {
        let worker = StreamConfig {
            start_id: "0".to_string(),
            ..StreamConfig::new("redis://cache:6379")
        };
        let observer = worker.observer();

        assert_eq!(observer.group, "email_workers-tail");
        assert_ne!(observer.group, worker.group);
        assert_eq!(observer.start_id, "$");
        assert_eq!(observer.stream, worker.stream);
        assert_eq!(observer.redis_url, "redis://cache:6379");
        assert!(observer.validate().is_ok());
    }

    #[test]
    fn test_ack_policy() {
        assert!(AckPolicy::AlwaysAfterAttempt.should_ack(true));
        assert!(AckPolicy::AlwaysAfterAttempt.should_ack(false));
        assert!(AckPolicy::OnSuccess.should_ack(true));
        assert!(!AckPolicy::OnSuccess.should_ack(false));
    }

    #[test]
    fn test_ack_policy_deserialization() {
        let policy: AckPolicy = serde_json::from_str("\"on_success\"").unwrap();
        assert_eq!(policy, AckPolicy::OnSuccess);
    }
}
