//! Redis Streams producer for the notification pipeline.
//!
//! Services that raise notifications (bidding, auctions, auth, Q&A) append
//! flat field maps to the notification stream. This module provides a typed
//! front door for that, on top of `XADD`.

use crate::config::StreamConfig;
use crate::events::NotificationEvent;
use redis::aio::ConnectionManager;
use redis::streams::StreamMaxlen;
use redis::AsyncCommands;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors that can occur during entry production
#[derive(Error, Debug)]
pub enum ProducerError {
    #[error("Failed to connect to Redis: {0}")]
    ConnectionError(String),

    #[error("Entry has no fields")]
    EmptyEntry,

    #[error("Failed to append entry to stream {stream}: {message}")]
    SendError { stream: String, message: String },
}

/// Result of a successful append
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    /// Stream the entry was appended to
    pub stream: String,
    /// Queue-assigned entry id
    pub id: String,
}

/// Entry to be appended to the stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingEntry {
    /// Field pairs, in the order they are sent
    pub fields: Vec<(String, String)>,
}

impl OutgoingEntry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an entry from a typed notification event
    pub fn from_event(event: &NotificationEvent) -> Self {
        Self {
            fields: event.to_fields(),
        }
    }

    /// Add a field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// Parse `key=value` arguments, as accepted by the `pipeline publish` command
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        pairs.into_iter().try_fold(Self::new(), |entry, pair| {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("expected key=value, got '{}'", pair))?;
            if key.is_empty() {
                return Err(format!("empty key in '{}'", pair));
            }
            Ok(entry.with_field(key, value))
        })
    }
}

/// High-level notification stream producer
pub struct StreamProducer {
    conn: ConnectionManager,
    config: Arc<StreamConfig>,
    max_len: Option<usize>,
}

impl StreamProducer {
    /// Connect a producer with the given configuration
    pub async fn connect(config: StreamConfig) -> Result<Self, ProducerError> {
        info!(stream = %config.stream, "Creating stream producer");

        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| ProducerError::ConnectionError(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| ProducerError::ConnectionError(e.to_string()))?;

        Ok(Self {
            conn,
            config: Arc::new(config),
            max_len: None,
        })
    }

    /// Approximately cap the stream length on every append
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Publish a typed notification event
    #[instrument(skip(self, event), fields(event_type = %event.kind()))]
    pub async fn publish(&self, event: &NotificationEvent) -> Result<DeliveryResult, ProducerError> {
        self.send(OutgoingEntry::from_event(event)).await
    }

    /// Append a raw entry to the stream
    #[instrument(skip(self, entry), fields(stream = %self.config.stream, field_count = entry.fields.len()))]
    pub async fn send(&self, entry: OutgoingEntry) -> Result<DeliveryResult, ProducerError> {
        if entry.fields.is_empty() {
            return Err(ProducerError::EmptyEntry);
        }

        let stream = self.config.stream.clone();
        let mut conn = self.conn.clone();

        let result: redis::RedisResult<String> = match self.max_len {
            Some(max_len) => {
                conn.xadd_maxlen(&stream, StreamMaxlen::Approx(max_len), "*", entry.fields.as_slice())
                    .await
            }
            None => conn.xadd(&stream, "*", entry.fields.as_slice()).await,
        };

        let id = result.map_err(|e| ProducerError::SendError {
            stream: stream.clone(),
            message: e.to_string(),
        })?;

        debug!(entry_id = %id, "Entry appended");

        Ok(DeliveryResult { stream, id })
    }
}
