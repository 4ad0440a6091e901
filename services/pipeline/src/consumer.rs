//! Redis Streams consumer-group wrapper for the notification pipeline.
//!
//! The consumer reads one entry at a time from a stream on behalf of a named
//! consumer group, hands it to a [`MessageHandler`] and acknowledges it
//! according to the configured [`AckPolicy`]. Entries are processed strictly
//! in stream order; there is no internal parallelism.

use crate::config::StreamConfig;
use redis::aio::ConnectionManager;
use redis::streams::{StreamId, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, OnceCell};
use tracing::{debug, error, info, instrument, warn};

/// Errors that can occur during stream consumption
#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("Failed to connect to Redis: {0}")]
    ConnectionError(String),

    #[error("Failed to create consumer group: {0}")]
    GroupSetupError(String),

    #[error("Stream read error: {0}")]
    ReadError(String),

    #[error("Failed to acknowledge entry {id}: {message}")]
    AckError { id: String, message: String },

    #[error("Message processing error: {0}")]
    ProcessingError(String),
}

/// A single entry read from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Queue-assigned entry id (`<millis>-<seq>`), used for acknowledgment
    pub id: String,
    /// Flat field map of the entry
    pub fields: HashMap<String, String>,
}

impl StreamEntry {
    pub fn new(id: impl Into<String>, fields: HashMap<String, String>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Get a field value
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|s| s.as_str())
    }

    /// Get the event discriminator
    pub fn entry_type(&self) -> Option<&str> {
        self.field(crate::events::TYPE_FIELD)
    }

    /// Values that are not valid UTF-8 strings are dropped, so the event
    /// contract reports them as missing fields.
    fn from_stream_id(stream_id: StreamId) -> Self {
        let mut fields = HashMap::with_capacity(stream_id.map.len());
        for (key, value) in stream_id.map {
            match redis::from_redis_value::<String>(&value) {
                Ok(value) => {
                    fields.insert(key, value);
                }
                Err(e) => {
                    debug!(entry_id = %stream_id.id, field = %key, error = %e, "Dropping non-string field");
                }
            }
        }
        Self {
            id: stream_id.id,
            fields,
        }
    }
}

/// Handler trait for processing entries
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process a single entry
    async fn handle(&self, entry: &StreamEntry) -> Result<(), ConsumerError>;

    /// Called when entry processing fails
    async fn on_error(&self, entry: &StreamEntry, error: &ConsumerError) {
        warn!(
            entry_id = %entry.id,
            entry_type = ?entry.entry_type(),
            error = %error,
            "Entry processing failed"
        );
    }
}

/// Source of stream entries for one consumer of a consumer group
#[async_trait::async_trait]
pub trait StreamSource: Send + Sync {
    /// Make sure the consumer group exists on the stream
    async fn ensure_group(&self) -> Result<(), ConsumerError>;

    /// Wait up to `block` for the next new entry delivered to this consumer
    async fn read_next(&self, block: Duration) -> Result<Option<StreamEntry>, ConsumerError>;

    /// Acknowledge an entry, removing it from the group's pending list
    async fn ack(&self, id: &str) -> Result<(), ConsumerError>;
}

/// Redis Streams implementation of [`StreamSource`]
///
/// The connection is opened on first use. Until Redis is reachable every
/// call fails with [`ConsumerError::ConnectionError`], which the consumer
/// loop retries like any other queue error.
#[derive(Clone)]
pub struct RedisStreamSource {
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
    stream: String,
    group: String,
    consumer_name: String,
    start_id: String,
}

impl RedisStreamSource {
    /// Build a source for the given configuration without connecting
    pub fn new(config: &StreamConfig) -> Result<Self, ConsumerError> {
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| ConsumerError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            conn: OnceCell::new(),
            stream: config.stream.clone(),
            group: config.group.clone(),
            consumer_name: config.consumer_name.clone(),
            start_id: config.start_id.clone(),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, ConsumerError> {
        self.conn
            .get_or_try_init(|| async {
                let conn = ConnectionManager::new(self.client.clone())
                    .await
                    .map_err(|e| ConsumerError::ConnectionError(e.to_string()))?;

                info!(
                    stream = %self.stream,
                    group = %self.group,
                    consumer = %self.consumer_name,
                    "Connected to Redis stream"
                );
                Ok::<_, ConsumerError>(conn)
            })
            .await
            .cloned()
    }
}

#[async_trait::async_trait]
impl StreamSource for RedisStreamSource {
    async fn ensure_group(&self) -> Result<(), ConsumerError> {
        let mut conn = self.connection().await?;
        let result: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(&self.stream, &self.group, &self.start_id)
            .await;

        match result {
            Ok(()) => {
                info!(stream = %self.stream, group = %self.group, "Created consumer group");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!(stream = %self.stream, group = %self.group, "Consumer group already exists");
                Ok(())
            }
            Err(e) => Err(ConsumerError::GroupSetupError(e.to_string())),
        }
    }

    async fn read_next(&self, block: Duration) -> Result<Option<StreamEntry>, ConsumerError> {
        let mut conn = self.connection().await?;
        let options = StreamReadOptions::default()
            .group(&self.group, &self.consumer_name)
            .count(1)
            .block(block.as_millis() as usize);

        // A block timeout comes back as nil
        let reply: Option<StreamReadReply> = conn
            .xread_options(&[&self.stream], &[">"], &options)
            .await
            .map_err(|e| ConsumerError::ReadError(e.to_string()))?;

        Ok(reply
            .and_then(|reply| reply.keys.into_iter().flat_map(|key| key.ids).next())
            .map(StreamEntry::from_stream_id))
    }

    async fn ack(&self, id: &str) -> Result<(), ConsumerError> {
        let mut conn = self.connection().await?;
        let _: i64 = conn
            .xack(&self.stream, &self.group, &[id])
            .await
            .map_err(|e| ConsumerError::AckError {
                id: id.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }
}

/// Snapshot of consumer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub processed: u64,
    pub failed: u64,
    pub acked: u64,
    pub read_errors: u64,
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    failed: AtomicU64,
    acked: AtomicU64,
    read_errors: AtomicU64,
}

/// Consumer-group consumer over a [`StreamSource`]
pub struct StreamConsumer<S: StreamSource> {
    source: S,
    config: Arc<StreamConfig>,
    shutdown_tx: watch::Sender<bool>,
    counters: Counters,
}

impl<S: StreamSource> StreamConsumer<S> {
    /// Create a new consumer over the given source
    pub fn new(source: S, config: StreamConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            source,
            config: Arc::new(config),
            shutdown_tx,
            counters: Counters::default(),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Get the underlying source
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Get a shutdown receiver
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Signal shutdown. The loop stops before reading the next entry.
    pub fn shutdown(&self) {
        info!("Signaling consumer shutdown");
        self.shutdown_tx.send_replace(true);
    }

    /// Current counters
    pub fn stats(&self) -> ConsumerStats {
        ConsumerStats {
            processed: self.counters.processed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            acked: self.counters.acked.load(Ordering::Relaxed),
            read_errors: self.counters.read_errors.load(Ordering::Relaxed),
        }
    }

    /// Ensure the group exists, then consume entries until shutdown
    #[instrument(skip(self, handler), fields(stream = %self.config.stream, group = %self.config.group))]
    pub async fn run<H: MessageHandler + ?Sized>(&self, handler: Arc<H>) -> Result<(), ConsumerError> {
        let mut shutdown_rx = self.shutdown_receiver();

        loop {
            let setup = tokio::select! {
                result = self.source.ensure_group() => result,
                _ = wait_for_shutdown(&mut shutdown_rx) => {
                    info!("Shutdown requested before consumer group setup finished");
                    return Ok(());
                }
            };
            match setup {
                Ok(()) => break,
                Err(e) => {
                    metrics::counter!("pipeline.setup.errors").increment(1);
                    error!(error = %e, "Consumer group setup failed, retrying");
                    if self.pause(&mut shutdown_rx).await {
                        return Ok(());
                    }
                }
            }
        }

        info!(
            consumer = %self.config.consumer_name,
            ack_policy = ?self.config.ack_policy,
            "Starting entry consumption loop"
        );

        loop {
            if *shutdown_rx.borrow() {
                info!("Received shutdown signal");
                break;
            }

            match self.source.read_next(self.config.block_timeout()).await {
                Ok(Some(entry)) => self.process_entry(&entry, handler.as_ref()).await,
                Ok(None) => continue,
                Err(e) => {
                    self.counters.read_errors.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("pipeline.read.errors").increment(1);
                    error!(error = %e, "Stream read failed, retrying");
                    if self.pause(&mut shutdown_rx).await {
                        break;
                    }
                }
            }
        }

        info!(stats = ?self.stats(), "Consumer stopped");
        Ok(())
    }

    /// Sleep for the retry delay. Returns true when shutdown was signalled.
    async fn pause(&self, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
        if *shutdown_rx.borrow() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(self.config.read_retry_delay()) => {}
            _ = shutdown_rx.changed() => {}
        }
        let stop = *shutdown_rx.borrow();
        stop
    }

    #[instrument(skip(self, entry, handler), fields(entry_id = %entry.id, entry_type = ?entry.entry_type()))]
    async fn process_entry<H: MessageHandler + ?Sized>(&self, entry: &StreamEntry, handler: &H) {
        debug!("Received stream entry");

        let handled_ok = match handler.handle(entry).await {
            Ok(()) => {
                self.counters.processed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("pipeline.entries.processed").increment(1);
                true
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("pipeline.entries.failed").increment(1);
                handler.on_error(entry, &e).await;
                false
            }
        };

        if !self.config.ack_policy.should_ack(handled_ok) {
            debug!("Leaving failed entry pending");
            return;
        }

        // Ack failures are not retried; the entry stays pending and may be
        // processed again.
        match self.source.ack(&entry.id).await {
            Ok(()) => {
                self.counters.acked.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("pipeline.entries.acked").increment(1);
            }
            Err(e) => warn!(error = %e, "Failed to acknowledge entry"),
        }
    }
}

/// Resolves once shutdown has been signalled
async fn wait_for_shutdown(shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
