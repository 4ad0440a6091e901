//! TradeBidz Pipeline - Redis Streams notification pipeline
//!
//! This library provides the queue boundary shared by the services that raise
//! notifications and the worker that delivers them:
//!
//! - The typed notification event contract ([`NotificationEvent`])
//! - A consumer-group consumer with an explicit acknowledgment policy
//! - A producer that appends events to the notification stream
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tradebidz_pipeline::prelude::*;
//!
//! struct LogHandler;
//!
//! #[async_trait]
//! impl MessageHandler for LogHandler {
//!     async fn handle(&self, entry: &StreamEntry) -> Result<(), ConsumerError> {
//!         println!("{} {:?}", entry.id, entry.entry_type());
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = StreamConfig::from_env()?;
//!     let source = RedisStreamSource::new(&config)?;
//!     let consumer = StreamConsumer::new(source, config);
//!     consumer.run(Arc::new(LogHandler)).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod consumer;
pub mod events;
pub mod producer;

// Re-export main types
pub use config::{AckPolicy, ConfigError, StreamConfig};
pub use consumer::{
    ConsumerError, ConsumerStats, MessageHandler, RedisStreamSource, StreamConsumer, StreamEntry,
    StreamSource,
};
pub use events::{EventKind, EventParseError, NotificationEvent, ParsedEvent};
pub use producer::{DeliveryResult, OutgoingEntry, ProducerError, StreamProducer};

/// Async trait for message handlers (re-export for convenience)
pub use async_trait::async_trait;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::async_trait;
    pub use crate::config::{AckPolicy, StreamConfig};
    pub use crate::consumer::{
        ConsumerError, MessageHandler, RedisStreamSource, StreamConsumer, StreamEntry,
    };
    pub use crate::events::{EventKind, NotificationEvent, ParsedEvent};
    pub use crate::producer::{OutgoingEntry, StreamProducer};
}
