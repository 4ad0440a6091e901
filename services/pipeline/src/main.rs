//! TradeBidz Pipeline - notification stream operator tool
//!
//! This binary uses the pipeline library to:
//! - Append hand-written notification events to the stream
//! - Tail the stream through a dedicated observer group and log what arrives

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use tradebidz_pipeline::prelude::*;

/// Handler that validates and logs every entry without acting on it
struct TailHandler;

#[async_trait]
impl MessageHandler for TailHandler {
    async fn handle(&self, entry: &StreamEntry) -> Result<(), ConsumerError> {
        match NotificationEvent::from_fields(&entry.fields) {
            Ok(ParsedEvent::Known(event)) => {
                info!(entry_id = %entry.id, event = ?event, "Received notification event");
                Ok(())
            }
            Ok(ParsedEvent::Unknown(event_type)) => {
                warn!(entry_id = %entry.id, event_type = %event_type, "Received unknown event type");
                Ok(())
            }
            Err(e) => Err(ConsumerError::ProcessingError(e.to_string())),
        }
    }
}

/// Append one event built from `key=value` arguments
async fn run_publish(config: StreamConfig, event_type: &str, pairs: &[String]) -> Result<()> {
    let kind: EventKind = event_type
        .parse()
        .with_context(|| format!("Refusing to publish unknown event type {}", event_type))?;

    let entry = OutgoingEntry::from_pairs(pairs.iter().map(String::as_str))
        .map_err(anyhow::Error::msg)?;
    let mut fields: HashMap<String, String> = entry.fields.into_iter().collect();
    fields.insert("type".to_string(), kind.as_str().to_string());

    // Validate against the contract before anything reaches the stream
    let event = match NotificationEvent::from_fields(&fields)? {
        ParsedEvent::Known(event) => event,
        ParsedEvent::Unknown(other) => bail!("Unknown event type {}", other),
    };

    let producer = StreamProducer::connect(config).await?;
    let result = producer.publish(&event).await?;

    info!(stream = %result.stream, entry_id = %result.id, event_type = %kind, "Event published");
    Ok(())
}

/// Log new entries until Ctrl+C without touching the worker group
async fn run_tail(config: StreamConfig) -> Result<()> {
    let config = config.observer();
    info!(group = %config.group, "Starting stream tail");

    let source = RedisStreamSource::new(&config)?;
    let consumer = Arc::new(StreamConsumer::new(source, config));

    let shutdown_consumer = consumer.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, shutting down...");
        shutdown_consumer.shutdown();
    });

    consumer.run(Arc::new(TailHandler)).await?;

    info!(stats = ?consumer.stats(), "Tail finished");
    Ok(())
}

fn print_usage() {
    println!("Usage: pipeline [publish <TYPE> key=value... | tail]");
    println!();
    println!("Modes:");
    println!("  publish - Append a notification event to the stream");
    println!("  tail    - Log new entries through the <group>-tail observer group");
    println!();
    println!("Event types:");
    for kind in EventKind::ALL {
        println!("  {}", kind);
    }
    println!();
    println!("Environment variables:");
    println!("  REDIS_URL              - Redis URL (default: redis://localhost:6379)");
    println!("  NOTIFICATION_STREAM    - Stream key (default: notification_stream)");
    println!("  NOTIFICATION_GROUP     - Consumer group (default: email_workers)");
    println!("  NOTIFICATION_CONSUMER  - Consumer name (default: worker_1)");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = StreamConfig::from_env()?;
    info!(redis = %config.redis_url, stream = %config.stream, "TradeBidz Pipeline");

    let args: Vec<String> = std::env::args().collect();
    let mode = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    match mode {
        "publish" => {
            let Some(event_type) = args.get(2) else {
                print_usage();
                bail!("publish requires an event type");
            };
            if let Err(e) = run_publish(config, event_type, &args[3..]).await {
                error!(error = %e, "Publish failed");
                return Err(e);
            }
        }
        "tail" => run_tail(config).await?,
        _ => print_usage(),
    }

    Ok(())
}
