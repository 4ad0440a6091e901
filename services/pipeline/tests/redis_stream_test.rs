//! Redis Streams integration tests for the consumer source and producer.
//!
//! Run with: `cargo test -p tradebidz-pipeline --test redis_stream_test -- --ignored`
//! Requires Docker for testcontainers (Redis).

use redis::streams::StreamPendingReply;
use redis::AsyncCommands;
use std::time::Duration;
use testcontainers::clients::Cli;
use testcontainers::core::WaitFor;
use testcontainers::{Container, GenericImage};
use tradebidz_pipeline::{
    NotificationEvent, ParsedEvent, RedisStreamSource, StreamConfig, StreamProducer, StreamSource,
};

const REDIS_PORT: u16 = 6379;
const BLOCK: Duration = Duration::from_secs(2);

fn start_redis(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("redis", "7-alpine")
        .with_exposed_port(REDIS_PORT)
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"));
    docker.run(image)
}

fn stream_config(port: u16, stream: &str) -> StreamConfig {
    StreamConfig {
        stream: stream.to_string(),
        ..StreamConfig::new(format!("redis://127.0.0.1:{}", port))
    }
}

async fn raw_connection(config: &StreamConfig) -> redis::aio::MultiplexedConnection {
    redis::Client::open(config.redis_url.as_str())
        .expect("valid redis url")
        .get_multiplexed_async_connection()
        .await
        .expect("Failed to connect to test Redis")
}

async fn pending_count(conn: &mut redis::aio::MultiplexedConnection, config: &StreamConfig) -> usize {
    let reply: StreamPendingReply = conn
        .xpending(&config.stream, &config.group)
        .await
        .expect("XPENDING failed");
    reply.count()
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_group_starts_at_tail_and_ack_clears_pending() {
    let docker = Cli::default();
    let container = start_redis(&docker);
    let config = stream_config(container.get_host_port_ipv4(REDIS_PORT), "notifications_tail");
    let mut conn = raw_connection(&config).await;

    // Appended before the group exists; the worker must never see it
    let _: String = conn
        .xadd(&config.stream, "*", &[("type", "AUCTION_FAIL"), ("seller_email", "old@x.com")])
        .await
        .unwrap();

    let source = RedisStreamSource::new(&config).unwrap();
    source.ensure_group().await.unwrap();
    // BUSYGROUP on the second call is not an error
    source.ensure_group().await.unwrap();

    assert_eq!(source.read_next(Duration::from_millis(200)).await.unwrap(), None);

    let id: String = conn
        .xadd(&config.stream, "*", &[("type", "AUCTION_FAIL"), ("seller_email", "new@x.com")])
        .await
        .unwrap();

    let entry = source.read_next(BLOCK).await.unwrap().expect("new entry delivered");
    assert_eq!(entry.id, id);
    assert_eq!(entry.field("seller_email"), Some("new@x.com"));

    assert_eq!(pending_count(&mut conn, &config).await, 1);
    source.ack(&entry.id).await.unwrap();
    assert_eq!(pending_count(&mut conn, &config).await, 0);

    assert_eq!(source.read_next(Duration::from_millis(200)).await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_entries_are_delivered_one_at_a_time_in_order() {
    let docker = Cli::default();
    let container = start_redis(&docker);
    let config = stream_config(container.get_host_port_ipv4(REDIS_PORT), "notifications_order");

    // Group creation also creates the missing stream
    let source = RedisStreamSource::new(&config).unwrap();
    source.ensure_group().await.unwrap();

    let producer = StreamProducer::connect(config.clone()).await.unwrap();
    let first = NotificationEvent::AuctionFail {
        seller_email: "s@x.com".to_string(),
        product_name: "Watch".to_string(),
    };
    let second = NotificationEvent::VerifyEmail {
        email: "u@x.com".to_string(),
        otp: "123456".to_string(),
    };
    let first_id = producer.publish(&first).await.unwrap().id;
    let second_id = producer.publish(&second).await.unwrap().id;

    let entry = source.read_next(BLOCK).await.unwrap().expect("first entry");
    assert_eq!(entry.id, first_id);
    assert_eq!(
        NotificationEvent::from_fields(&entry.fields).unwrap(),
        ParsedEvent::Known(first)
    );

    let mut conn = raw_connection(&config).await;
    assert_eq!(pending_count(&mut conn, &config).await, 1);

    let entry = source.read_next(BLOCK).await.unwrap().expect("second entry");
    assert_eq!(entry.id, second_id);
    assert_eq!(
        NotificationEvent::from_fields(&entry.fields).unwrap(),
        ParsedEvent::Known(second)
    );
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_non_utf8_field_is_dropped() {
    let docker = Cli::default();
    let container = start_redis(&docker);
    let config = stream_config(container.get_host_port_ipv4(REDIS_PORT), "notifications_binary");

    let source = RedisStreamSource::new(&config).unwrap();
    source.ensure_group().await.unwrap();

    let mut conn = raw_connection(&config).await;
    let fields: Vec<(&str, Vec<u8>)> = vec![
        ("type", b"AUCTION_FAIL".to_vec()),
        ("seller_email", vec![0xff, 0xfe]),
        ("product_name", b"Watch".to_vec()),
    ];
    let _: String = conn.xadd(&config.stream, "*", &fields).await.unwrap();

    let entry = source.read_next(BLOCK).await.unwrap().expect("entry delivered");
    assert_eq!(entry.entry_type(), Some("AUCTION_FAIL"));
    assert_eq!(entry.field("seller_email"), None);
    assert_eq!(entry.field("product_name"), Some("Watch"));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_observer_group_does_not_consume_worker_entries() {
    let docker = Cli::default();
    let container = start_redis(&docker);
    let worker_config = stream_config(container.get_host_port_ipv4(REDIS_PORT), "notifications_observed");
    let observer_config = worker_config.observer();

    let worker = RedisStreamSource::new(&worker_config).unwrap();
    let observer = RedisStreamSource::new(&observer_config).unwrap();
    worker.ensure_group().await.unwrap();
    observer.ensure_group().await.unwrap();

    let mut conn = raw_connection(&worker_config).await;
    let id: String = conn
        .xadd(&worker_config.stream, "*", &[("type", "AUCTION_FAIL")])
        .await
        .unwrap();

    let seen = observer.read_next(BLOCK).await.unwrap().expect("observer sees entry");
    observer.ack(&seen.id).await.unwrap();

    let delivered = worker.read_next(BLOCK).await.unwrap().expect("worker still gets entry");
    assert_eq!(delivered.id, id);
}
