use super::mailer::EmailSender;
use super::templates::{render, OutboundEmail};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tradebidz_pipeline::{ConsumerError, MessageHandler, NotificationEvent, ParsedEvent, StreamEntry};
use tracing::{debug, error, info, instrument, warn};

/// Outcome of dispatching one event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Sends started
    pub attempted: usize,
    /// Sends that errored or timed out
    pub failed: usize,
}

impl DispatchReport {
    pub fn all_delivered(&self) -> bool {
        self.failed == 0
    }
}

/// Turns notification stream entries into outbound emails
pub struct NotificationDispatcher {
    sender: Arc<dyn EmailSender>,
    send_timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(sender: Arc<dyn EmailSender>, send_timeout: Duration) -> Self {
        Self {
            sender,
            send_timeout,
        }
    }

    /// Parse a raw entry and dispatch it.
    ///
    /// Entries that fail to parse, and unknown event types, are logged and
    /// produce no sends.
    #[instrument(skip(self, entry), fields(entry_id = %entry.id))]
    pub async fn dispatch_entry(&self, entry: &StreamEntry) -> DispatchReport {
        match NotificationEvent::from_fields(&entry.fields) {
            Ok(ParsedEvent::Known(event)) => self.dispatch(&event).await,
            Ok(ParsedEvent::Unknown(event_type)) => {
                warn!(event_type = %event_type, "Ignoring unknown notification type");
                metrics::counter!("notifications.unknown_type").increment(1);
                DispatchReport::default()
            }
            Err(e) => {
                warn!(
                    error = %e,
                    event_type = ?entry.entry_type(),
                    field = e.field(),
                    "Skipping malformed notification event"
                );
                metrics::counter!("notifications.parse_errors").increment(1);
                DispatchReport::default()
            }
        }
    }

    /// Render an event and send each email in turn
    pub async fn dispatch(&self, event: &NotificationEvent) -> DispatchReport {
        let emails = render(event);
        info!(
            event_type = %event.kind(),
            recipients = emails.len(),
            "Dispatching notification"
        );

        let mut report = DispatchReport::default();
        for email in &emails {
            report.attempted += 1;
            if !self.send_one(email).await {
                report.failed += 1;
            }
        }
        report
    }

    async fn send_one(&self, email: &OutboundEmail) -> bool {
        match tokio::time::timeout(self.send_timeout, self.sender.send(email)).await {
            Ok(Ok(())) => {
                debug!(to = %email.to, subject = %email.subject, "Email sent");
                metrics::counter!("notifications.sent").increment(1);
                true
            }
            Ok(Err(e)) => {
                error!(to = %email.to, error = %e, "Failed to send email");
                metrics::counter!("notifications.failed").increment(1);
                false
            }
            Err(_) => {
                error!(to = %email.to, timeout = ?self.send_timeout, "Email send timed out");
                metrics::counter!("notifications.failed").increment(1);
                false
            }
        }
    }
}

#[async_trait]
impl MessageHandler for NotificationDispatcher {
    async fn handle(&self, entry: &StreamEntry) -> Result<(), ConsumerError> {
        let report = self.dispatch_entry(entry).await;
        if report.all_delivered() {
            Ok(())
        } else {
            Err(ConsumerError::ProcessingError(format!(
                "{} of {} emails failed",
                report.failed, report.attempted
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::mailer::{MailerError, MockEmailSender};
    use std::collections::HashMap;

    fn entry(pairs: &[(&str, &str)]) -> StreamEntry {
        let fields: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        StreamEntry::new("1700000000000-0", fields)
    }

    fn dispatcher(sender: MockEmailSender) -> NotificationDispatcher {
        NotificationDispatcher::new(Arc::new(sender), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_unknown_type_sends_nothing() {
        let mut sender = MockEmailSender::new();
        sender.expect_send().never();

        let report = dispatcher(sender)
            .dispatch_entry(&entry(&[("type", "PRICE_DROP"), ("email", "a@x.com")]))
            .await;

        assert_eq!(report, DispatchReport::default());
    }

    #[tokio::test]
    async fn test_missing_type_is_handled() {
        let mut sender = MockEmailSender::new();
        sender.expect_send().never();

        let result = dispatcher(sender).handle(&entry(&[("email", "a@x.com")])).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_malformed_recipients_sends_nothing() {
        let mut sender = MockEmailSender::new();
        sender.expect_send().never();

        let report = dispatcher(sender)
            .dispatch_entry(&entry(&[
                ("type", "NEW_ANSWER"),
                ("emails", "not json"),
                ("product_name", "Lamp"),
                ("question", "q"),
                ("answer", "a"),
            ]))
            .await;

        assert_eq!(report.attempted, 0);
    }

    #[tokio::test]
    async fn test_bid_rejected_without_reason_is_skipped() {
        let mut sender = MockEmailSender::new();
        sender.expect_send().never();

        let dispatcher = dispatcher(sender);
        let rejected = entry(&[
            ("type", "BID_REJECTED"),
            ("bidder_email", "b@x.com"),
            ("product_name", "Watch"),
            ("new_price", "150"),
        ]);

        assert_eq!(dispatcher.dispatch_entry(&rejected).await, DispatchReport::default());
        assert!(dispatcher.handle(&rejected).await.is_ok());
    }

    #[tokio::test]
    async fn test_bid_placed_without_previous_bidder() {
        let mut sender = MockEmailSender::new();
        sender.expect_send().times(2).returning(|_| Ok(()));

        let report = dispatcher(sender)
            .dispatch_entry(&entry(&[
                ("type", "BID_PLACED"),
                ("product_name", "Watch"),
                ("new_price", "120"),
                ("seller_email", "s@x.com"),
                ("bidder_email", "b@x.com"),
                ("prev_bidder_email", ""),
            ]))
            .await;

        assert_eq!(report.attempted, 2);
        assert!(report.all_delivered());
    }

    #[tokio::test]
    async fn test_bid_placed_with_previous_bidder() {
        let mut sender = MockEmailSender::new();
        sender.expect_send().times(3).returning(|_| Ok(()));

        let report = dispatcher(sender)
            .dispatch_entry(&entry(&[
                ("type", "BID_PLACED"),
                ("product_name", "Watch"),
                ("new_price", "120"),
                ("seller_email", "s@x.com"),
                ("bidder_email", "b@x.com"),
                ("prev_bidder_email", "p@x.com"),
            ]))
            .await;

        assert_eq!(report.attempted, 3);
    }

    #[tokio::test]
    async fn test_new_answer_failure_does_not_stop_siblings() {
        let mut sender = MockEmailSender::new();
        sender
            .expect_send()
            .withf(|email| email.to == "a@x.com")
            .times(1)
            .returning(|_| Err(MailerError::Smtp("connection reset".to_string())));
        sender
            .expect_send()
            .withf(|email| email.to == "b@x.com")
            .times(1)
            .returning(|_| Ok(()));

        let dispatcher = dispatcher(sender);
        let event = entry(&[
            ("type", "NEW_ANSWER"),
            ("emails", r#"["a@x.com","b@x.com"]"#),
            ("product_name", "Lamp"),
            ("question", "Is it new?"),
            ("answer", "Yes"),
        ]);

        let report = dispatcher.dispatch_entry(&event).await;
        assert_eq!(report, DispatchReport { attempted: 2, failed: 1 });
    }

    #[tokio::test]
    async fn test_partial_failure_reported_to_consumer() {
        let mut sender = MockEmailSender::new();
        sender
            .expect_send()
            .returning(|_| Err(MailerError::Request("timeout".to_string())));

        let result = dispatcher(sender)
            .handle(&entry(&[
                ("type", "AUCTION_FAIL"),
                ("seller_email", "s@x.com"),
                ("product_name", "Watch"),
            ]))
            .await;

        assert!(matches!(result, Err(ConsumerError::ProcessingError(_))));
    }

    #[tokio::test]
    async fn test_auction_fail_scenario() {
        let mut sender = MockEmailSender::new();
        sender
            .expect_send()
            .withf(|email| {
                email.to == "s@x.com" && email.subject == "Auction Ended - No Bids Received"
            })
            .times(1)
            .returning(|_| Ok(()));

        let report = dispatcher(sender)
            .dispatch_entry(&entry(&[
                ("type", "AUCTION_FAIL"),
                ("seller_email", "s@x.com"),
                ("product_name", "Watch"),
            ]))
            .await;

        assert_eq!(report, DispatchReport { attempted: 1, failed: 0 });
    }

    struct HangingSender;

    #[async_trait]
    impl EmailSender for HangingSender {
        async fn send(&self, email: &OutboundEmail) -> Result<(), MailerError> {
            if email.to == "slow@x.com" {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_hung_send_times_out_and_siblings_continue() {
        let dispatcher =
            NotificationDispatcher::new(Arc::new(HangingSender), Duration::from_millis(50));

        let report = dispatcher
            .dispatch(&NotificationEvent::NewAnswer {
                emails: vec!["slow@x.com".to_string(), "fast@x.com".to_string()],
                product_name: "Lamp".to_string(),
                question: "q".to_string(),
                answer: "a".to_string(),
            })
            .await;

        assert_eq!(report, DispatchReport { attempted: 2, failed: 1 });
    }
}
