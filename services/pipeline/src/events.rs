//! Notification event contract.
//!
//! Every entry on the notification stream is a flat string-to-string map with
//! a `type` discriminator. This module turns that map into a strongly typed
//! [`NotificationEvent`] exactly once, at the queue boundary, and back into
//! the flat map for producers.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Field holding the event discriminator
pub const TYPE_FIELD: &str = "type";

/// Wire discriminator of a notification event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    VerifyEmail,
    ResetPassword,
    BidPlaced,
    BidRejected,
    AuctionSuccess,
    AuctionFail,
    NewQuestion,
    NewAnswer,
    DescriptionUpdate,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        EventKind::VerifyEmail,
        EventKind::ResetPassword,
        EventKind::BidPlaced,
        EventKind::BidRejected,
        EventKind::AuctionSuccess,
        EventKind::AuctionFail,
        EventKind::NewQuestion,
        EventKind::NewAnswer,
        EventKind::DescriptionUpdate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::VerifyEmail => "VERIFY_EMAIL",
            EventKind::ResetPassword => "RESET_PASSWORD",
            EventKind::BidPlaced => "BID_PLACED",
            EventKind::BidRejected => "BID_REJECTED",
            EventKind::AuctionSuccess => "AUCTION_SUCCESS",
            EventKind::AuctionFail => "AUCTION_FAIL",
            EventKind::NewQuestion => "NEW_QUESTION",
            EventKind::NewAnswer => "NEW_ANSWER",
            EventKind::DescriptionUpdate => "DESCRIPTION_UPDATE",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a discriminator is not one of the known event types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

/// Errors produced while validating a stream entry against the event contract
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventParseError {
    #[error("entry has no 'type' field")]
    MissingType,

    #[error("{kind} event is missing required field '{field}'")]
    MissingField { kind: EventKind, field: &'static str },

    #[error("{kind} event has an invalid 'emails' field: {reason}")]
    InvalidRecipients { kind: EventKind, reason: String },
}

impl EventParseError {
    /// Entry field the error is about
    pub fn field(&self) -> &'static str {
        match self {
            EventParseError::MissingType => TYPE_FIELD,
            EventParseError::MissingField { field, .. } => *field,
            EventParseError::InvalidRecipients { .. } => "emails",
        }
    }
}

/// A validated notification event, one variant per wire type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    VerifyEmail {
        email: String,
        otp: String,
    },
    ResetPassword {
        email: String,
        otp: String,
    },
    BidPlaced {
        product_name: String,
        new_price: String,
        seller_email: String,
        bidder_email: String,
        prev_bidder_email: Option<String>,
        product_id: Option<String>,
    },
    BidRejected {
        bidder_email: String,
        product_name: String,
        reason: String,
    },
    AuctionSuccess {
        seller_email: String,
        winner_email: String,
        product_name: String,
        price: String,
        product_id: Option<String>,
        seller_name: Option<String>,
        winner_name: Option<String>,
        winner_address: Option<String>,
    },
    AuctionFail {
        seller_email: String,
        product_name: String,
    },
    NewQuestion {
        seller_email: String,
        product_name: String,
        question: String,
        product_url: String,
    },
    NewAnswer {
        emails: Vec<String>,
        product_name: String,
        question: String,
        answer: String,
    },
    DescriptionUpdate {
        emails: Vec<String>,
        product_name: String,
        description: String,
        product_url: String,
    },
}

/// Outcome of reading the discriminator of an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedEvent {
    /// A known event type whose fields validated
    Known(NotificationEvent),
    /// A discriminator outside the known set; carries the raw value
    Unknown(String),
}

struct FieldReader<'a> {
    kind: EventKind,
    fields: &'a HashMap<String, String>,
}

impl<'a> FieldReader<'a> {
    fn required(&self, field: &'static str) -> Result<String, EventParseError> {
        match self.fields.get(field) {
            Some(value) if !value.is_empty() => Ok(value.clone()),
            _ => Err(EventParseError::MissingField {
                kind: self.kind,
                field,
            }),
        }
    }

    /// Producers send an empty string for "no value", so empty maps to None
    fn optional(&self, field: &str) -> Option<String> {
        self.fields
            .get(field)
            .filter(|value| !value.is_empty())
            .cloned()
    }

    fn recipients(&self) -> Result<Vec<String>, EventParseError> {
        let raw = self.required("emails")?;
        serde_json::from_str::<Vec<String>>(&raw).map_err(|e| {
            EventParseError::InvalidRecipients {
                kind: self.kind,
                reason: e.to_string(),
            }
        })
    }
}

impl NotificationEvent {
    /// Parse and validate a flat stream entry
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<ParsedEvent, EventParseError> {
        let raw_type = fields.get(TYPE_FIELD).ok_or(EventParseError::MissingType)?;

        let kind = match raw_type.parse::<EventKind>() {
            Ok(kind) => kind,
            Err(UnknownEventKind(raw)) => return Ok(ParsedEvent::Unknown(raw)),
        };

        let r = FieldReader { kind, fields };

        let event = match kind {
            EventKind::VerifyEmail => NotificationEvent::VerifyEmail {
                email: r.required("email")?,
                otp: r.required("otp")?,
            },
            EventKind::ResetPassword => NotificationEvent::ResetPassword {
                email: r.required("email")?,
                otp: r.required("otp")?,
            },
            EventKind::BidPlaced => NotificationEvent::BidPlaced {
                product_name: r.required("product_name")?,
                new_price: r.required("new_price")?,
                seller_email: r.required("seller_email")?,
                bidder_email: r.required("bidder_email")?,
                prev_bidder_email: r.optional("prev_bidder_email"),
                product_id: r.optional("product_id"),
            },
            EventKind::BidRejected => NotificationEvent::BidRejected {
                bidder_email: r.required("bidder_email")?,
                product_name: r.required("product_name")?,
                reason: r.required("reason")?,
            },
            EventKind::AuctionSuccess => NotificationEvent::AuctionSuccess {
                seller_email: r.required("seller_email")?,
                winner_email: r.required("winner_email")?,
                product_name: r.required("product_name")?,
                price: r.required("price")?,
                product_id: r.optional("product_id"),
                seller_name: r.optional("seller_name"),
                winner_name: r.optional("winner_name"),
                winner_address: r.optional("winner_address"),
            },
            EventKind::AuctionFail => NotificationEvent::AuctionFail {
                seller_email: r.required("seller_email")?,
                product_name: r.required("product_name")?,
            },
            EventKind::NewQuestion => NotificationEvent::NewQuestion {
                seller_email: r.required("seller_email")?,
                product_name: r.required("product_name")?,
                question: r.required("question")?,
                product_url: r.required("product_url")?,
            },
            EventKind::NewAnswer => NotificationEvent::NewAnswer {
                emails: r.recipients()?,
                product_name: r.required("product_name")?,
                question: r.required("question")?,
                answer: r.required("answer")?,
            },
            EventKind::DescriptionUpdate => NotificationEvent::DescriptionUpdate {
                emails: r.recipients()?,
                product_name: r.required("product_name")?,
                description: r.required("description")?,
                product_url: r.required("product_url")?,
            },
        };

        Ok(ParsedEvent::Known(event))
    }

    /// The wire discriminator of this event
    pub fn kind(&self) -> EventKind {
        match self {
            NotificationEvent::VerifyEmail { .. } => EventKind::VerifyEmail,
            NotificationEvent::ResetPassword { .. } => EventKind::ResetPassword,
            NotificationEvent::BidPlaced { .. } => EventKind::BidPlaced,
            NotificationEvent::BidRejected { .. } => EventKind::BidRejected,
            NotificationEvent::AuctionSuccess { .. } => EventKind::AuctionSuccess,
            NotificationEvent::AuctionFail { .. } => EventKind::AuctionFail,
            NotificationEvent::NewQuestion { .. } => EventKind::NewQuestion,
            NotificationEvent::NewAnswer { .. } => EventKind::NewAnswer,
            NotificationEvent::DescriptionUpdate { .. } => EventKind::DescriptionUpdate,
        }
    }

    /// Flatten the event into the field pairs appended to the stream.
    /// Optional fields are omitted when absent.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![(TYPE_FIELD.to_string(), self.kind().as_str().to_string())];
        let mut put = |key: &str, value: &str| fields.push((key.to_string(), value.to_string()));

        match self {
            NotificationEvent::VerifyEmail { email, otp }
            | NotificationEvent::ResetPassword { email, otp } => {
                put("email", email);
                put("otp", otp);
            }
            NotificationEvent::BidPlaced {
                product_name,
                new_price,
                seller_email,
                bidder_email,
                prev_bidder_email,
                product_id,
            } => {
                put("product_name", product_name);
                put("new_price", new_price);
                put("seller_email", seller_email);
                put("bidder_email", bidder_email);
                if let Some(prev) = prev_bidder_email {
                    put("prev_bidder_email", prev);
                }
                if let Some(id) = product_id {
                    put("product_id", id);
                }
            }
            NotificationEvent::BidRejected {
                bidder_email,
                product_name,
                reason,
            } => {
                put("bidder_email", bidder_email);
                put("product_name", product_name);
                put("reason", reason);
            }
            NotificationEvent::AuctionSuccess {
                seller_email,
                winner_email,
                product_name,
                price,
                product_id,
                seller_name,
                winner_name,
                winner_address,
            } => {
                put("seller_email", seller_email);
                put("winner_email", winner_email);
                put("product_name", product_name);
                put("price", price);
                for (key, value) in [
                    ("product_id", product_id),
                    ("seller_name", seller_name),
                    ("winner_name", winner_name),
                    ("winner_address", winner_address),
                ] {
                    if let Some(value) = value {
                        put(key, value);
                    }
                }
            }
            NotificationEvent::AuctionFail {
                seller_email,
                product_name,
            } => {
                put("seller_email", seller_email);
                put("product_name", product_name);
            }
            NotificationEvent::NewQuestion {
                seller_email,
                product_name,
                question,
                product_url,
            } => {
                put("seller_email", seller_email);
                put("product_name", product_name);
                put("question", question);
                put("product_url", product_url);
            }
            NotificationEvent::NewAnswer {
                emails,
                product_name,
                question,
                answer,
            } => {
                put("emails", &encode_recipients(emails));
                put("product_name", product_name);
                put("question", question);
                put("answer", answer);
            }
            NotificationEvent::DescriptionUpdate {
                emails,
                product_name,
                description,
                product_url,
            } => {
                put("emails", &encode_recipients(emails));
                put("product_name", product_name);
                put("description", description);
                put("product_url", product_url);
            }
        }

        fields
    }
}

fn encode_recipients(emails: &[String]) -> String {
    // Serializing a slice of strings cannot fail
    serde_json::to_string(emails).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_auction_fail() {
        let entry = fields(&[
            ("type", "AUCTION_FAIL"),
            ("seller_email", "s@x.com"),
            ("product_name", "Watch"),
        ]);

        let parsed = NotificationEvent::from_fields(&entry).unwrap();
        assert_eq!(
            parsed,
            ParsedEvent::Known(NotificationEvent::AuctionFail {
                seller_email: "s@x.com".to_string(),
                product_name: "Watch".to_string(),
            })
        );
    }

    #[test]
    fn test_missing_type() {
        let entry = fields(&[("email", "a@x.com")]);
        assert_eq!(
            NotificationEvent::from_fields(&entry),
            Err(EventParseError::MissingType)
        );
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        let entry = fields(&[("type", "ORDER_SHIPPED"), ("email", "a@x.com")]);
        assert_eq!(
            NotificationEvent::from_fields(&entry),
            Ok(ParsedEvent::Unknown("ORDER_SHIPPED".to_string()))
        );
    }

    #[test]
    fn test_missing_required_field_is_reported() {
        let entry = fields(&[("type", "VERIFY_EMAIL"), ("email", "a@x.com")]);
        assert_eq!(
            NotificationEvent::from_fields(&entry),
            Err(EventParseError::MissingField {
                kind: EventKind::VerifyEmail,
                field: "otp",
            })
        );
    }

    #[test]
    fn test_bid_rejected_without_reason_names_the_field() {
        // Shape sent by producers that report the rejected price instead
        let entry = fields(&[
            ("type", "BID_REJECTED"),
            ("bidder_email", "b@x.com"),
            ("product_name", "Watch"),
            ("new_price", "150"),
        ]);
        let err = NotificationEvent::from_fields(&entry).unwrap_err();
        assert_eq!(err.field(), "reason");
        assert_eq!(
            err.to_string(),
            "BID_REJECTED event is missing required field 'reason'"
        );
    }

    #[test]
    fn test_parse_error_fields() {
        assert_eq!(EventParseError::MissingType.field(), "type");
        let err = EventParseError::InvalidRecipients {
            kind: EventKind::NewAnswer,
            reason: "expected value".to_string(),
        };
        assert_eq!(err.field(), "emails");
    }

    #[test]
    fn test_empty_required_field_is_missing() {
        let entry = fields(&[
            ("type", "AUCTION_FAIL"),
            ("seller_email", ""),
            ("product_name", "Watch"),
        ]);
        assert!(matches!(
            NotificationEvent::from_fields(&entry),
            Err(EventParseError::MissingField { field: "seller_email", .. })
        ));
    }

    #[test]
    fn test_bid_placed_empty_prev_bidder_is_none() {
        let entry = fields(&[
            ("type", "BID_PLACED"),
            ("product_id", "42"),
            ("product_name", "Watch"),
            ("new_price", "150"),
            ("seller_email", "s@x.com"),
            ("bidder_email", "b@x.com"),
            ("prev_bidder_email", ""),
        ]);

        match NotificationEvent::from_fields(&entry).unwrap() {
            ParsedEvent::Known(NotificationEvent::BidPlaced {
                prev_bidder_email,
                product_id,
                ..
            }) => {
                assert_eq!(prev_bidder_email, None);
                assert_eq!(product_id.as_deref(), Some("42"));
            }
            other => panic!("unexpected parse result: {:?}", other),
        }
    }

    #[test]
    fn test_auction_success_reduced_revision() {
        let entry = fields(&[
            ("type", "AUCTION_SUCCESS"),
            ("product_name", "Watch"),
            ("price", "300"),
            ("seller_email", "s@x.com"),
            ("winner_email", "w@x.com"),
        ]);

        match NotificationEvent::from_fields(&entry).unwrap() {
            ParsedEvent::Known(NotificationEvent::AuctionSuccess {
                winner_name,
                winner_address,
                ..
            }) => {
                assert!(winner_name.is_none());
                assert!(winner_address.is_none());
            }
            other => panic!("unexpected parse result: {:?}", other),
        }
    }

    #[test]
    fn test_new_answer_recipients() {
        let entry = fields(&[
            ("type", "NEW_ANSWER"),
            ("emails", r#"["a@x.com","b@x.com"]"#),
            ("product_name", "Watch"),
            ("question", "Is it new?"),
            ("answer", "Yes"),
        ]);

        match NotificationEvent::from_fields(&entry).unwrap() {
            ParsedEvent::Known(NotificationEvent::NewAnswer { emails, .. }) => {
                assert_eq!(emails, vec!["a@x.com", "b@x.com"]);
            }
            other => panic!("unexpected parse result: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_recipients() {
        let entry = fields(&[
            ("type", "DESCRIPTION_UPDATE"),
            ("emails", "a@x.com,b@x.com"),
            ("product_name", "Watch"),
            ("description", "Now with box"),
            ("product_url", "https://tradebidz.example/p/1"),
        ]);

        assert!(matches!(
            NotificationEvent::from_fields(&entry),
            Err(EventParseError::InvalidRecipients {
                kind: EventKind::DescriptionUpdate,
                ..
            })
        ));
    }

    #[test]
    fn test_to_fields_parses_back() {
        let event = NotificationEvent::NewAnswer {
            emails: vec!["a@x.com".to_string()],
            product_name: "Watch".to_string(),
            question: "Box included?".to_string(),
            answer: "Yes".to_string(),
        };

        let entry: HashMap<String, String> = event.to_fields().into_iter().collect();
        assert_eq!(entry.get("type").map(String::as_str), Some("NEW_ANSWER"));
        assert_eq!(
            NotificationEvent::from_fields(&entry),
            Ok(ParsedEvent::Known(event))
        );
    }

    #[test]
    fn test_kind_from_str() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>(), Ok(kind));
        }
        assert!("verify_email".parse::<EventKind>().is_err());
    }
}
