use super::templates::OutboundEmail;
use crate::config::{EmailConfig, EmailProvider};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors raised while delivering an email
#[derive(Error, Debug)]
pub enum MailerError {
    #[error("Email provider not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid address {address}: {message}")]
    InvalidAddress { address: String, message: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    #[error("Email API returned status {status}: {body}")]
    ApiStatus { status: u16, body: String },

    #[error("Email API request failed: {0}")]
    Request(String),
}

/// Delivers one rendered email
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailerError>;
}

/// Build the sender selected by configuration
pub fn build_sender(config: &EmailConfig) -> Result<Arc<dyn EmailSender>, MailerError> {
    match config.provider {
        EmailProvider::Smtp => Ok(Arc::new(SmtpMailer::new(config)?)),
        EmailProvider::HttpApi => Ok(Arc::new(HttpApiMailer::new(config)?)),
    }
}

/// SMTP submission over STARTTLS with basic credentials
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig) -> Result<Self, MailerError> {
        let password = config
            .smtp
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| MailerError::NotConfigured("email.smtp.password".to_string()))?;
        let username = config
            .smtp
            .username
            .clone()
            .unwrap_or_else(|| config.sender_email.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp.host)
            .map_err(|e| MailerError::Smtp(e.to_string()))?
            .port(config.smtp.port)
            .credentials(Credentials::new(username, password.to_string()))
            .build();

        info!(
            host = %config.smtp.host,
            port = config.smtp.port,
            "Email sender initialized (SMTP with STARTTLS)"
        );

        Ok(Self {
            transport,
            from: sender_mailbox(config)?,
        })
    }
}

#[async_trait]
impl EmailSender for SmtpMailer {
    #[instrument(skip(self, email), fields(to = %email.to))]
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailerError> {
        let to = email
            .to
            .parse::<Mailbox>()
            .map_err(|e| MailerError::InvalidAddress {
                address: email.to.clone(),
                message: e.to_string(),
            })?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_HTML)
            .body(email.html.clone())
            .map_err(|e| MailerError::Build(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailerError::Smtp(e.to_string()))?;

        debug!("Email sent via SMTP");
        Ok(())
    }
}

fn sender_mailbox(config: &EmailConfig) -> Result<Mailbox, MailerError> {
    let address = config
        .sender_email
        .parse::<Address>()
        .map_err(|e| MailerError::InvalidAddress {
            address: config.sender_email.clone(),
            message: e.to_string(),
        })?;
    Ok(Mailbox::new(Some(config.sender_name.clone()), address))
}

#[derive(Debug, Serialize)]
struct ApiAddress<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: ApiAddress<'a>,
    to: Vec<ApiAddress<'a>>,
    subject: &'a str,
    html: &'a str,
    category: &'a str,
}

/// Transactional email HTTP API (`POST {base}/api/send`, bearer auth)
pub struct HttpApiMailer {
    client: reqwest::Client,
    endpoint: String,
    api_token: String,
    sender_email: String,
    sender_name: String,
    category: String,
}

impl HttpApiMailer {
    pub fn new(config: &EmailConfig) -> Result<Self, MailerError> {
        let api_token = config
            .http_api
            .api_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| MailerError::NotConfigured("email.http_api.api_token".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(config.send_timeout())
            .build()
            .map_err(|e| MailerError::Request(e.to_string()))?;

        let endpoint = format!("{}/api/send", config.http_api.base_url.trim_end_matches('/'));

        info!(endpoint = %endpoint, "Email sender initialized (HTTP API)");

        Ok(Self {
            client,
            endpoint,
            api_token,
            sender_email: config.sender_email.clone(),
            sender_name: config.sender_name.clone(),
            category: config.http_api.category.clone(),
        })
    }
}

#[async_trait]
impl EmailSender for HttpApiMailer {
    #[instrument(skip(self, email), fields(to = %email.to))]
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailerError> {
        let request = SendRequest {
            from: ApiAddress {
                email: &self.sender_email,
                name: Some(&self.sender_name),
            },
            to: vec![ApiAddress {
                email: &email.to,
                name: None,
            }],
            subject: &email.subject,
            html: &email.html,
            category: &self.category,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| MailerError::Request(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(MailerError::ApiStatus {
                status: status.as_u16(),
                body,
            });
        }

        debug!("Email accepted by HTTP API");
        Ok(())
    }
}
