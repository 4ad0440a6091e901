//! Email notifications driven by the notification stream.

pub mod dispatcher;
pub mod mailer;
pub mod templates;

pub use dispatcher::{DispatchReport, NotificationDispatcher};
pub use mailer::{build_sender, EmailSender, HttpApiMailer, MailerError, SmtpMailer};
pub use templates::{escape_html, render, OutboundEmail};
