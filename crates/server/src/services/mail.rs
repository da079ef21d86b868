//! Outgoing mail.
//!
//! Services send mail through the [`Mailer`] trait. The server wires in
//! [`LogMailer`], which writes messages to the log instead of delivering
//! them.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use bookstore_core::Email;

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum MailError {
    /// The transport refused or failed to deliver the message.
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Sends plain-text mail.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &Email, subject: &str, body: &str) -> Result<(), MailError>;
}

/// Mailer that logs every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &Email, subject: &str, body: &str) -> Result<(), MailError> {
        info!(to = %to, subject, body, "outgoing mail");
        Ok(())
    }
}
