/// Outgoing email dispatch
///
/// The account flows send mail through the [`Mailer`] trait with a recipient,
/// a subject and an HTML body. Implementations:
///
/// - [`SmtpMailer`]: SMTP delivery via lettre
/// - [`LogMailer`]: logs the message instead of sending it (no SMTP configured)
/// - [`RecordingMailer`]: keeps messages in memory for assertions

use async_trait::async_trait;
use tokio::sync::Mutex;

mod smtp;

pub use smtp::{SmtpMailer, SmtpSettings};

/// Error type for mail dispatch
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// Sender or recipient is not a valid mailbox
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Message could not be assembled
    #[error("Failed to build message: {0}")]
    Build(String),

    /// Transport refused or failed to deliver
    #[error("Failed to send message: {0}")]
    Transport(String),
}

/// A single HTML email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Sends emails
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError>;
}

/// Mailer that only logs what it would have sent
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            body = %email.html,
            "SMTP not configured, email not sent"
        );
        Ok(())
    }
}

/// Mailer that records every message, optionally failing on demand
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose every send fails with a transport error
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Messages sent so far
    pub async fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        if self.fail {
            return Err(MailError::Transport("connection refused".to_string()));
        }

        self.sent.lock().await.push(email);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> OutgoingEmail {
        OutgoingEmail {
            to: "a@x.com".to_string(),
            subject: "Hello".to_string(),
            html: "<p>Hi</p>".to_string(),
        }
    }

    #[tokio::test]
    async fn test_recording_mailer_keeps_messages() {
        let mailer = RecordingMailer::new();
        mailer.send(email()).await.unwrap();

        assert_eq!(mailer.sent().await, vec![email()]);
    }

    #[tokio::test]
    async fn test_failing_mailer() {
        let mailer = RecordingMailer::failing();

        assert!(matches!(mailer.send(email()).await, Err(MailError::Transport(_))));
        assert!(mailer.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_log_mailer_succeeds() {
        assert!(LogMailer.send(email()).await.is_ok());
    }
}
