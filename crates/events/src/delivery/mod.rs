//! Outbound delivery channels for enrollment notifications.

pub mod email;

use async_trait::async_trait;

pub use email::EmailError;

/// A fully composed plain-text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Anything that can put an [`OutgoingEmail`] on the wire.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError>;
}
