//! Outbound mail. The dispatcher owns message content; transports only deliver.

mod console;
mod smtp;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::config::{MailBackend, MailConfig};

pub use console::ConsoleMailer;
pub use smtp::SmtpMailer;

/// A plain-text email ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub subject: String,
    pub body: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address '{address}': {reason}")]
    Address { address: String, reason: String },

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("send timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// A mail transport: `send(subject, body, from, to) -> success | failure`.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

/// Builds the transport selected by `MAIL_BACKEND`.
pub fn build_transport(config: &MailConfig) -> anyhow::Result<Arc<dyn MailTransport>> {
    match config.backend {
        MailBackend::Log => {
            info!("Mail backend: log (messages are not delivered)");
            Ok(Arc::new(ConsoleMailer))
        }
        MailBackend::Smtp => {
            let host = config
                .smtp_host
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("SMTP_HOST is not set"))?;
            let mailer = SmtpMailer::new(
                host,
                config.smtp_port,
                config.smtp_user.clone(),
                config.smtp_pass.clone(),
            )?;
            info!("Mail backend: smtp ({host}:{})", config.smtp_port);
            Ok(Arc::new(mailer))
        }
    }
}
