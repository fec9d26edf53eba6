use async_trait::async_trait;
use tracing::info;

use super::{MailError, MailTransport, OutgoingMail};

/// Development transport: logs each message instead of delivering it.
pub struct ConsoleMailer;

#[async_trait]
impl MailTransport for ConsoleMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        info!(
            from = %mail.from,
            to = %mail.to,
            subject = %mail.subject,
            "email (not delivered)\n{}",
            mail.body
        );
        Ok(())
    }
}
