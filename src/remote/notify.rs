//! Operator notification

use crate::domain::ports::Notifier;
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

/// A notification that was handed to the notifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Writes notifications to the log and keeps them for inspection
#[derive(Debug, Default)]
pub struct LogNotifier {
    sent: Mutex<Vec<SentNotification>>,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        info!(recipient = %recipient, subject = %subject, "Operator notification");
        self.sent.lock().push(SentNotification {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}
