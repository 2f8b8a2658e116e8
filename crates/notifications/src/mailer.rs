//! Mailer trait and implementations.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::DeliveryError;

/// A "back in stock" message for one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestockMessage {
    pub recipient: String,
    pub subject: String,
    pub item_name: String,
    pub item_url: String,
}

/// Outbound message transport.
///
/// Delivery is attempted once per call; retrying is the caller's business.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &RestockMessage) -> Result<(), DeliveryError>;
}

/// Mailer that only writes messages to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &RestockMessage) -> Result<(), DeliveryError> {
        tracing::info!(
            recipient = %message.recipient,
            subject = %message.subject,
            url = %message.item_url,
            "Restock notification"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryMailerState {
    sent: Vec<RestockMessage>,
    attempts: usize,
    failing: HashSet<String>,
}

/// In-memory mailer for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMailer {
    state: Arc<RwLock<InMemoryMailerState>>,
}

impl InMemoryMailer {
    /// Creates a new in-memory mailer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every send to `recipient` fail.
    pub async fn fail_for(&self, recipient: &str) {
        self.state.write().await.failing.insert(recipient.to_string());
    }

    /// Returns the successfully delivered messages in send order.
    pub async fn sent(&self) -> Vec<RestockMessage> {
        self.state.read().await.sent.clone()
    }

    /// Returns the number of send attempts, failed ones included.
    pub async fn attempts(&self) -> usize {
        self.state.read().await.attempts
    }
}

#[async_trait]
impl Mailer for InMemoryMailer {
    async fn send(&self, message: &RestockMessage) -> Result<(), DeliveryError> {
        let mut state = self.state.write().await;
        state.attempts += 1;

        if state.failing.contains(&message.recipient) {
            return Err(DeliveryError::Rejected {
                recipient: message.recipient.clone(),
                reason: "mailbox unavailable".to_string(),
            });
        }

        state.sent.push(message.clone());
        Ok(())
    }
}
