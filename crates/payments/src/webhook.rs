//! Signed payment webhook handling.

use std::sync::Arc;

use common::OrderId;
use domain::{ConfirmOutcome, OrderService};
use serde::Deserialize;
use store::Store;

use crate::error::{SignatureError, WebhookError};
use crate::signature::SignatureVerifier;

/// Event type emitted when a hosted checkout is paid.
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: WebhookEventData,
}

#[derive(Debug, Deserialize)]
struct WebhookEventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CompletedSession {
    id: String,
    #[serde(default)]
    payment_intent: Option<String>,
}

/// How an accepted delivery was handled. Every variant is acknowledged with 200.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The order was paid and inventory debited.
    Confirmed { order_id: OrderId },
    /// A redelivery for an order that is already paid.
    AlreadyProcessed { order_id: OrderId },
    /// Payment arrived for an order that was cancelled first.
    OrderCancelled { order_id: OrderId },
    /// No order matches the session, or the lookup failed.
    OrderLookupMiss { session_id: String },
    /// An event type this handler does not act on.
    Ignored { event_type: String },
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Confirmed { .. } => "confirmed",
            WebhookOutcome::AlreadyProcessed { .. } => "already_processed",
            WebhookOutcome::OrderCancelled { .. } => "order_cancelled",
            WebhookOutcome::OrderLookupMiss { .. } => "lookup_miss",
            WebhookOutcome::Ignored { .. } => "ignored",
        }
    }
}

/// Verifies webhook deliveries and confirms the orders they pay for.
pub struct WebhookHandler<S: Store> {
    orders: Arc<OrderService<S>>,
    verifier: SignatureVerifier,
}

impl<S: Store> WebhookHandler<S> {
    pub fn new(orders: Arc<OrderService<S>>, verifier: SignatureVerifier) -> Self {
        Self { orders, verifier }
    }

    /// Handles one delivery given its signature header and raw body.
    ///
    /// Nothing is read or written unless the signature verifies.
    #[tracing::instrument(skip(self, signature, payload))]
    pub async fn handle(
        &self,
        signature: Option<&str>,
        payload: &[u8],
    ) -> Result<WebhookOutcome, WebhookError> {
        let result = self.process(signature, payload).await;

        let outcome = match &result {
            Ok(outcome) => outcome.as_str(),
            Err(WebhookError::Signature(_)) => "invalid_signature",
            Err(WebhookError::Payload(_)) => "invalid_payload",
            Err(WebhookError::Confirm(_)) => "confirm_failed",
        };
        metrics::counter!("payment_webhooks_total", "outcome" => outcome).increment(1);

        result
    }

    async fn process(
        &self,
        signature: Option<&str>,
        payload: &[u8],
    ) -> Result<WebhookOutcome, WebhookError> {
        let header = signature.ok_or(SignatureError::MissingHeader)?;
        if let Err(err) = self.verifier.verify(header, payload) {
            tracing::warn!(error = %err, "Rejected webhook with invalid signature");
            return Err(err.into());
        }

        let event: WebhookEvent = serde_json::from_slice(payload)?;
        if event.event_type != CHECKOUT_COMPLETED {
            tracing::debug!(event_type = %event.event_type, "Ignoring webhook event");
            return Ok(WebhookOutcome::Ignored {
                event_type: event.event_type,
            });
        }

        let session: CompletedSession = serde_json::from_value(event.data.object)?;
        let payment_id = session.payment_intent.as_deref().unwrap_or(&session.id);

        let order = match self.orders.find_by_payment_session(&session.id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                tracing::warn!(session_id = %session.id, "No order for checkout session");
                return Ok(WebhookOutcome::OrderLookupMiss {
                    session_id: session.id,
                });
            }
            Err(err) => {
                tracing::error!(session_id = %session.id, error = %err, "Order lookup failed");
                return Ok(WebhookOutcome::OrderLookupMiss {
                    session_id: session.id,
                });
            }
        };

        let order_id = order.id;
        match self.orders.confirm_payment(order_id, payment_id).await {
            Ok(ConfirmOutcome::Confirmed(_)) => Ok(WebhookOutcome::Confirmed { order_id }),
            Ok(ConfirmOutcome::AlreadyPaid(_)) => Ok(WebhookOutcome::AlreadyProcessed { order_id }),
            Ok(ConfirmOutcome::Ignored(_)) => Ok(WebhookOutcome::OrderCancelled { order_id }),
            Err(err) => {
                tracing::error!(%order_id, error = %err, "Payment confirmation failed");
                Err(WebhookError::Confirm(err))
            }
        }
    }
}
