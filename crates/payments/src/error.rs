//! Payment error types.

use domain::DomainError;
use thiserror::Error;

/// Errors from opening a checkout.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The gateway refused to open a session.
    #[error("Payment gateway error: {0}")]
    Gateway(String),

    /// The gateway answered with a non-success status.
    #[error("Payment gateway returned {status}: {body}")]
    GatewayStatus { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Reasons a webhook signature is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("Missing signature header")]
    MissingHeader,

    #[error("Malformed signature header")]
    Malformed,

    #[error("Signature timestamp outside the tolerance window")]
    Expired,

    #[error("Signature does not match payload")]
    Mismatch,

    #[error("Webhook signing secret is empty")]
    InvalidKey,
}

/// Errors from handling a webhook delivery.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Permanent rejection; the event is never processed.
    #[error("Invalid webhook signature: {0}")]
    Signature(#[from] SignatureError),

    /// The payload verified but is not an event we can read.
    #[error("Invalid webhook payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// Confirmation failed and was rolled back; the delivery should be retried.
    #[error("Payment confirmation failed: {0}")]
    Confirm(DomainError),
}

/// Result type for payment operations.
pub type Result<T> = std::result::Result<T, PaymentError>;
