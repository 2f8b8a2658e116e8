//! Notification error types.

use common::CatalogItemId;
use store::StoreError;
use thiserror::Error;

/// A single message could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The transport refused this recipient.
    #[error("Recipient {recipient} rejected: {reason}")]
    Rejected { recipient: String, reason: String },

    /// The transport itself failed.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Errors that stop a whole dispatch. Per-recipient failures never end up here.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Catalog item not found: {item_id}")]
    ItemNotFound { item_id: CatalogItemId },
}

/// Result type for notification operations.
pub type Result<T> = std::result::Result<T, NotificationError>;
