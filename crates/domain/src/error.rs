//! Domain error types.

use common::{AddressId, CartLineId, CatalogItemId, OrderId, OrderStatus, ServiceId};
use store::StoreError;
use thiserror::Error;

/// Errors raised by cart operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: i32 },

    #[error("Catalog item not found: {item_id}")]
    ItemNotFound { item_id: CatalogItemId },

    #[error("Service not found: {service_id}")]
    ServiceNotFound { service_id: ServiceId },

    #[error("Product is not available: {item_id}")]
    ProductUnavailable { item_id: CatalogItemId },

    #[error("Insufficient stock for {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: CatalogItemId,
        requested: u32,
        available: i32,
    },

    #[error("Cart line not found: {line_id}")]
    LineNotFound { line_id: CartLineId },
}

/// Errors raised by the order lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Address {address_id} does not belong to the user")]
    InvalidAddress { address_id: AddressId },

    #[error("Product is not available: {item_id}")]
    ProductUnavailable { item_id: CatalogItemId },

    #[error("Service is not available: {service_id}")]
    ServiceUnavailable { service_id: ServiceId },

    #[error("Insufficient stock for {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: CatalogItemId,
        requested: u32,
        available: i32,
    },

    #[error("Order not found: {order_id}")]
    OrderNotFound { order_id: OrderId },

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}

/// Errors raised by inventory and restock subscription operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    #[error("Catalog item not found: {item_id}")]
    ItemNotFound { item_id: CatalogItemId },

    #[error("Stock quantity cannot be negative: {quantity}")]
    NegativeQuantity { quantity: i32 },

    #[error("Invalid email address: {email}")]
    InvalidEmail { email: String },
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// A versioned write lost against a concurrent writer.
    #[error("Concurrent modification of {entity} {id}")]
    ConcurrentModification { entity: &'static str, id: String },

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ConcurrencyConflict { entity, id, .. } => {
                DomainError::ConcurrentModification { entity, id }
            }
            other => DomainError::Store(other),
        }
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
