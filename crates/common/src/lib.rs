//! Shared types for the storefront order engine.
//!
//! Everything here is a plain value: typed identifiers, money amounts and the
//! order status enumeration. Behavior that depends on storage lives in the
//! `store` and `domain` crates.

pub mod ids;
pub mod money;
pub mod status;

pub use ids::{
    AddressId, CartId, CartLineId, CatalogItemId, OrderId, OrderLineId, ServiceId,
    SubscriptionId, UserId,
};
pub use money::Money;
pub use status::{OrderStatus, UnknownOrderStatus};
