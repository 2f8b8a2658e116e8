//! HTTP handlers, one module per resource.

pub mod admin;
pub mod cart;
pub mod checkout;
pub mod orders;
pub mod subscriptions;
pub mod system;
pub mod webhooks;
