//! Domain layer for the storefront order engine.
//!
//! This crate provides:
//! - [`CartService`] for cart edits and live quotes
//! - [`OrderService`] for order creation, idempotent payment confirmation,
//!   cancellation and staff status updates
//! - [`InventoryService`] for stock edits and restock subscriptions
//! - [`is_valid_transition`], the status rules staff tooling relies on
//! - [`InventoryListener`], the seam restock notifications hang off

pub mod cart;
pub mod error;
pub mod inventory;
pub mod order;
pub mod transitions;

pub use cart::CartService;
pub use error::{CartError, DomainError, InventoryError, OrderError, Result};
pub use inventory::{InventoryListener, InventoryService, NoopInventoryListener};
pub use order::{ConfirmOutcome, OrderService};
pub use transitions::is_valid_transition;
