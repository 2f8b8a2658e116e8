//! Transactional persistence for the storefront order engine.
//!
//! The [`Store`] trait hands out boxed [`StoreTransaction`]s. Everything a
//! service does inside one transaction either commits together or not at all;
//! dropping a transaction without committing rolls it back.
//!
//! Two implementations are provided:
//! - [`InMemoryStore`] for tests and local runs
//! - [`PostgresStore`] backed by `sqlx`

pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use records::{
    Address, Cart, CartLine, CatalogItem, CatalogVariant, LineSnapshot, Order, OrderLine,
    RestockSubscription, ServiceAddOn, StockChange,
};
pub use store::{Store, StoreTransaction};
