use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AddressId, CartLineId, CatalogItemId, Money, OrderId, ServiceId, SubscriptionId, UserId};

use crate::{
    Address, Cart, CartLine, CatalogItem, Order, OrderLine, RestockSubscription, Result,
    ServiceAddOn, StockChange,
};

/// Entry point to the storefront's persistent state.
///
/// All reads and writes go through a transaction. Implementations must be
/// thread-safe (Send + Sync) and cheap to share.
#[async_trait]
pub trait Store: Send + Sync {
    /// Opens a new transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;
}

#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        (**self).begin().await
    }
}

/// A unit of work against the store.
///
/// Nothing written through a transaction is visible to others until
/// [`commit`](StoreTransaction::commit) succeeds. Dropping the transaction
/// discards its writes.
#[async_trait]
pub trait StoreTransaction: Send {
    // -- Catalog --

    async fn catalog_item(&mut self, id: CatalogItemId) -> Result<Option<CatalogItem>>;

    async fn insert_catalog_item(&mut self, item: &CatalogItem) -> Result<()>;

    /// Changes an item's list price. Existing orders keep their snapshot.
    async fn set_catalog_price(&mut self, id: CatalogItemId, price: Money) -> Result<()>;

    async fn service_add_on(&mut self, id: ServiceId) -> Result<Option<ServiceAddOn>>;

    async fn insert_service_add_on(&mut self, service: &ServiceAddOn) -> Result<()>;

    /// Overwrites an item's on-hand quantity (`None` stops tracking).
    ///
    /// Fails with `NotFound` for an unknown item.
    async fn set_stock_quantity(
        &mut self,
        id: CatalogItemId,
        quantity: Option<i32>,
    ) -> Result<StockChange>;

    /// Adds `delta` to a tracked item's on-hand quantity, clamping at zero.
    ///
    /// The read and the write happen under a row lock. Returns `None` when the
    /// item is not stock-tracked and `NotFound` for an unknown item.
    async fn adjust_stock(&mut self, id: CatalogItemId, delta: i32) -> Result<Option<StockChange>>;

    // -- Addresses --

    async fn address(&mut self, id: AddressId) -> Result<Option<Address>>;

    async fn insert_address(&mut self, address: &Address) -> Result<()>;

    // -- Carts --

    /// Loads a user's cart with its lines.
    async fn cart_for_user(&mut self, user_id: UserId) -> Result<Option<Cart>>;

    /// Loads a user's cart, creating an empty one if none exists.
    ///
    /// At most one cart per user exists even under concurrent calls.
    async fn get_or_create_cart(&mut self, user_id: UserId) -> Result<Cart>;

    async fn insert_cart_line(&mut self, line: &CartLine) -> Result<()>;

    async fn set_cart_line_quantity(&mut self, id: CartLineId, quantity: u32) -> Result<()>;

    /// Deletes a cart line. Returns false if it did not exist.
    async fn delete_cart_line(&mut self, id: CartLineId) -> Result<bool>;

    /// Deletes every line of a user's cart. Returns the number of lines removed.
    async fn clear_cart(&mut self, user_id: UserId) -> Result<u64>;

    // -- Orders --

    /// Persists an order header. `order.lines` is ignored.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    /// Persists lines for an order inserted earlier in the same transaction.
    async fn insert_order_lines(&mut self, lines: &[OrderLine]) -> Result<()>;

    /// Loads an order with its lines, locking it for the rest of the transaction.
    async fn order(&mut self, id: OrderId) -> Result<Option<Order>>;

    async fn order_by_payment_session(&mut self, session_id: &str) -> Result<Option<Order>>;

    /// Writes the mutable fields of an order.
    ///
    /// `order.version` must equal the stored version, otherwise the write fails
    /// with `ConcurrencyConflict`. Returns the new version.
    async fn update_order(&mut self, order: &Order) -> Result<i64>;

    // -- Restock subscriptions --

    /// Stores a subscription. Ignored if the same email already waits on the item.
    async fn insert_restock_subscription(&mut self, subscription: &RestockSubscription)
    -> Result<()>;

    /// Returns subscriptions for the item that have not been notified yet.
    async fn pending_restock_subscriptions(
        &mut self,
        item_id: CatalogItemId,
    ) -> Result<Vec<RestockSubscription>>;

    async fn mark_subscription_notified(
        &mut self,
        id: SubscriptionId,
        at: DateTime<Utc>,
    ) -> Result<()>;

    // -- Lifecycle --

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
