use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    AddressId, CartLineId, CatalogItemId, Money, OrderId, ServiceId, SubscriptionId, UserId,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    Address, Cart, CartLine, CatalogItem, Order, OrderLine, RestockSubscription, Result,
    ServiceAddOn, StockChange, StoreError,
    store::{Store, StoreTransaction},
};

#[derive(Debug, Clone, Default)]
struct StoreData {
    catalog: HashMap<CatalogItemId, CatalogItem>,
    services: HashMap<ServiceId, ServiceAddOn>,
    addresses: HashMap<AddressId, Address>,
    carts: HashMap<UserId, Cart>,
    orders: HashMap<OrderId, Order>,
    subscriptions: Vec<RestockSubscription>,
}

/// In-memory store implementation for testing.
///
/// A transaction holds the store's lock from `begin` until it is committed or
/// dropped and works on a private copy of the data, so transactions are fully
/// serialized and a dropped transaction leaves no trace.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    data: Arc<Mutex<StoreData>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next commit fail with `StoreError::Unavailable`.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.data.lock().await.orders.len()
    }

    /// Returns the number of stored order lines across all orders.
    pub async fn order_line_count(&self) -> usize {
        self.data
            .lock()
            .await
            .orders
            .values()
            .map(|order| order.lines.len())
            .sum()
    }

    /// Returns the committed on-hand quantity of an item.
    pub async fn stock_quantity(&self, id: CatalogItemId) -> Option<i32> {
        self.data
            .lock()
            .await
            .catalog
            .get(&id)
            .and_then(|item| item.stock_quantity)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let guard = self.data.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTransaction {
            guard,
            working,
            fail_commit: self.fail_next_commit.clone(),
        }))
    }
}

struct InMemoryTransaction {
    guard: OwnedMutexGuard<StoreData>,
    working: StoreData,
    fail_commit: Arc<AtomicBool>,
}

impl InMemoryTransaction {
    fn item_mut(&mut self, id: CatalogItemId) -> Result<&mut CatalogItem> {
        self.working
            .catalog
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("catalog item", id))
    }

    fn line_mut(&mut self, id: CartLineId) -> Option<&mut CartLine> {
        self.working
            .carts
            .values_mut()
            .flat_map(|cart| cart.lines.iter_mut())
            .find(|line| line.id == id)
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn catalog_item(&mut self, id: CatalogItemId) -> Result<Option<CatalogItem>> {
        Ok(self.working.catalog.get(&id).cloned())
    }

    async fn insert_catalog_item(&mut self, item: &CatalogItem) -> Result<()> {
        self.working.catalog.insert(item.id, item.clone());
        Ok(())
    }

    async fn set_catalog_price(&mut self, id: CatalogItemId, price: Money) -> Result<()> {
        self.item_mut(id)?.price = price;
        Ok(())
    }

    async fn service_add_on(&mut self, id: ServiceId) -> Result<Option<ServiceAddOn>> {
        Ok(self.working.services.get(&id).cloned())
    }

    async fn insert_service_add_on(&mut self, service: &ServiceAddOn) -> Result<()> {
        self.working.services.insert(service.id, service.clone());
        Ok(())
    }

    async fn set_stock_quantity(
        &mut self,
        id: CatalogItemId,
        quantity: Option<i32>,
    ) -> Result<StockChange> {
        let item = self.item_mut(id)?;
        let previous = item.stock_quantity;
        item.stock_quantity = quantity;
        Ok(StockChange {
            item_id: id,
            previous,
            current: quantity,
        })
    }

    async fn adjust_stock(&mut self, id: CatalogItemId, delta: i32) -> Result<Option<StockChange>> {
        let item = self.item_mut(id)?;
        let Some(previous) = item.stock_quantity else {
            return Ok(None);
        };
        let current = previous.saturating_add(delta).max(0);
        tracing::debug!(item_id = %id, previous, current, "Adjusted stock");
        item.stock_quantity = Some(current);
        Ok(Some(StockChange {
            item_id: id,
            previous: Some(previous),
            current: Some(current),
        }))
    }

    async fn address(&mut self, id: AddressId) -> Result<Option<Address>> {
        Ok(self.working.addresses.get(&id).cloned())
    }

    async fn insert_address(&mut self, address: &Address) -> Result<()> {
        self.working.addresses.insert(address.id, address.clone());
        Ok(())
    }

    async fn cart_for_user(&mut self, user_id: UserId) -> Result<Option<Cart>> {
        Ok(self.working.carts.get(&user_id).cloned())
    }

    async fn get_or_create_cart(&mut self, user_id: UserId) -> Result<Cart> {
        Ok(self
            .working
            .carts
            .entry(user_id)
            .or_insert_with(|| Cart::new(user_id))
            .clone())
    }

    async fn insert_cart_line(&mut self, line: &CartLine) -> Result<()> {
        let cart = self
            .working
            .carts
            .values_mut()
            .find(|cart| cart.id == line.cart_id)
            .ok_or_else(|| StoreError::not_found("cart", line.cart_id))?;
        cart.lines.push(line.clone());
        Ok(())
    }

    async fn set_cart_line_quantity(&mut self, id: CartLineId, quantity: u32) -> Result<()> {
        let line = self
            .line_mut(id)
            .ok_or_else(|| StoreError::not_found("cart line", id))?;
        line.quantity = quantity;
        Ok(())
    }

    async fn delete_cart_line(&mut self, id: CartLineId) -> Result<bool> {
        for cart in self.working.carts.values_mut() {
            let before = cart.lines.len();
            cart.lines.retain(|line| line.id != id);
            if cart.lines.len() != before {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn clear_cart(&mut self, user_id: UserId) -> Result<u64> {
        Ok(self
            .working
            .carts
            .get_mut(&user_id)
            .map(|cart| cart.lines.drain(..).count() as u64)
            .unwrap_or(0))
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        let mut header = order.clone();
        header.lines.clear();
        self.working.orders.insert(order.id, header);
        Ok(())
    }

    async fn insert_order_lines(&mut self, lines: &[OrderLine]) -> Result<()> {
        for line in lines {
            let order = self
                .working
                .orders
                .get_mut(&line.order_id)
                .ok_or_else(|| StoreError::not_found("order", line.order_id))?;
            order.lines.push(line.clone());
        }
        Ok(())
    }

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn order_by_payment_session(&mut self, session_id: &str) -> Result<Option<Order>> {
        Ok(self
            .working
            .orders
            .values()
            .find(|order| order.payment_session_id.as_deref() == Some(session_id))
            .cloned())
    }

    async fn update_order(&mut self, order: &Order) -> Result<i64> {
        let stored = self
            .working
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| StoreError::not_found("order", order.id))?;

        if stored.version != order.version {
            return Err(StoreError::ConcurrencyConflict {
                entity: "order",
                id: order.id.to_string(),
                expected: order.version,
                actual: stored.version,
            });
        }

        stored.status = order.status;
        stored.payment_session_id = order.payment_session_id.clone();
        stored.payment_id = order.payment_id.clone();
        stored.stock_debited = order.stock_debited;
        stored.updated_at = order.updated_at;
        stored.version += 1;
        Ok(stored.version)
    }

    async fn insert_restock_subscription(
        &mut self,
        subscription: &RestockSubscription,
    ) -> Result<()> {
        let duplicate = self.working.subscriptions.iter().any(|s| {
            s.item_id == subscription.item_id && s.email == subscription.email && s.is_pending()
        });
        if !duplicate {
            self.working.subscriptions.push(subscription.clone());
        }
        Ok(())
    }

    async fn pending_restock_subscriptions(
        &mut self,
        item_id: CatalogItemId,
    ) -> Result<Vec<RestockSubscription>> {
        Ok(self
            .working
            .subscriptions
            .iter()
            .filter(|s| s.item_id == item_id && s.is_pending())
            .cloned()
            .collect())
    }

    async fn mark_subscription_notified(
        &mut self,
        id: SubscriptionId,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let subscription = self
            .working
            .subscriptions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::not_found("restock subscription", id))?;
        subscription.notified_at = Some(at);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if self.fail_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected commit failure".to_string()));
        }
        let InMemoryTransaction {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
