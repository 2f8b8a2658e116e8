//! Staff inventory edits, restock subscriptions and the inventory change seam.

use std::sync::Arc;

use chrono::Utc;
use common::{CatalogItemId, SubscriptionId, UserId};
use store::{RestockSubscription, StockChange, Store};

use crate::error::{InventoryError, Result};

/// Observer for committed inventory writes.
///
/// Called after the writing transaction has committed, on the caller's task.
/// Implementations must not block; anything slow belongs on a queue.
pub trait InventoryListener: Send + Sync {
    fn on_inventory_changed(&self, change: &StockChange);
}

/// Listener that ignores every change.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInventoryListener;

impl InventoryListener for NoopInventoryListener {
    fn on_inventory_changed(&self, _change: &StockChange) {}
}

/// Reports committed changes to the listener.
pub(crate) fn publish(listener: &dyn InventoryListener, changes: &[StockChange]) {
    for change in changes {
        listener.on_inventory_changed(change);
    }
}

/// Service for staff stock edits and customer restock subscriptions.
pub struct InventoryService<S: Store> {
    store: S,
    listener: Arc<dyn InventoryListener>,
}

impl<S: Store> InventoryService<S> {
    pub fn new(store: S, listener: Arc<dyn InventoryListener>) -> Self {
        Self { store, listener }
    }

    /// Overwrites an item's on-hand quantity. `None` stops tracking stock.
    #[tracing::instrument(skip(self))]
    pub async fn set_stock(
        &self,
        item_id: CatalogItemId,
        quantity: Option<i32>,
    ) -> Result<StockChange> {
        if let Some(quantity) = quantity
            && quantity < 0
        {
            return Err(InventoryError::NegativeQuantity { quantity }.into());
        }

        let mut tx = self.store.begin().await?;
        if tx.catalog_item(item_id).await?.is_none() {
            return Err(InventoryError::ItemNotFound { item_id }.into());
        }
        let change = tx.set_stock_quantity(item_id, quantity).await?;
        tx.commit().await?;

        metrics::counter!("inventory_stock_updates_total").increment(1);
        tracing::info!(
            %item_id,
            previous = ?change.previous,
            current = ?change.current,
            "Stock updated"
        );

        publish(self.listener.as_ref(), &[change]);
        Ok(change)
    }

    /// Asks to be told when an item comes back in stock.
    ///
    /// Subscribing twice with the same email while the first request is still
    /// pending returns the existing subscription.
    #[tracing::instrument(skip(self))]
    pub async fn subscribe_restock(
        &self,
        user_id: UserId,
        email: &str,
        item_id: CatalogItemId,
    ) -> Result<RestockSubscription> {
        let email = email.trim();
        if !is_plausible_email(email) {
            return Err(InventoryError::InvalidEmail {
                email: email.to_string(),
            }
            .into());
        }

        let mut tx = self.store.begin().await?;
        if tx.catalog_item(item_id).await?.is_none() {
            return Err(InventoryError::ItemNotFound { item_id }.into());
        }

        let existing = tx
            .pending_restock_subscriptions(item_id)
            .await?
            .into_iter()
            .find(|s| s.email.eq_ignore_ascii_case(email));
        if let Some(existing) = existing {
            return Ok(existing);
        }

        let subscription = RestockSubscription {
            id: SubscriptionId::new(),
            user_id,
            email: email.to_string(),
            item_id,
            created_at: Utc::now(),
            notified_at: None,
        };
        tx.insert_restock_subscription(&subscription).await?;
        tx.commit().await?;

        metrics::counter!("restock_subscriptions_total").increment(1);
        Ok(subscription)
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !email.contains(' '),
        None => false,
    }
}
