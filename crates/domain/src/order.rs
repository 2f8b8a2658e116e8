//! Order lifecycle: materialization from the cart, payment confirmation,
//! cancellation and staff status updates.

use std::sync::Arc;

use chrono::Utc;
use common::{AddressId, OrderId, OrderLineId, OrderStatus, UserId};
use store::{LineSnapshot, Order, OrderLine, StockChange, Store, StoreTransaction};

use crate::error::{OrderError, Result};
use crate::inventory::{InventoryListener, publish};
use crate::transitions::is_valid_transition;

/// What a payment confirmation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// Payment recorded and inventory debited.
    Confirmed(Order),
    /// The order was already paid; nothing changed.
    AlreadyPaid(Order),
    /// The order was cancelled before the payment arrived; nothing changed.
    Ignored(Order),
}

impl ConfirmOutcome {
    pub fn order(&self) -> &Order {
        match self {
            ConfirmOutcome::Confirmed(order)
            | ConfirmOutcome::AlreadyPaid(order)
            | ConfirmOutcome::Ignored(order) => order,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmOutcome::Confirmed(_) => "confirmed",
            ConfirmOutcome::AlreadyPaid(_) => "already_paid",
            ConfirmOutcome::Ignored(_) => "ignored",
        }
    }
}

/// Service driving orders through their lifecycle.
///
/// Every operation runs in a single store transaction. Inventory changes are
/// reported to the listener only after that transaction has committed.
pub struct OrderService<S: Store> {
    store: S,
    listener: Arc<dyn InventoryListener>,
}

impl<S: Store> OrderService<S> {
    /// Creates a new order service.
    pub fn new(store: S, listener: Arc<dyn InventoryListener>) -> Self {
        Self { store, listener }
    }

    /// Turns the user's cart into a `Pending` order.
    ///
    /// Prices and display data are snapshotted into the lines. Stock is checked
    /// but not reserved, and the cart is left untouched until payment.
    #[tracing::instrument(skip(self))]
    pub async fn create_pending_order(
        &self,
        user_id: UserId,
        address_id: AddressId,
    ) -> Result<Order> {
        let mut tx = self.store.begin().await?;

        match tx.address(address_id).await? {
            Some(address) if address.user_id == user_id => {}
            _ => return Err(OrderError::InvalidAddress { address_id }.into()),
        }

        let cart = match tx.cart_for_user(user_id).await? {
            Some(cart) if !cart.is_empty() => cart,
            _ => return Err(OrderError::EmptyCart.into()),
        };

        let order_id = OrderId::new();
        let mut lines = Vec::with_capacity(cart.lines.len());

        for cart_line in &cart.lines {
            let item_id = cart_line.item_id;
            let item = match tx.catalog_item(item_id).await? {
                Some(item) if item.is_active => item,
                _ => return Err(OrderError::ProductUnavailable { item_id }.into()),
            };
            if !item.has_available(cart_line.quantity) {
                return Err(OrderError::InsufficientStock {
                    item_id,
                    requested: cart_line.quantity,
                    available: item.stock_quantity.unwrap_or_default(),
                }
                .into());
            }

            let mut unit_price = item.price;
            if let Some(service_id) = cart_line.service_id {
                let service = tx
                    .service_add_on(service_id)
                    .await?
                    .ok_or(OrderError::ServiceUnavailable { service_id })?;
                unit_price += service.price;
            }

            lines.push(OrderLine {
                id: OrderLineId::new(),
                order_id,
                item_id,
                service_id: cart_line.service_id,
                quantity: cart_line.quantity,
                unit_price,
                snapshot: Some(LineSnapshot {
                    name: item.name.clone(),
                    kind: item.kind().to_string(),
                    image_url: item.primary_image_url.clone(),
                }),
            });
        }

        let now = Utc::now();
        let order = Order {
            id: order_id,
            user_id,
            address_id,
            status: OrderStatus::Pending,
            total_amount: lines.iter().map(OrderLine::line_total).sum(),
            payment_session_id: None,
            payment_id: None,
            stock_debited: false,
            created_at: now,
            updated_at: now,
            version: 1,
            lines,
        };

        tx.insert_order(&order).await?;
        tx.insert_order_lines(&order.lines).await?;
        tx.commit().await?;

        metrics::counter!("orders_created_total").increment(1);
        metrics::histogram!("order_total_amount").record(order.total_amount.cents() as f64);
        tracing::info!(
            %order_id,
            total = %order.total_amount,
            lines = order.lines.len(),
            "Pending order created"
        );

        Ok(order)
    }

    /// Records the gateway checkout session that will pay for a pending order.
    #[tracing::instrument(skip(self))]
    pub async fn attach_payment_session(&self, order_id: OrderId, session_id: &str) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        let mut order = load(tx.as_mut(), order_id).await?;

        if order.status != OrderStatus::Pending {
            return Err(OrderError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Pending,
            }
            .into());
        }

        order.payment_session_id = Some(session_id.to_string());
        order.updated_at = Utc::now();
        order.version = tx.update_order(&order).await?;
        tx.commit().await?;

        Ok(order)
    }

    /// Confirms payment for an order. Safe to call any number of times.
    ///
    /// The first call marks the order `Paid`, debits every line from inventory
    /// (clamping at zero) and clears the user's cart, all in one transaction.
    /// Later calls are no-ops. A cancelled order is left alone.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_payment(&self, order_id: OrderId, payment_id: &str) -> Result<ConfirmOutcome> {
        let mut tx = self.store.begin().await?;
        let mut order = load(tx.as_mut(), order_id).await?;

        if order.stock_debited || order.status == OrderStatus::Paid {
            metrics::counter!("payments_confirmed_total", "outcome" => "already_paid").increment(1);
            tracing::info!("Payment already confirmed");
            return Ok(ConfirmOutcome::AlreadyPaid(order));
        }

        if order.status == OrderStatus::Cancelled {
            metrics::counter!("payments_confirmed_total", "outcome" => "ignored").increment(1);
            tracing::warn!("Payment received for a cancelled order");
            return Ok(ConfirmOutcome::Ignored(order));
        }

        for line in &order.lines {
            let Some(change) = tx.adjust_stock(line.item_id, -as_delta(line.quantity)).await?
            else {
                continue;
            };
            if let Some(previous) = change.previous
                && i64::from(previous) < i64::from(line.quantity)
            {
                metrics::counter!("inventory_debit_clamped_total").increment(1);
                tracing::warn!(
                    item_id = %line.item_id,
                    previous,
                    requested = line.quantity,
                    "Stock debit clamped at zero"
                );
            }
        }

        // Staff may already have moved an unpaid order forward; keep that status.
        if order.status == OrderStatus::Pending {
            order.status = OrderStatus::Paid;
        }
        order.payment_id = Some(payment_id.to_string());
        order.stock_debited = true;
        order.updated_at = Utc::now();
        order.version = tx.update_order(&order).await?;

        tx.clear_cart(order.user_id).await?;
        tx.commit().await?;

        metrics::counter!("payments_confirmed_total", "outcome" => "confirmed").increment(1);
        tracing::info!(status = %order.status, "Payment confirmed");

        Ok(ConfirmOutcome::Confirmed(order))
    }

    /// Cancels a pending order.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        let mut order = load(tx.as_mut(), order_id).await?;

        if order.status != OrderStatus::Pending {
            return Err(OrderError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Cancelled,
            }
            .into());
        }

        order.status = OrderStatus::Cancelled;
        order.updated_at = Utc::now();
        order.version = tx.update_order(&order).await?;
        tx.commit().await?;

        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!("Order cancelled");
        Ok(order)
    }

    /// Moves an order to a new status on behalf of staff.
    ///
    /// Cancelling an order whose stock was debited puts every line back into
    /// inventory before the status changes.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(&self, order_id: OrderId, to: OrderStatus) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        let mut order = load(tx.as_mut(), order_id).await?;
        let from = order.status;

        if !is_valid_transition(from, to) {
            return Err(OrderError::InvalidTransition { from, to }.into());
        }
        if from == to {
            return Ok(order);
        }

        let mut changes: Vec<StockChange> = Vec::new();
        if to == OrderStatus::Cancelled && order.stock_debited {
            for line in &order.lines {
                if let Some(change) = tx.adjust_stock(line.item_id, as_delta(line.quantity)).await? {
                    changes.push(change);
                }
            }
            order.stock_debited = false;
        }

        order.status = to;
        order.updated_at = Utc::now();
        order.version = tx.update_order(&order).await?;
        tx.commit().await?;

        metrics::counter!("order_status_transitions_total", "to" => to.as_str()).increment(1);
        tracing::info!(%from, %to, restored = changes.len(), "Order status updated");

        publish(self.listener.as_ref(), &changes);
        Ok(order)
    }

    /// Loads an order with its lines.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        load(tx.as_mut(), order_id).await
    }

    /// Finds the order paid for by a gateway checkout session.
    #[tracing::instrument(skip(self))]
    pub async fn find_by_payment_session(&self, session_id: &str) -> Result<Option<Order>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.order_by_payment_session(session_id).await?)
    }
}

async fn load(tx: &mut dyn StoreTransaction, order_id: OrderId) -> Result<Order> {
    tx.order(order_id)
        .await?
        .ok_or_else(|| OrderError::OrderNotFound { order_id }.into())
}

/// Line quantities are bounded by the i32 database column.
fn as_delta(quantity: u32) -> i32 {
    i32::try_from(quantity).unwrap_or(i32::MAX)
}
