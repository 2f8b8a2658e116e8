//! Cart operations.

use chrono::Utc;
use common::{CartLineId, CatalogItemId, Money, ServiceId, UserId};
use store::{Cart, CartLine, CatalogItem, Store, StoreTransaction};

use crate::error::{CartError, Result};

/// Service for managing a user's cart.
///
/// Each operation runs in one store transaction, so finding or creating the
/// cart and merging the line cannot interleave with a concurrent add.
pub struct CartService<S: Store> {
    store: S,
}

/// Checks that `quantity` units of an item can currently be sold.
fn check_available(item: &CatalogItem, quantity: u32) -> std::result::Result<(), CartError> {
    if !item.has_available(quantity) {
        return Err(CartError::InsufficientStock {
            item_id: item.id,
            requested: quantity,
            available: item.stock_quantity.unwrap_or_default(),
        });
    }
    Ok(())
}

fn positive_quantity(quantity: i32) -> std::result::Result<u32, CartError> {
    u32::try_from(quantity)
        .ok()
        .filter(|q| *q > 0)
        .ok_or(CartError::InvalidQuantity { quantity })
}

impl<S: Store> CartService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the user's cart, if one was ever created.
    #[tracing::instrument(skip(self))]
    pub async fn get_cart(&self, user_id: UserId) -> Result<Option<Cart>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.cart_for_user(user_id).await?)
    }

    /// Adds an item to the user's cart, creating the cart on first use.
    ///
    /// A line for the same item, service and prescription is merged by
    /// increasing its quantity.
    #[tracing::instrument(skip(self, prescription))]
    pub async fn add_item(
        &self,
        user_id: UserId,
        item_id: CatalogItemId,
        quantity: i32,
        service_id: Option<ServiceId>,
        prescription: Option<String>,
    ) -> Result<Cart> {
        let requested = quantity;
        let quantity = positive_quantity(requested)?;

        let mut tx = self.store.begin().await?;

        let item = tx
            .catalog_item(item_id)
            .await?
            .ok_or(CartError::ItemNotFound { item_id })?;
        if let Some(service_id) = service_id
            && tx.service_add_on(service_id).await?.is_none()
        {
            return Err(CartError::ServiceNotFound { service_id }.into());
        }
        if !item.is_active {
            return Err(CartError::ProductUnavailable { item_id }.into());
        }
        check_available(&item, quantity)?;

        let cart = tx.get_or_create_cart(user_id).await?;
        let existing = cart
            .lines
            .iter()
            .find(|line| line.matches(item_id, service_id, prescription.as_deref()));

        match existing {
            Some(line) => {
                // Line quantities must stay within the storable i32 range.
                let merged = line
                    .quantity
                    .checked_add(quantity)
                    .filter(|merged| i32::try_from(*merged).is_ok())
                    .ok_or(CartError::InvalidQuantity {
                        quantity: requested,
                    })?;
                tx.set_cart_line_quantity(line.id, merged).await?;
                tracing::debug!(line_id = %line.id, quantity = merged, "Merged cart line");
            }
            None => {
                let line = CartLine {
                    id: CartLineId::new(),
                    cart_id: cart.id,
                    item_id,
                    service_id,
                    quantity,
                    prescription,
                    added_at: Utc::now(),
                };
                tx.insert_cart_line(&line).await?;
                tracing::debug!(line_id = %line.id, "Inserted cart line");
            }
        }

        let cart = reload(tx.as_mut(), user_id).await?;
        tx.commit().await?;

        metrics::counter!("cart_items_added_total").increment(1);
        Ok(cart)
    }

    /// Changes a line's quantity. Zero or less removes the line.
    #[tracing::instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        user_id: UserId,
        line_id: CartLineId,
        quantity: i32,
    ) -> Result<Cart> {
        let mut tx = self.store.begin().await?;
        let line = owned_line(tx.as_mut(), user_id, line_id).await?;

        if quantity <= 0 {
            tx.delete_cart_line(line_id).await?;
        } else {
            let quantity = positive_quantity(quantity)?;
            let item = tx
                .catalog_item(line.item_id)
                .await?
                .ok_or(CartError::ItemNotFound {
                    item_id: line.item_id,
                })?;
            check_available(&item, quantity)?;
            tx.set_cart_line_quantity(line_id, quantity).await?;
        }

        let cart = reload(tx.as_mut(), user_id).await?;
        tx.commit().await?;
        Ok(cart)
    }

    /// Removes one line from the user's cart.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, user_id: UserId, line_id: CartLineId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        owned_line(tx.as_mut(), user_id, line_id).await?;
        tx.delete_cart_line(line_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Empties the user's cart. Missing carts are fine.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, user_id: UserId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let removed = tx.clear_cart(user_id).await?;
        tx.commit().await?;
        tracing::debug!(removed, "Cleared cart");
        Ok(())
    }

    /// Live quote of the cart at current catalog prices.
    ///
    /// Lines whose item or service has since disappeared count at zero.
    #[tracing::instrument(skip(self))]
    pub async fn calculate_total(&self, user_id: UserId) -> Result<Money> {
        let mut tx = self.store.begin().await?;
        let Some(cart) = tx.cart_for_user(user_id).await? else {
            return Ok(Money::zero());
        };

        let mut total = Money::zero();
        for line in &cart.lines {
            let mut unit = tx
                .catalog_item(line.item_id)
                .await?
                .map(|item| item.price)
                .unwrap_or_default();
            if let Some(service_id) = line.service_id
                && let Some(service) = tx.service_add_on(service_id).await?
            {
                unit += service.price;
            }
            total += unit.multiply(line.quantity);
        }
        Ok(total)
    }
}

async fn owned_line(
    tx: &mut dyn StoreTransaction,
    user_id: UserId,
    line_id: CartLineId,
) -> Result<CartLine> {
    tx.cart_for_user(user_id)
        .await?
        .and_then(|cart| cart.line(line_id).cloned())
        .ok_or_else(|| CartError::LineNotFound { line_id }.into())
}

async fn reload(tx: &mut dyn StoreTransaction, user_id: UserId) -> Result<Cart> {
    Ok(tx
        .cart_for_user(user_id)
        .await?
        .unwrap_or_else(|| Cart::new(user_id)))
}
