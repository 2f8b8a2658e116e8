//! Persisted records.

use chrono::{DateTime, Utc};
use common::{
    AddressId, CartId, CartLineId, CatalogItemId, Money, OrderId, OrderLineId, OrderStatus,
    ServiceId, SubscriptionId, UserId,
};
use serde::{Deserialize, Serialize};

/// Variant-specific payload of a catalog item.
///
/// Cart and order code only reads the shared fields of [`CatalogItem`] and
/// never branches on the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CatalogVariant {
    Frame {
        material: String,
        frame_type: String,
        color: Option<String>,
    },
    Lens {
        refractive_index: f32,
        prescription_required: bool,
        coating: Option<String>,
    },
}

impl CatalogVariant {
    pub fn kind(&self) -> &'static str {
        match self {
            CatalogVariant::Frame { .. } => "frame",
            CatalogVariant::Lens { .. } => "lens",
        }
    }
}

/// A sellable catalog item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: CatalogItemId,
    pub name: String,
    /// URL slug used to build canonical product links.
    pub slug: String,
    pub price: Money,
    pub is_active: bool,
    /// On-hand quantity. `None` means the item is not stock-tracked.
    pub stock_quantity: Option<i32>,
    pub primary_image_url: Option<String>,
    pub variant: CatalogVariant,
}

impl CatalogItem {
    pub fn is_stock_tracked(&self) -> bool {
        self.stock_quantity.is_some()
    }

    /// Returns true if `quantity` units can currently be sold.
    ///
    /// Untracked items are always available.
    pub fn has_available(&self, quantity: u32) -> bool {
        match self.stock_quantity {
            None => true,
            Some(on_hand) => i64::from(on_hand) >= i64::from(quantity),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.variant.kind()
    }
}

/// A priced service add-on (lens fitting, coating, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAddOn {
    pub id: ServiceId,
    pub name: String,
    pub price: Money,
}

/// A shipping address. Managed elsewhere; read here for ownership checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    pub user_id: UserId,
    pub recipient: String,
    pub line1: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

/// A user's open cart with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<CartLine>,
}

impl Cart {
    pub fn new(user_id: UserId) -> Self {
        Self {
            id: CartId::new(),
            user_id,
            created_at: Utc::now(),
            lines: Vec::new(),
        }
    }

    pub fn line(&self, line_id: CartLineId) -> Option<&CartLine> {
        self.lines.iter().find(|line| line.id == line_id)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// One line of a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: CartLineId,
    pub cart_id: CartId,
    pub item_id: CatalogItemId,
    pub service_id: Option<ServiceId>,
    pub quantity: u32,
    /// Opaque prescription payload, compared byte for byte when merging lines.
    pub prescription: Option<String>,
    pub added_at: DateTime<Utc>,
}

impl CartLine {
    /// Returns true if this line is for exactly the given item, service and prescription.
    pub fn matches(
        &self,
        item_id: CatalogItemId,
        service_id: Option<ServiceId>,
        prescription: Option<&str>,
    ) -> bool {
        self.item_id == item_id
            && self.service_id == service_id
            && self.prescription.as_deref() == prescription
    }
}

/// Display data frozen into an order line at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSnapshot {
    pub name: String,
    pub kind: String,
    pub image_url: Option<String>,
}

/// An immutable order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub order_id: OrderId,
    pub item_id: CatalogItemId,
    pub service_id: Option<ServiceId>,
    pub quantity: u32,
    /// Item price plus service price, captured when the order was created.
    pub unit_price: Money,
    pub snapshot: Option<LineSnapshot>,
}

impl OrderLine {
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// An order with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub address_id: AddressId,
    pub status: OrderStatus,
    pub total_amount: Money,
    /// Gateway checkout session that will pay for this order.
    pub payment_session_id: Option<String>,
    /// Gateway payment id recorded on confirmation.
    pub payment_id: Option<String>,
    /// Set when the order's lines were debited from inventory.
    pub stock_debited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped on every update.
    pub version: i64,
    pub lines: Vec<OrderLine>,
}

impl Order {
    /// Sum of the snapshotted line totals.
    pub fn lines_total(&self) -> Money {
        self.lines.iter().map(OrderLine::line_total).sum()
    }
}

/// A request to be told when an item comes back in stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestockSubscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub email: String,
    pub item_id: CatalogItemId,
    pub created_at: DateTime<Utc>,
    /// Set once a notification was delivered; pending while `None`.
    pub notified_at: Option<DateTime<Utc>>,
}

impl RestockSubscription {
    pub fn is_pending(&self) -> bool {
        self.notified_at.is_none()
    }
}

/// The before and after on-hand quantity of one inventory write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub item_id: CatalogItemId,
    pub previous: Option<i32>,
    pub current: Option<i32>,
}

impl StockChange {
    /// Returns true if the write took a tracked item from zero (or below) to positive.
    pub fn is_restock(&self) -> bool {
        matches!(
            (self.previous, self.current),
            (Some(previous), Some(current)) if previous <= 0 && current > 0
        )
    }
}
