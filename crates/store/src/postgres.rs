use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    AddressId, CartId, CartLineId, CatalogItemId, Money, OrderId, OrderLineId, OrderStatus,
    ServiceId, SubscriptionId, UserId,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Address, Cart, CartLine, CatalogItem, CatalogVariant, LineSnapshot, Order, OrderLine,
    RestockSubscription, Result, ServiceAddOn, StockChange, StoreError,
    store::{Store, StoreTransaction},
};

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction { tx }))
    }
}

struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

fn quantity_to_db(entity: &'static str, quantity: u32) -> Result<i32> {
    i32::try_from(quantity)
        .map_err(|_| StoreError::corrupt(entity, format!("quantity {quantity} out of range")))
}

fn quantity_from_db(entity: &'static str, quantity: i32) -> Result<u32> {
    u32::try_from(quantity)
        .map_err(|_| StoreError::corrupt(entity, format!("negative quantity {quantity}")))
}

fn row_to_item(row: PgRow) -> Result<CatalogItem> {
    let variant: serde_json::Value = row.try_get("variant")?;
    let variant: CatalogVariant = serde_json::from_value(variant)?;

    Ok(CatalogItem {
        id: CatalogItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        is_active: row.try_get("is_active")?,
        stock_quantity: row.try_get("stock_quantity")?,
        primary_image_url: row.try_get("primary_image_url")?,
        variant,
    })
}

fn row_to_cart_line(row: PgRow) -> Result<CartLine> {
    Ok(CartLine {
        id: CartLineId::from_uuid(row.try_get::<Uuid, _>("id")?),
        cart_id: CartId::from_uuid(row.try_get::<Uuid, _>("cart_id")?),
        item_id: CatalogItemId::from_uuid(row.try_get::<Uuid, _>("item_id")?),
        service_id: row
            .try_get::<Option<Uuid>, _>("service_id")?
            .map(ServiceId::from_uuid),
        quantity: quantity_from_db("cart line", row.try_get("quantity")?)?,
        prescription: row.try_get("prescription")?,
        added_at: row.try_get("added_at")?,
    })
}

fn row_to_order_line(row: PgRow) -> Result<OrderLine> {
    let snapshot: Option<serde_json::Value> = row.try_get("snapshot")?;
    let snapshot: Option<LineSnapshot> = snapshot.map(serde_json::from_value).transpose()?;

    Ok(OrderLine {
        id: OrderLineId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        item_id: CatalogItemId::from_uuid(row.try_get::<Uuid, _>("item_id")?),
        service_id: row
            .try_get::<Option<Uuid>, _>("service_id")?
            .map(ServiceId::from_uuid),
        quantity: quantity_from_db("order line", row.try_get("quantity")?)?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        snapshot,
    })
}

fn row_to_order(row: PgRow) -> Result<Order> {
    let status: String = row.try_get("status")?;
    let status: OrderStatus = status
        .parse()
        .map_err(|e: common::UnknownOrderStatus| StoreError::corrupt("order", e.to_string()))?;

    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        address_id: AddressId::from_uuid(row.try_get::<Uuid, _>("address_id")?),
        status,
        total_amount: Money::from_cents(row.try_get("total_amount_cents")?),
        payment_session_id: row.try_get("payment_session_id")?,
        payment_id: row.try_get("payment_id")?,
        stock_debited: row.try_get("stock_debited")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: row.try_get("version")?,
        lines: Vec::new(),
    })
}

fn row_to_subscription(row: PgRow) -> Result<RestockSubscription> {
    Ok(RestockSubscription {
        id: SubscriptionId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        email: row.try_get("email")?,
        item_id: CatalogItemId::from_uuid(row.try_get::<Uuid, _>("item_id")?),
        created_at: row.try_get("created_at")?,
        notified_at: row.try_get("notified_at")?,
    })
}

const ORDER_COLUMNS: &str = "id, user_id, address_id, status, total_amount_cents, \
     payment_session_id, payment_id, stock_debited, created_at, updated_at, version";

impl PostgresTransaction {
    async fn load_order_lines(&mut self, order: &mut Order) -> Result<()> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, item_id, service_id, quantity, unit_price_cents, snapshot
            FROM order_lines
            WHERE order_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(order.id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        order.lines = rows
            .into_iter()
            .map(row_to_order_line)
            .collect::<Result<Vec<_>>>()?;
        Ok(())
    }

    /// Reads an item's stock quantity under a row lock.
    ///
    /// The outer `Option` is the row, the inner one the tracked quantity.
    async fn lock_stock(&mut self, id: CatalogItemId) -> Result<Option<Option<i32>>> {
        let row = sqlx::query("SELECT stock_quantity FROM catalog_items WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(|row| row.try_get::<Option<i32>, _>("stock_quantity"))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn write_stock(&mut self, id: CatalogItemId, quantity: Option<i32>) -> Result<()> {
        sqlx::query("UPDATE catalog_items SET stock_quantity = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(quantity)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn catalog_item(&mut self, id: CatalogItemId) -> Result<Option<CatalogItem>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, slug, price_cents, is_active, stock_quantity, primary_image_url, variant
            FROM catalog_items
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_item).transpose()
    }

    async fn insert_catalog_item(&mut self, item: &CatalogItem) -> Result<()> {
        let variant = serde_json::to_value(&item.variant)?;

        sqlx::query(
            r#"
            INSERT INTO catalog_items (id, name, slug, price_cents, is_active, stock_quantity, primary_image_url, variant)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(&item.name)
        .bind(&item.slug)
        .bind(item.price.cents())
        .bind(item.is_active)
        .bind(item.stock_quantity)
        .bind(&item.primary_image_url)
        .bind(variant)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn set_catalog_price(&mut self, id: CatalogItemId, price: Money) -> Result<()> {
        let result = sqlx::query("UPDATE catalog_items SET price_cents = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(price.cents())
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("catalog item", id));
        }
        Ok(())
    }

    async fn service_add_on(&mut self, id: ServiceId) -> Result<Option<ServiceAddOn>> {
        let row = sqlx::query("SELECT id, name, price_cents FROM service_add_ons WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(|row| -> Result<ServiceAddOn> {
            Ok(ServiceAddOn {
                id: ServiceId::from_uuid(row.try_get::<Uuid, _>("id")?),
                name: row.try_get("name")?,
                price: Money::from_cents(row.try_get("price_cents")?),
            })
        })
        .transpose()
    }

    async fn insert_service_add_on(&mut self, service: &ServiceAddOn) -> Result<()> {
        sqlx::query("INSERT INTO service_add_ons (id, name, price_cents) VALUES ($1, $2, $3)")
            .bind(service.id.as_uuid())
            .bind(&service.name)
            .bind(service.price.cents())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn set_stock_quantity(
        &mut self,
        id: CatalogItemId,
        quantity: Option<i32>,
    ) -> Result<StockChange> {
        let previous = self
            .lock_stock(id)
            .await?
            .ok_or_else(|| StoreError::not_found("catalog item", id))?;

        self.write_stock(id, quantity).await?;

        Ok(StockChange {
            item_id: id,
            previous,
            current: quantity,
        })
    }

    async fn adjust_stock(&mut self, id: CatalogItemId, delta: i32) -> Result<Option<StockChange>> {
        let Some(previous) = self
            .lock_stock(id)
            .await?
            .ok_or_else(|| StoreError::not_found("catalog item", id))?
        else {
            return Ok(None);
        };

        let current = previous.saturating_add(delta).max(0);
        tracing::debug!(item_id = %id, previous, current, "Adjusted stock");
        self.write_stock(id, Some(current)).await?;

        Ok(Some(StockChange {
            item_id: id,
            previous: Some(previous),
            current: Some(current),
        }))
    }

    async fn address(&mut self, id: AddressId) -> Result<Option<Address>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, recipient, line1, city, postal_code, country
            FROM addresses
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(|row| -> Result<Address> {
            Ok(Address {
                id: AddressId::from_uuid(row.try_get::<Uuid, _>("id")?),
                user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
                recipient: row.try_get("recipient")?,
                line1: row.try_get("line1")?,
                city: row.try_get("city")?,
                postal_code: row.try_get("postal_code")?,
                country: row.try_get("country")?,
            })
        })
        .transpose()
    }

    async fn insert_address(&mut self, address: &Address) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO addresses (id, user_id, recipient, line1, city, postal_code, country)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(address.id.as_uuid())
        .bind(address.user_id.as_uuid())
        .bind(&address.recipient)
        .bind(&address.line1)
        .bind(&address.city)
        .bind(&address.postal_code)
        .bind(&address.country)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn cart_for_user(&mut self, user_id: UserId) -> Result<Option<Cart>> {
        let Some(row) = sqlx::query("SELECT id, user_id, created_at FROM carts WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?
        else {
            return Ok(None);
        };

        let cart_id = CartId::from_uuid(row.try_get::<Uuid, _>("id")?);
        let created_at: DateTime<Utc> = row.try_get("created_at")?;

        let rows = sqlx::query(
            r#"
            SELECT id, cart_id, item_id, service_id, quantity, prescription, added_at
            FROM cart_lines
            WHERE cart_id = $1
            ORDER BY added_at ASC, id ASC
            "#,
        )
        .bind(cart_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        let lines = rows
            .into_iter()
            .map(row_to_cart_line)
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(Cart {
            id: cart_id,
            user_id,
            created_at,
            lines,
        }))
    }

    async fn get_or_create_cart(&mut self, user_id: UserId) -> Result<Cart> {
        let cart = Cart::new(user_id);

        // Concurrent creators race on the unique user_id; the loser reads the winner's row.
        sqlx::query(
            r#"
            INSERT INTO carts (id, user_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(cart.id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(cart.created_at)
        .execute(&mut *self.tx)
        .await?;

        // Serializes merge-or-insert per cart; the insert above takes no lock
        // when the row already existed.
        sqlx::query("SELECT id FROM carts WHERE user_id = $1 FOR UPDATE")
            .bind(user_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        self.cart_for_user(user_id)
            .await?
            .ok_or_else(|| StoreError::not_found("cart", user_id))
    }

    async fn insert_cart_line(&mut self, line: &CartLine) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cart_lines (id, cart_id, item_id, service_id, quantity, prescription, added_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(line.id.as_uuid())
        .bind(line.cart_id.as_uuid())
        .bind(line.item_id.as_uuid())
        .bind(line.service_id.map(|id| id.as_uuid()))
        .bind(quantity_to_db("cart line", line.quantity)?)
        .bind(&line.prescription)
        .bind(line.added_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn set_cart_line_quantity(&mut self, id: CartLineId, quantity: u32) -> Result<()> {
        let result = sqlx::query("UPDATE cart_lines SET quantity = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(quantity_to_db("cart line", quantity)?)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("cart line", id));
        }
        Ok(())
    }

    async fn delete_cart_line(&mut self, id: CartLineId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cart_lines WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_cart(&mut self, user_id: UserId) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM cart_lines
            USING carts
            WHERE cart_lines.cart_id = carts.id AND carts.user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, address_id, status, total_amount_cents,
                payment_session_id, payment_id, stock_debited, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.address_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.total_amount.cents())
        .bind(&order.payment_session_id)
        .bind(&order.payment_id)
        .bind(order.stock_debited)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.version)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_order_lines(&mut self, lines: &[OrderLine]) -> Result<()> {
        for (position, line) in lines.iter().enumerate() {
            let snapshot = line
                .snapshot
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?;
            let position = i32::try_from(position)
                .map_err(|_| StoreError::corrupt("order line", "too many lines"))?;

            sqlx::query(
                r#"
                INSERT INTO order_lines (id, order_id, item_id, service_id, quantity, unit_price_cents, position, snapshot)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(line.id.as_uuid())
            .bind(line.order_id.as_uuid())
            .bind(line.item_id.as_uuid())
            .bind(line.service_id.map(|id| id.as_uuid()))
            .bind(quantity_to_db("order line", line.quantity)?)
            .bind(line.unit_price.cents())
            .bind(position)
            .bind(snapshot)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        let Some(mut order) = row.map(row_to_order).transpose()? else {
            return Ok(None);
        };
        self.load_order_lines(&mut order).await?;
        Ok(Some(order))
    }

    async fn order_by_payment_session(&mut self, session_id: &str) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE payment_session_id = $1");
        let row = sqlx::query(&sql)
            .bind(session_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        let Some(mut order) = row.map(row_to_order).transpose()? else {
            return Ok(None);
        };
        self.load_order_lines(&mut order).await?;
        Ok(Some(order))
    }

    async fn update_order(&mut self, order: &Order) -> Result<i64> {
        let row = sqlx::query(
            r#"
            UPDATE orders
            SET status = $3, payment_session_id = $4, payment_id = $5,
                stock_debited = $6, updated_at = $7, version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING version
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.version)
        .bind(order.status.as_str())
        .bind(&order.payment_session_id)
        .bind(&order.payment_id)
        .bind(order.stock_debited)
        .bind(order.updated_at)
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(row) = row {
            return Ok(row.try_get("version")?);
        }

        let actual: Option<i64> = sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
            .bind(order.id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        match actual {
            Some(actual) => Err(StoreError::ConcurrencyConflict {
                entity: "order",
                id: order.id.to_string(),
                expected: order.version,
                actual,
            }),
            None => Err(StoreError::not_found("order", order.id)),
        }
    }

    async fn insert_restock_subscription(
        &mut self,
        subscription: &RestockSubscription,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO restock_subscriptions (id, user_id, email, item_id, created_at, notified_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (item_id, email) WHERE notified_at IS NULL DO NOTHING
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.user_id.as_uuid())
        .bind(&subscription.email)
        .bind(subscription.item_id.as_uuid())
        .bind(subscription.created_at)
        .bind(subscription.notified_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn pending_restock_subscriptions(
        &mut self,
        item_id: CatalogItemId,
    ) -> Result<Vec<RestockSubscription>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, email, item_id, created_at, notified_at
            FROM restock_subscriptions
            WHERE item_id = $1 AND notified_at IS NULL
            ORDER BY created_at ASC
            "#,
        )
        .bind(item_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_subscription).collect()
    }

    async fn mark_subscription_notified(
        &mut self,
        id: SubscriptionId,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let result =
            sqlx::query("UPDATE restock_subscriptions SET notified_at = $2 WHERE id = $1")
                .bind(id.as_uuid())
                .bind(at)
                .execute(&mut *self.tx)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("restock subscription", id));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let PostgresTransaction { tx } = *self;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let PostgresTransaction { tx } = *self;
        tx.rollback().await?;
        Ok(())
    }
}
