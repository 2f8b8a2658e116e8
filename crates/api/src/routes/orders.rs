//! Customer-facing order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use serde::Serialize;
use store::{Order, OrderLine};

use crate::error::ApiError;
use crate::extract::{CurrentUser, parse_id};
use crate::state::AppState;

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub status: String,
    pub total_cents: i64,
    pub payment_session_id: Option<String>,
    pub payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub lines: Vec<OrderLineResponse>,
}

#[derive(Serialize)]
pub struct OrderLineResponse {
    pub id: String,
    pub item_id: String,
    pub service_id: Option<String>,
    pub name: Option<String>,
    pub kind: Option<String>,
    pub image_url: Option<String>,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

impl From<&OrderLine> for OrderLineResponse {
    fn from(line: &OrderLine) -> Self {
        let snapshot = line.snapshot.as_ref();
        Self {
            id: line.id.to_string(),
            item_id: line.item_id.to_string(),
            service_id: line.service_id.map(|id| id.to_string()),
            name: snapshot.map(|s| s.name.clone()),
            kind: snapshot.map(|s| s.kind.clone()),
            image_url: snapshot.and_then(|s| s.image_url.clone()),
            quantity: line.quantity,
            unit_price_cents: line.unit_price.cents(),
            line_total_cents: line.line_total().cents(),
        }
    }
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            status: order.status.to_string(),
            total_cents: order.total_amount.cents(),
            payment_session_id: order.payment_session_id,
            payment_id: order.payment_id,
            created_at: order.created_at,
            updated_at: order.updated_at,
            lines: order.lines.iter().map(OrderLineResponse::from).collect(),
        }
    }
}

/// Loads an order, hiding other users' orders behind a 404.
async fn owned_order(state: &AppState, user_id: UserId, order_id: OrderId) -> Result<Order, ApiError> {
    let order = state.orders.get_order(order_id).await?;
    if order.user_id != user_id {
        return Err(ApiError::NotFound(format!("Order not found: {order_id}")));
    }
    Ok(order)
}

// -- Handlers --

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let order = owned_order(&state, user_id, order_id).await?;
    Ok(Json(order.into()))
}

/// POST /orders/{id}/cancel: cancel an order that has not been paid.
#[tracing::instrument(skip(state))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    owned_order(&state, user_id, order_id).await?;
    let order = state.orders.cancel_order(order_id).await?;
    Ok(Json(order.into()))
}
