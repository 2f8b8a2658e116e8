//! Staff endpoints: order status workflow and stock edits.
//!
//! Staff authorization is enforced in front of this service.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{CatalogItemId, OrderId, OrderStatus};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::extract::parse_id;
use crate::routes::orders::OrderResponse;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Deserialize)]
pub struct SetStockRequest {
    /// New on-hand quantity; `null` stops tracking stock.
    pub quantity: Option<i32>,
}

#[derive(Serialize)]
pub struct StockResponse {
    pub item_id: String,
    pub previous: Option<i32>,
    pub current: Option<i32>,
    pub restocked: bool,
}

/// POST /admin/orders/{id}/status
#[tracing::instrument(skip(state, req), fields(to = %req.status))]
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let to: OrderStatus = req
        .status
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;

    let order = state.orders.update_status(order_id, to).await?;
    Ok(Json(order.into()))
}

/// PUT /admin/items/{id}/stock
#[tracing::instrument(skip(state, req))]
pub async fn set_stock(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SetStockRequest>,
) -> Result<Json<StockResponse>, ApiError> {
    let item_id: CatalogItemId = parse_id(&id, "item id")?;
    let change = state.inventory.set_stock(item_id, req.quantity).await?;

    Ok(Json(StockResponse {
        item_id: change.item_id.to_string(),
        previous: change.previous,
        current: change.current,
        restocked: change.is_restock(),
    }))
}
