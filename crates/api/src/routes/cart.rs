//! Cart endpoints for the acting user.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{CartLineId, CatalogItemId, ServiceId};
use serde::{Deserialize, Serialize};
use store::{Cart, CartLine};

use crate::error::ApiError;
use crate::extract::{CurrentUser, parse_id};
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub item_id: CatalogItemId,
    pub quantity: i32,
    pub service_id: Option<ServiceId>,
    /// Opaque prescription payload; lines only merge when it matches exactly.
    pub prescription: Option<serde_json::Value>,
}

#[derive(Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i32,
}

// -- Response types --

#[derive(Serialize)]
pub struct CartResponse {
    pub cart_id: Option<String>,
    pub lines: Vec<CartLineResponse>,
}

#[derive(Serialize)]
pub struct CartLineResponse {
    pub id: String,
    pub item_id: String,
    pub service_id: Option<String>,
    pub quantity: u32,
    pub prescription: Option<serde_json::Value>,
}

#[derive(Serialize)]
pub struct CartTotalResponse {
    pub total_cents: i64,
}

impl From<&CartLine> for CartLineResponse {
    fn from(line: &CartLine) -> Self {
        Self {
            id: line.id.to_string(),
            item_id: line.item_id.to_string(),
            service_id: line.service_id.map(|id| id.to_string()),
            quantity: line.quantity,
            prescription: line
                .prescription
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok()),
        }
    }
}

impl From<Option<Cart>> for CartResponse {
    fn from(cart: Option<Cart>) -> Self {
        match cart {
            Some(cart) => Self {
                cart_id: Some(cart.id.to_string()),
                lines: cart.lines.iter().map(CartLineResponse::from).collect(),
            },
            None => Self {
                cart_id: None,
                lines: Vec::new(),
            },
        }
    }
}

// -- Handlers --

/// GET /cart: the user's cart, empty if none exists yet.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.carts.get_cart(user_id).await?;
    Ok(Json(cart.into()))
}

/// POST /cart: add an item, merging with an identical line.
#[tracing::instrument(skip(state, req), fields(item_id = %req.item_id))]
pub async fn add_item(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<CartResponse>), ApiError> {
    // Stored canonically so equal payloads compare equal.
    let prescription = req.prescription.as_ref().map(|value| value.to_string());
    let cart = state
        .carts
        .add_item(user_id, req.item_id, req.quantity, req.service_id, prescription)
        .await?;
    Ok((StatusCode::CREATED, Json(Some(cart).into())))
}

/// DELETE /cart: remove every line.
#[tracing::instrument(skip(state))]
pub async fn clear(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<StatusCode, ApiError> {
    state.carts.clear(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /cart/lines/{id}: replace a line's quantity.
#[tracing::instrument(skip(state, req))]
pub async fn update_line(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateQuantityRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let line_id: CartLineId = parse_id(&id, "line id")?;
    let cart = state
        .carts
        .update_quantity(user_id, line_id, req.quantity)
        .await?;
    Ok(Json(Some(cart).into()))
}

/// DELETE /cart/lines/{id}
#[tracing::instrument(skip(state))]
pub async fn remove_line(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let line_id: CartLineId = parse_id(&id, "line id")?;
    state.carts.remove_item(user_id, line_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /cart/total: live quote at current catalog prices.
#[tracing::instrument(skip(state))]
pub async fn total(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<CartTotalResponse>, ApiError> {
    let total = state.carts.calculate_total(user_id).await?;
    Ok(Json(CartTotalResponse {
        total_cents: total.cents(),
    }))
}
