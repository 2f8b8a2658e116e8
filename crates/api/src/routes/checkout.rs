//! Checkout endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::AddressId;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::extract::CurrentUser;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CheckoutRequest {
    pub address_id: AddressId,
    pub email: String,
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub order_id: String,
    pub session_id: String,
    pub redirect_url: String,
    pub total_cents: i64,
}

/// POST /checkout: create a pending order from the cart and open a payment session.
#[tracing::instrument(skip(state, req))]
pub async fn start(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let started = state
        .checkout
        .start_checkout(user_id, req.address_id, &req.email)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            order_id: started.order.id.to_string(),
            session_id: started.session.session_id,
            redirect_url: started.session.redirect_url,
            total_cents: started.order.total_amount.cents(),
        }),
    ))
}
