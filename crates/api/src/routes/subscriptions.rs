//! Restock subscription endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::CatalogItemId;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::extract::{CurrentUser, parse_id};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SubscribeRequest {
    pub email: String,
}

#[derive(Serialize)]
pub struct SubscriptionResponse {
    pub id: String,
    pub item_id: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// POST /items/{id}/restock-subscriptions
#[tracing::instrument(skip(state, req))]
pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<SubscribeRequest>,
) -> Result<(StatusCode, Json<SubscriptionResponse>), ApiError> {
    let item_id: CatalogItemId = parse_id(&id, "item id")?;
    let subscription = state
        .inventory
        .subscribe_restock(user_id, &req.email, item_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SubscriptionResponse {
            id: subscription.id.to_string(),
            item_id: subscription.item_id.to_string(),
            email: subscription.email,
            created_at: subscription.created_at,
        }),
    ))
}
